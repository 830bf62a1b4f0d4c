use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Reference to an object as `(collection, id)`.
///
/// Serializes as the string `"<collection>/<id>"` so references can be
/// stored inside field values and resolved back to live handles. The
/// collection name may not contain `/`; the id may.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    collection: String,
    id: String,
}

impl ObjectRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parse a `"<collection>/<id>"` literal.
    pub fn parse(literal: &str) -> Result<Self, TypeError> {
        match literal.find('/') {
            Some(index) if index > 0 => Ok(Self {
                collection: literal[..index].to_string(),
                id: literal[index + 1..].to_string(),
            }),
            _ => Err(TypeError::InvalidReference {
                literal: literal.to_string(),
            }),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl FromStr for ObjectRef {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ObjectRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let literal = String::deserialize(deserializer)?;
        Self::parse(&literal).map_err(serde::de::Error::custom)
    }
}
