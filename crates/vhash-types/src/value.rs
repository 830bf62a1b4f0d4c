//! Raw field values.
//!
//! Values are stored as JSON text. A [`RawValue`] keeps that text untouched
//! and decodes it only when the caller asks for a concrete type.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, TypeError};

/// The literal content of a hash field.
///
/// `Missing` is distinct from `Present("")`: the former means the field does
/// not exist, the latter is a stored empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RawValue {
    /// The field is absent.
    #[default]
    Missing,
    /// The field holds this raw (JSON-encoded) text.
    Present(String),
}

impl RawValue {
    /// Encode a value into its stored form.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        encode_value(value).map(Self::Present)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn is_present(&self) -> bool {
        !self.is_missing()
    }

    /// The raw stored text, if present.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Present(raw) => Some(raw),
            Self::Missing => None,
        }
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Present(raw) => Some(raw),
            Self::Missing => None,
        }
    }

    /// Decode into `T`. A missing value decodes to `None`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self {
            Self::Missing => Ok(None),
            Self::Present(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| TypeError::Decode {
                    raw: raw.clone(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Decode into `T`, substituting `default` for a missing value.
    pub fn decode_or<T: DeserializeOwned>(&self, default: T) -> Result<T> {
        Ok(self.decode()?.unwrap_or(default))
    }

    /// Decode into a generic JSON value. A missing value becomes `Null`.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(self.decode()?.unwrap_or(serde_json::Value::Null))
    }
}

impl From<Option<String>> for RawValue {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(raw) => Self::Present(raw),
            None => Self::Missing,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present(raw) => write!(f, "{raw}"),
            Self::Missing => write!(f, "<missing>"),
        }
    }
}

/// Encode a value as the JSON text stored in a hash field.
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| TypeError::Encode(e.to_string()))
}

/// Result of a batched field read, in request order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawValues {
    fields: Vec<String>,
    values: Vec<RawValue>,
}

impl RawValues {
    /// Pair requested fields with the values read for them.
    ///
    /// Both vectors must have the same length; extra entries on either side
    /// are dropped.
    pub fn new(mut fields: Vec<String>, mut values: Vec<RawValue>) -> Self {
        let len = fields.len().min(values.len());
        fields.truncate(len);
        values.truncate(len);
        Self { fields, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index` in request order.
    pub fn get(&self, index: usize) -> Option<&RawValue> {
        self.values.get(index)
    }

    /// Value for the first occurrence of `field`.
    pub fn value(&self, field: &str) -> Option<&RawValue> {
        self.fields
            .iter()
            .position(|f| f == field)
            .and_then(|i| self.values.get(i))
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.fields.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn into_values(self) -> Vec<RawValue> {
        self.values
    }
}

impl std::ops::Index<usize> for RawValues {
    type Output = RawValue;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}
