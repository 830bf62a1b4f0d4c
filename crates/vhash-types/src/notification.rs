//! Change-channel payloads.
//!
//! Every collection publishes on its own channel. A payload is a JSON object
//! with exactly one key, the object id, mapping to either `null` (the object
//! was deleted) or an object of changed fields plus `"v"`, the new version.

use serde_json::{Map, Value};

use crate::error::{Result, TypeError};
use crate::VERSION_FIELD;

/// What happened to the object named by a [`Notification`].
#[derive(Clone, Debug, PartialEq)]
pub enum NotificationBody {
    /// Tombstone: the object was deleted.
    Deleted,
    /// The object reached `version`; `fields` holds the published new values
    /// (`Null` for cleared fields).
    Updated {
        version: u64,
        fields: Map<String, Value>,
    },
}

/// A decoded change-channel message.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub id: String,
    pub body: NotificationBody,
}

impl Notification {
    pub fn updated(id: impl Into<String>, version: u64, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            body: NotificationBody::Updated { version, fields },
        }
    }

    pub fn deleted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: NotificationBody::Deleted,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.body, NotificationBody::Deleted)
    }

    pub fn version(&self) -> Option<u64> {
        match &self.body {
            NotificationBody::Updated { version, .. } => Some(*version),
            NotificationBody::Deleted => None,
        }
    }

    /// Published value for `field`, if the payload carries it.
    pub fn field(&self, field: &str) -> Option<&Value> {
        match &self.body {
            NotificationBody::Updated { fields, .. } => fields.get(field),
            NotificationBody::Deleted => None,
        }
    }

    /// Parse a payload received on a change channel.
    pub fn parse(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| TypeError::InvalidNotification(e.to_string()))?;
        let Value::Object(outer) = value else {
            return Err(TypeError::InvalidNotification(
                "payload is not a JSON object".into(),
            ));
        };
        if outer.len() != 1 {
            return Err(TypeError::InvalidNotification(format!(
                "expected exactly one object id, found {}",
                outer.len()
            )));
        }
        let Some((id, body)) = outer.into_iter().next() else {
            return Err(TypeError::InvalidNotification("empty payload".into()));
        };

        match body {
            Value::Null => Ok(Self::deleted(id)),
            Value::Object(mut fields) => {
                let version = fields
                    .remove(VERSION_FIELD)
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| {
                        TypeError::InvalidNotification(format!(
                            "update for {id} has no numeric version"
                        ))
                    })?;
                Ok(Self::updated(id, version, fields))
            }
            other => Err(TypeError::InvalidNotification(format!(
                "unexpected body for {id}: {other}"
            ))),
        }
    }

    /// Encode as a channel payload.
    pub fn to_payload(&self) -> String {
        let body = match &self.body {
            NotificationBody::Deleted => Value::Null,
            NotificationBody::Updated { version, fields } => {
                let mut fields = fields.clone();
                fields.insert(VERSION_FIELD.to_string(), Value::from(*version));
                Value::Object(fields)
            }
        };
        let mut outer = Map::new();
        outer.insert(self.id.clone(), body);
        Value::Object(outer).to_string()
    }
}
