//! Handle to one versioned object.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::debug;
use vhash_protocol::{ops, ObjectKeys, RawDiff};
use vhash_types::{encode_value, ObjectRef, RawValue, RawValues, TypeError, VERSION_FIELD};

use crate::error::{Result, StoreError};
use crate::modification::Modification;
use crate::store::Store;

/// Default membership score: the current Unix time in milliseconds.
pub(crate) fn now_score() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

/// A `(collection, id)` object, borrowed from its [`Store`].
///
/// Creating a handle performs no I/O. Mutations run one atomic script each;
/// the ones that change something dispatch callbacks before returning.
#[derive(Clone)]
pub struct Dao<'s> {
    store: &'s Store,
    id: String,
    keys: ObjectKeys,
}

impl<'s> Dao<'s> {
    pub(crate) fn new(store: &'s Store, collection: &str, id: &str) -> Self {
        Self {
            store,
            id: id.to_string(),
            keys: store.layout().object(collection, id),
        }
    }

    pub fn collection(&self) -> &str {
        &self.keys.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &'s Store {
        self.store
    }

    pub fn to_ref(&self) -> ObjectRef {
        ObjectRef::new(self.collection(), self.id())
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(self.store.backend()?.exists(&self.keys.hash)?)
    }

    /// Current version, `None` if the object does not exist.
    pub fn version(&self) -> Result<Option<u64>> {
        let Some(raw) = self.store.backend()?.hget(&self.keys.hash, VERSION_FIELD)? else {
            return Ok(None);
        };
        raw.parse().map(Some).map_err(|e: std::num::ParseIntError| {
            StoreError::Type(TypeError::Decode {
                raw,
                reason: e.to_string(),
            })
        })
    }

    pub fn get(&self, field: &str) -> Result<RawValue> {
        let raw = self.store.backend()?.hget(&self.keys.hash, field)?;
        Ok(RawValue::from(raw))
    }

    /// Read several fields in one round trip, in request order.
    pub fn get_many(&self, fields: &[&str]) -> Result<RawValues> {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let values = self.store.backend()?.hmget(&self.keys.hash, &fields)?;
        Ok(RawValues::new(
            fields,
            values.into_iter().map(RawValue::from).collect(),
        ))
    }

    /// Write alternating field names and values, scored at the current time.
    ///
    /// Returns `None` if every value was already stored.
    pub fn set(&self, fields_and_values: &[Value]) -> Result<Option<Modification<'s>>> {
        self.set_scored(now_score(), fields_and_values)
    }

    /// Like [`set`](Self::set), with an explicit membership score used if
    /// this write creates the object.
    pub fn set_scored(&self, score: f64, fields_and_values: &[Value]) -> Result<Option<Modification<'s>>> {
        if fields_and_values.len() % 2 != 0 {
            return Err(StoreError::invalid(format!(
                "expected alternating fields and values, got {} elements",
                fields_and_values.len()
            )));
        }
        let mut args = Vec::with_capacity(fields_and_values.len());
        for (i, pair) in fields_and_values.chunks(2).enumerate() {
            let Value::String(field) = &pair[0] else {
                return Err(StoreError::invalid(format!(
                    "field name at position {} is not a string: {}",
                    i * 2,
                    pair[0]
                )));
            };
            args.push(field.clone());
            args.push(encode_value(&pair[1])?);
        }
        self.write(score, args)
    }

    /// Write every `(field, value)` pair, scored at the current time.
    pub fn set_map<K, V, I>(&self, pairs: I) -> Result<Option<Modification<'s>>>
    where
        K: AsRef<str>,
        V: Serialize,
        I: IntoIterator<Item = (K, V)>,
    {
        self.set_map_scored(now_score(), pairs)
    }

    pub fn set_map_scored<K, V, I>(&self, score: f64, pairs: I) -> Result<Option<Modification<'s>>>
    where
        K: AsRef<str>,
        V: Serialize,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut args = Vec::new();
        for (field, value) in pairs {
            args.push(field.as_ref().to_string());
            args.push(encode_value(&value)?);
        }
        self.write(score, args)
    }

    /// `args` alternates field names and encoded values.
    fn write(&self, score: f64, args: Vec<String>) -> Result<Option<Modification<'s>>> {
        if args.iter().step_by(2).any(|f| f == VERSION_FIELD) {
            return Err(StoreError::invalid(format!(
                "field {VERSION_FIELD:?} is reserved for the version"
            )));
        }
        if args.is_empty() {
            return Ok(None);
        }
        let diff = ops::set(self.store.executor()?, &self.keys, score, &args)?;
        Ok(diff.map(|diff| {
            let insert = diff.is_insert();
            self.commit(diff, insert)
        }))
    }

    /// Bump the version, scored at the current time. Returns `true` if this
    /// created the object.
    pub fn touch(&self) -> Result<bool> {
        self.touch_scored(now_score())
    }

    pub fn touch_scored(&self, score: f64) -> Result<bool> {
        let version = ops::touch(self.store.executor()?, &self.keys, score)?;
        debug!(collection = self.collection(), id = %self.id, version, "touched");
        if version != 1 {
            return Ok(false);
        }
        let created = Modification::new(self.clone(), version, true, Vec::new());
        self.store.dispatch_modification(&created);
        Ok(true)
    }

    /// Delete the object. Returns `true` if it existed.
    pub fn delete(&self) -> Result<bool> {
        let removed = ops::checked_delete(self.store.executor()?, &self.keys)?;
        if removed {
            debug!(collection = self.collection(), id = %self.id, "deleted");
            self.store.dispatch_delete(self.collection(), &self.id);
        }
        Ok(removed)
    }

    /// Delete the named fields. Returns `None` if none of them existed.
    pub fn clear(&self, fields: &[&str]) -> Result<Option<Modification<'s>>> {
        if fields.contains(&VERSION_FIELD) {
            return Err(StoreError::invalid(format!(
                "field {VERSION_FIELD:?} is reserved for the version"
            )));
        }
        if fields.is_empty() {
            return Ok(None);
        }
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let diff = ops::clear(self.store.executor()?, &self.keys, &fields)?;
        Ok(diff.map(|diff| self.commit(diff, false)))
    }

    fn commit(&self, diff: RawDiff, insert: bool) -> Modification<'s> {
        debug!(
            collection = self.collection(),
            id = %self.id,
            version = diff.version,
            fields = diff.changes.len(),
            insert,
            "committed"
        );
        let modification = Modification::new(self.clone(), diff.version, insert, diff.changes);
        self.store.dispatch_modification(&modification);
        modification
    }
}

impl fmt::Debug for Dao<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dao")
            .field("collection", &self.collection())
            .field("id", &self.id)
            .finish()
    }
}

impl fmt::Display for Dao<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection(), self.id)
    }
}

impl PartialEq for Dao<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.store, other.store) && self.keys == other.keys
    }
}

impl Eq for Dao<'_> {}

/// Serializes as the `"<collection>/<id>"` reference.
impl Serialize for Dao<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
