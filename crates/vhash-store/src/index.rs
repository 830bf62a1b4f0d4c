use std::fmt;

use serde::{Serialize, Serializer};

use crate::dao::Dao;
use crate::error::Result;
use crate::store::Store;

/// Membership of one collection, ordered by score.
#[derive(Clone)]
pub struct Index<'s> {
    store: &'s Store,
    name: String,
}

impl<'s> Index<'s> {
    pub(crate) fn new(store: &'s Store, name: &str) -> Self {
        Self {
            store,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle for `id` in this collection. Performs no I/O.
    pub fn get(&self, id: &str) -> Dao<'s> {
        self.store.dao(&self.name, id)
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.store.backend()?.zcard(&self.name)?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Member ids in ascending score order.
    pub fn ids(&self) -> Result<Vec<String>> {
        Ok(self.store.backend()?.zrange(&self.name, 0, -1)?)
    }

    pub fn daos(&self) -> Result<Vec<Dao<'s>>> {
        Ok(self.ids()?.iter().map(|id| self.get(id)).collect())
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.score(id)?.is_some())
    }

    pub fn score(&self, id: &str) -> Result<Option<f64>> {
        Ok(self.store.backend()?.zscore(&self.name, id)?)
    }
}

impl fmt::Debug for Index<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index").field("name", &self.name).finish()
    }
}

impl Serialize for Index<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}
