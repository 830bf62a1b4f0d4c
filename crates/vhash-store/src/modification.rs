use vhash_types::FieldChange;

use crate::dao::Dao;

/// Record of one successful mutation: the object, its version afterwards and
/// what changed.
#[derive(Clone, Debug)]
pub struct Modification<'s> {
    dao: Dao<'s>,
    version: u64,
    insert: bool,
    changes: Vec<FieldChange>,
}

impl<'s> Modification<'s> {
    pub(crate) fn new(dao: Dao<'s>, version: u64, insert: bool, changes: Vec<FieldChange>) -> Self {
        Self {
            dao,
            version,
            insert,
            changes,
        }
    }

    pub fn dao(&self) -> &Dao<'s> {
        &self.dao
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// `true` if this mutation created the object.
    pub fn is_insert(&self) -> bool {
        self.insert
    }

    /// Changed fields in the order they were given.
    pub fn changes(&self) -> &[FieldChange] {
        &self.changes
    }

    pub fn change(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    pub fn into_changes(self) -> Vec<FieldChange> {
        self.changes
    }
}
