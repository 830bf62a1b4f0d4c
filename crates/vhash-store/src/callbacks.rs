//! Callback registries and synchronous dispatch.
//!
//! Handlers run on the dispatching thread, in registration order. A handler
//! that returns `Err` or panics is logged and skipped; the remaining handlers
//! still run. Handler lists are copied out of the registry before any handler
//! runs, so a handler may register further handlers.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, trace, warn};
use vhash_types::{RawValue, WILDCARD_FIELD};

use crate::dao::Dao;
use crate::modification::Modification;

/// Called with the new object when a mutation creates it.
pub type InsertHandler = Arc<dyn Fn(&Dao<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Called with `(collection, id)` after an object is deleted.
pub type DeleteHandler = Arc<dyn Fn(&str, &str) -> anyhow::Result<()> + Send + Sync>;

/// Called with `(dao, field, before, after)` for each changed field.
pub type ChangeHandler =
    Arc<dyn Fn(&Dao<'_>, &str, &RawValue, &RawValue) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
pub(crate) struct CallbackRegistry {
    inserts: DashMap<String, Vec<InsertHandler>>,
    deletes: DashMap<String, Vec<DeleteHandler>>,
    /// collection -> field (or `*`) -> handlers
    changes: DashMap<String, HashMap<String, Vec<ChangeHandler>>>,
}

impl CallbackRegistry {
    pub(crate) fn add_insert(&self, collection: &str, handler: InsertHandler) {
        self.inserts
            .entry(collection.to_string())
            .or_default()
            .push(handler);
    }

    pub(crate) fn add_delete(&self, collection: &str, handler: DeleteHandler) {
        self.deletes
            .entry(collection.to_string())
            .or_default()
            .push(handler);
    }

    pub(crate) fn add_change(&self, collection: &str, field: &str, handler: ChangeHandler) {
        self.changes
            .entry(collection.to_string())
            .or_default()
            .entry(field.to_string())
            .or_default()
            .push(handler);
    }

    pub(crate) fn dispatch_modification(&self, modification: &Modification<'_>) {
        let dao = modification.dao();
        let collection = dao.collection();

        if modification.is_insert() {
            for handler in snapshot(&self.inserts, collection) {
                invoke("insert", collection, dao.id(), || handler(dao));
            }
        }

        for change in modification.changes() {
            let handlers = self.change_handlers(collection, &change.field);
            trace!(
                collection,
                id = dao.id(),
                field = %change.field,
                handlers = handlers.len(),
                "dispatching field change"
            );
            for handler in handlers {
                invoke("change", collection, dao.id(), || {
                    handler(dao, &change.field, &change.before, &change.after)
                });
            }
        }
    }

    pub(crate) fn dispatch_delete(&self, collection: &str, id: &str) {
        for handler in snapshot(&self.deletes, collection) {
            invoke("delete", collection, id, || handler(collection, id));
        }
    }

    /// Exact-field handlers followed by wildcard handlers.
    fn change_handlers(&self, collection: &str, field: &str) -> Vec<ChangeHandler> {
        let Some(by_field) = self.changes.get(collection) else {
            return Vec::new();
        };
        let mut handlers = by_field.get(field).cloned().unwrap_or_default();
        if field != WILDCARD_FIELD {
            if let Some(wildcard) = by_field.get(WILDCARD_FIELD) {
                handlers.extend(wildcard.iter().cloned());
            }
        }
        handlers
    }

    #[cfg(test)]
    pub(crate) fn handler_count(&self, collection: &str) -> usize {
        let inserts = self.inserts.get(collection).map_or(0, |h| h.len());
        let deletes = self.deletes.get(collection).map_or(0, |h| h.len());
        let changes = self
            .changes
            .get(collection)
            .map_or(0, |m| m.values().map(Vec::len).sum());
        inserts + deletes + changes
    }
}

fn snapshot<H: Clone>(registry: &DashMap<String, Vec<H>>, collection: &str) -> Vec<H> {
    registry
        .get(collection)
        .map(|handlers| handlers.clone())
        .unwrap_or_default()
}

fn invoke(kind: &'static str, collection: &str, id: &str, call: impl FnOnce() -> anyhow::Result<()>) {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(kind, collection, id, error = %err, "callback failed"),
        Err(payload) => error!(
            kind,
            collection,
            id,
            panic = panic_message(payload.as_ref()),
            "callback panicked"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("insert_collections", &self.inserts.len())
            .field("delete_collections", &self.deletes.len())
            .field("change_collections", &self.changes.len())
            .finish()
    }
}
