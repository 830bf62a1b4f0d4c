//! The store handle.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use vhash_backend::{Backend, InMemoryBackend, RedisBackend, Reply};
use vhash_protocol::{ops, KeyLayout};
use vhash_script::{Script, ScriptExecutor};
use vhash_types::{ObjectRef, RawValue};

use crate::callbacks::CallbackRegistry;
use crate::config::StoreConfig;
use crate::dao::Dao;
use crate::error::{Result, StoreError};
use crate::index::Index;
use crate::lifecycle::{ShutdownLatch, Subsystem};
use crate::modification::Modification;

/// Owner of one backend connection, its script cache and the callback
/// registries.
///
/// `Store` is `Send + Sync`: handles may be created, mutations run and
/// callbacks dispatched from any thread.
pub struct Store {
    config: StoreConfig,
    layout: KeyLayout,
    executor: ScriptExecutor,
    callbacks: CallbackRegistry,
    subsystems: Mutex<Vec<Arc<dyn Subsystem>>>,
    latches: Mutex<Vec<ShutdownLatch>>,
    closing: AtomicBool,
    closed: AtomicBool,
}

impl Store {
    /// Connect to the Redis server named in `config`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let backend = RedisBackend::connect(&config.redis)?;
        Self::with_backend(Arc::new(backend), config)
    }

    /// A store over a fresh in-memory server.
    pub fn in_memory() -> Result<Self> {
        let backend = InMemoryBackend::new();
        vhash_protocol::install(&backend);
        Self::with_backend(Arc::new(backend), StoreConfig::default())
    }

    /// A store over an existing connection. An in-memory backend must have
    /// the protocol installed (see [`vhash_protocol::install`]).
    pub fn with_backend(backend: Arc<dyn Backend>, config: StoreConfig) -> Result<Self> {
        let executor = ScriptExecutor::new(backend);
        if config.preload_scripts {
            executor.preload(&vhash_protocol::ALL)?;
        }
        Ok(Self {
            layout: config.key_layout(),
            config,
            executor,
            callbacks: CallbackRegistry::default(),
            subsystems: Mutex::new(Vec::new()),
            latches: Mutex::new(Vec::new()),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// A store on a fresh connection to the same server, with the same
    /// configuration but its own script cache and no callbacks.
    pub fn try_clone(&self) -> Result<Self> {
        let backend = self.backend()?.reconnect()?;
        Self::with_backend(Arc::from(backend), self.config.clone())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    // ---- Handles ----

    pub fn dao(&self, collection: &str, id: &str) -> Dao<'_> {
        Dao::new(self, collection, id)
    }

    pub fn index(&self, collection: &str) -> Index<'_> {
        Index::new(self, collection)
    }

    pub fn resolve(&self, reference: &ObjectRef) -> Dao<'_> {
        self.dao(reference.collection(), reference.id())
    }

    /// Resolve a `"<collection>/<id>"` literal.
    pub fn resolve_str(&self, literal: &str) -> Result<Dao<'_>> {
        let reference = ObjectRef::parse(literal)?;
        Ok(self.resolve(&reference))
    }

    /// Every collection that has ever had an object.
    pub fn collections(&self) -> Result<Vec<String>> {
        Ok(self.backend()?.smembers(self.layout.registry())?)
    }

    // ---- Auxiliary scripts ----

    /// Add `values` to the set at `key` only if none is already a member.
    /// Returns the values that were already present; empty means merged.
    pub fn merge_into_set_if_distinct(&self, key: &str, values: &[String]) -> Result<BTreeSet<String>> {
        Ok(ops::merge_into_set_if_distinct(self.executor()?, key, values)?)
    }

    /// Write a raw hash field and return its previous value. Does not touch
    /// object versions or fire callbacks.
    pub fn hgetset(&self, key: &str, field: &str, value: &str) -> Result<RawValue> {
        let previous = ops::hash_get_set(self.executor()?, key, field, value)?;
        Ok(RawValue::from(previous))
    }

    // ---- Callbacks ----

    /// Call `handler` whenever a mutation creates an object in `collection`.
    pub fn on_insert<F>(&self, collection: &str, handler: F)
    where
        F: Fn(&Dao<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.add_insert(collection, Arc::new(handler));
    }

    /// Call `handler` with `(collection, id)` whenever an object in
    /// `collection` is deleted.
    pub fn on_delete<F>(&self, collection: &str, handler: F)
    where
        F: Fn(&str, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.add_delete(collection, Arc::new(handler));
    }

    /// Call `handler` whenever `field` of an object in `collection` changes.
    /// `"*"` matches every field.
    pub fn on_change<F>(&self, collection: &str, field: &str, handler: F)
    where
        F: Fn(&Dao<'_>, &str, &RawValue, &RawValue) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.add_change(collection, field, Arc::new(handler));
    }

    /// Run the handlers for `modification` on the calling thread.
    ///
    /// Mutations through [`Dao`] call this themselves; it is public for
    /// components relaying changes made by other processes.
    pub fn dispatch_modification(&self, modification: &Modification<'_>) {
        self.callbacks.dispatch_modification(modification);
    }

    pub fn dispatch_delete(&self, collection: &str, id: &str) {
        self.callbacks.dispatch_delete(collection, id);
    }

    // ---- Lifecycle ----

    /// Stop `subsystem` when the store closes.
    pub fn register_subsystem(&self, subsystem: Arc<dyn Subsystem>) {
        debug!(subsystem = subsystem.name(), "subsystem registered");
        self.subsystems.lock().push(subsystem);
    }

    /// Make [`close`](Self::close) wait for `latch`.
    pub fn register_shutdown_latch(&self, latch: ShutdownLatch) {
        self.latches.lock().push(latch);
    }

    /// Stop subsystems, wait for every shutdown latch, then close the
    /// connection. Later calls return immediately.
    ///
    /// The store stays usable until the last latch is released, so draining
    /// subsystems can finish work they already accepted.
    pub fn close(&self) -> Result<()> {
        if self.closing.swap(true, Ordering::AcqRel) {
            debug!("store already closed");
            return Ok(());
        }
        info!("closing store");

        let subsystems = std::mem::take(&mut *self.subsystems.lock());
        for subsystem in &subsystems {
            debug!(subsystem = subsystem.name(), "stopping subsystem");
            subsystem.stop();
        }

        let latches = std::mem::take(&mut *self.latches.lock());
        debug!(count = latches.len(), "waiting for shutdown latches");
        for latch in &latches {
            latch.wait();
        }

        self.closed.store(true, Ordering::Release);
        match self.executor.backend().close() {
            Ok(()) | Err(vhash_backend::BackendError::Closed) => {}
            Err(err) => return Err(StoreError::Backend(err)),
        }
        info!("store closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn backend(&self) -> Result<&dyn Backend> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(self.executor.backend().as_ref())
    }

    /// Run a caller-supplied script through the store's connection and
    /// digest cache.
    pub fn eval(&self, script: &Script, keys: &[String], args: &[String]) -> Result<Reply> {
        Ok(self.executor()?.execute(script, keys, args)?)
    }

    pub(crate) fn executor(&self) -> Result<&ScriptExecutor> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(&self.executor)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("registry", &self.layout.registry())
            .field("closed", &self.is_closed())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
