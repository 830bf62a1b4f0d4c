//! In-memory server for tests and embedding.
//!
//! [`InMemoryBackend`] stands in for a scripting key-value server inside one
//! process. It cannot interpret Lua; instead each script body is registered
//! together with a [`NativeProcedure`] implementing the same semantics.
//! `SCRIPT LOAD` succeeds only for registered bodies, and `EVALSHA` runs the
//! procedure while holding the keyspace lock, so every script is atomic with
//! respect to every other command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::digest::script_digest;
use crate::error::{BackendError, BackendResult};
use crate::keyspace::{Keyspace, Published, DEFAULT_PUBLISH_CAPACITY};
use crate::reply::Reply;
use crate::traits::Backend;

/// Native implementation of a script: `(keyspace, KEYS, ARGV) -> reply`.
pub type NativeProcedure = fn(&mut Keyspace, &[String], &[String]) -> BackendResult<Reply>;

/// State shared by every connection to one in-memory server.
struct Server {
    keyspace: Mutex<Keyspace>,
    /// Script body -> procedure, for `SCRIPT LOAD`.
    procedures: DashMap<String, NativeProcedure>,
    /// Digest -> procedure: the server-side script cache.
    loaded: DashMap<String, NativeProcedure>,
}

/// A connection to an in-memory server.
///
/// [`Backend::reconnect`] returns another connection to the same server:
/// data and loaded scripts are shared, the closed flag is not.
pub struct InMemoryBackend {
    server: Arc<Server>,
    closed: AtomicBool,
}

impl InMemoryBackend {
    /// Start a new, empty server and connect to it.
    pub fn new() -> Self {
        Self::with_publish_capacity(DEFAULT_PUBLISH_CAPACITY)
    }

    /// Like [`new`](Self::new), but the server keeps at most `capacity`
    /// published messages.
    pub fn with_publish_capacity(capacity: usize) -> Self {
        Self {
            server: Arc::new(Server {
                keyspace: Mutex::new(Keyspace::with_publish_capacity(capacity)),
                procedures: DashMap::new(),
                loaded: DashMap::new(),
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// Teach the server how to run `body`.
    pub fn register_procedure(&self, body: &str, procedure: NativeProcedure) {
        self.server.procedures.insert(body.to_string(), procedure);
    }

    /// Drop the server's script cache (`SCRIPT FLUSH`), as a restart would.
    pub fn flush_scripts(&self) {
        let count = self.server.loaded.len();
        self.server.loaded.clear();
        debug!(count, "flushed in-memory script cache");
    }

    /// Number of scripts currently in the server's script cache.
    pub fn loaded_script_count(&self) -> usize {
        self.server.loaded.len()
    }

    /// Run `f` against the keyspace under the server lock.
    pub fn with_keyspace<R>(&self, f: impl FnOnce(&mut Keyspace) -> R) -> R {
        let mut keyspace = self.server.keyspace.lock();
        f(&mut keyspace)
    }

    /// Messages published on `channel`, in order.
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.server.keyspace.lock().published_on(channel)
    }

    /// Retained messages, oldest first.
    pub fn published(&self) -> Vec<Published> {
        self.server.keyspace.lock().published()
    }

    /// Take the retained messages, leaving the log empty.
    pub fn drain_published(&self) -> Vec<Published> {
        self.server.keyspace.lock().drain_published()
    }

    fn ensure_open(&self) -> BackendResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(BackendError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for InMemoryBackend {
    fn script_load(&self, body: &str) -> BackendResult<String> {
        self.ensure_open()?;
        let procedure = self
            .server
            .procedures
            .get(body)
            .map(|entry| *entry.value())
            .ok_or_else(|| {
                BackendError::Command("ERR script has no native procedure on this server".into())
            })?;
        let digest = script_digest(body);
        self.server.loaded.insert(digest.clone(), procedure);
        trace!(digest = %digest, "script loaded");
        Ok(digest)
    }

    fn eval_digest(&self, digest: &str, keys: &[String], args: &[String]) -> BackendResult<Reply> {
        self.ensure_open()?;
        let procedure = self
            .server
            .loaded
            .get(digest)
            .map(|entry| *entry.value())
            .ok_or(BackendError::NoScript)?;
        let mut keyspace = self.server.keyspace.lock();
        procedure(&mut keyspace, keys, args)
    }

    fn exists(&self, key: &str) -> BackendResult<bool> {
        self.ensure_open()?;
        Ok(self.server.keyspace.lock().exists(key))
    }

    fn hget(&self, key: &str, field: &str) -> BackendResult<Option<String>> {
        self.ensure_open()?;
        self.server.keyspace.lock().hget(key, field)
    }

    fn hmget(&self, key: &str, fields: &[String]) -> BackendResult<Vec<Option<String>>> {
        self.ensure_open()?;
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        self.server.keyspace.lock().hmget(key, fields)
    }

    fn smembers(&self, key: &str) -> BackendResult<Vec<String>> {
        self.ensure_open()?;
        self.server.keyspace.lock().smembers(key)
    }

    fn zcard(&self, key: &str) -> BackendResult<u64> {
        self.ensure_open()?;
        self.server.keyspace.lock().zcard(key)
    }

    fn zrange(&self, key: &str, start: i64, stop: i64) -> BackendResult<Vec<String>> {
        self.ensure_open()?;
        self.server.keyspace.lock().zrange(key, start, stop)
    }

    fn zscore(&self, key: &str, member: &str) -> BackendResult<Option<f64>> {
        self.ensure_open()?;
        self.server.keyspace.lock().zscore(key, member)
    }

    fn reconnect(&self) -> BackendResult<Box<dyn Backend>> {
        Ok(Box::new(Self {
            server: Arc::clone(&self.server),
            closed: AtomicBool::new(false),
        }))
    }

    fn close(&self) -> BackendResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("in-memory connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("procedures", &self.server.procedures.len())
            .field("loaded", &self.server.loaded.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ECHO: &str = "return ARGV";

    fn echo(_: &mut Keyspace, _keys: &[String], args: &[String]) -> BackendResult<Reply> {
        Ok(Reply::strings(args.iter().cloned()))
    }

    fn bump(ks: &mut Keyspace, keys: &[String], _args: &[String]) -> BackendResult<Reply> {
        ks.hincrby(&keys[0], "v", 1).map(Reply::Int)
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn load_and_eval_registered_script() {
        let backend = InMemoryBackend::new();
        backend.register_procedure(ECHO, echo);

        let digest = backend.script_load(ECHO).unwrap();
        assert_eq!(digest, script_digest(ECHO));

        let reply = backend.eval_digest(&digest, &[], &args(&["a", "b"])).unwrap();
        assert_eq!(reply, Reply::strings(["a", "b"]));
    }

    #[test]
    fn unknown_body_cannot_be_loaded() {
        let backend = InMemoryBackend::new();
        assert!(matches!(
            backend.script_load("return 42"),
            Err(BackendError::Command(_))
        ));
    }

    #[test]
    fn flush_causes_noscript() {
        let backend = InMemoryBackend::new();
        backend.register_procedure(ECHO, echo);
        let digest = backend.script_load(ECHO).unwrap();
        assert_eq!(backend.loaded_script_count(), 1);

        backend.flush_scripts();
        assert_eq!(backend.loaded_script_count(), 0);
        assert_eq!(
            backend.eval_digest(&digest, &[], &[]),
            Err(BackendError::NoScript)
        );

        // Reloading restores the same digest.
        assert_eq!(backend.script_load(ECHO).unwrap(), digest);
        assert!(backend.eval_digest(&digest, &[], &[]).is_ok());
    }

    #[test]
    fn closed_connection_rejects_commands() {
        let backend = InMemoryBackend::new();
        backend.close().unwrap();
        backend.close().unwrap();
        assert!(backend.is_closed());
        assert_eq!(backend.exists("k"), Err(BackendError::Closed));
        assert_eq!(backend.script_load(ECHO), Err(BackendError::Closed));
    }

    #[test]
    fn reconnect_shares_server_state() {
        let backend = InMemoryBackend::new();
        backend.register_procedure("bump", bump);
        let digest = backend.script_load("bump").unwrap();

        let other = backend.reconnect().unwrap();
        // Loaded scripts live on the server, not the connection.
        let reply = other.eval_digest(&digest, &args(&["h"]), &[]).unwrap();
        assert_eq!(reply, Reply::Int(1));
        assert_eq!(backend.hget("h", "v").unwrap(), Some("1".to_string()));

        backend.close().unwrap();
        assert!(!other.is_closed());
        assert!(other.exists("h").unwrap());
    }

    #[test]
    fn procedures_run_atomically_across_threads() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.register_procedure("bump", bump);
        let digest = backend.script_load("bump").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let backend = Arc::clone(&backend);
                let digest = digest.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        backend.eval_digest(&digest, &args(&["h"]), &[]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(backend.hget("h", "v").unwrap(), Some("400".to_string()));
    }

    #[test]
    fn publish_log_is_bounded_and_drainable() {
        let backend = InMemoryBackend::with_publish_capacity(2);
        backend.with_keyspace(|ks| {
            for n in 0..10 {
                ks.publish("user.change", n.to_string());
            }
        });
        assert_eq!(backend.published_on("user.change"), vec!["8", "9"]);
        assert_eq!(backend.drain_published().len(), 2);
        assert!(backend.published().is_empty());
    }

    #[test]
    fn hmget_with_no_fields_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.hmget("h", &[]).unwrap().is_empty());
    }
}
