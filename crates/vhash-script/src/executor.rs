use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace, warn};
use vhash_backend::{Backend, BackendError, Reply};

use crate::error::{ScriptError, ScriptResult};
use crate::script::Script;

/// Runs scripts by digest, loading each body on first use.
///
/// The body -> digest memo is safe for concurrent use. Two threads racing on
/// the first use of a script may both load it; the server returns the same
/// digest to both.
pub struct ScriptExecutor {
    backend: Arc<dyn Backend>,
    digests: DashMap<&'static str, String>,
}

impl ScriptExecutor {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            digests: DashMap::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Execute `script` with the given keys and arguments.
    ///
    /// If the server reports the cached digest unknown, the memo entry is
    /// evicted, the body reloaded, and the call retried once. Any other
    /// failure, including a second `NOSCRIPT`, is returned to the caller.
    pub fn execute(&self, script: &Script, keys: &[String], args: &[String]) -> ScriptResult<Reply> {
        let digest = self.digest(script)?;
        trace!(script = script.name(), keys = ?keys, "executing script");
        match self.backend.eval_digest(&digest, keys, args) {
            Err(BackendError::NoScript) => {
                warn!(script = script.name(), "server lost cached script, reloading");
                self.digests.remove(script.body());
                let digest = self.digest(script)?;
                self.backend
                    .eval_digest(&digest, keys, args)
                    .map_err(|e| ScriptError::from_backend(script.name(), e))
            }
            result => result.map_err(|e| ScriptError::from_backend(script.name(), e)),
        }
    }

    /// Load every script now instead of on first use.
    pub fn preload(&self, scripts: &[Script]) -> ScriptResult<()> {
        for script in scripts {
            self.digest(script)?;
        }
        debug!(count = scripts.len(), "scripts preloaded");
        Ok(())
    }

    /// The memoized digest for `script`, if it has been loaded.
    pub fn cached_digest(&self, script: &Script) -> Option<String> {
        self.digests.get(script.body()).map(|d| d.value().clone())
    }

    /// Forget every memoized digest.
    pub fn invalidate(&self) {
        self.digests.clear();
    }

    fn digest(&self, script: &Script) -> ScriptResult<String> {
        if let Some(digest) = self.digests.get(script.body()) {
            return Ok(digest.value().clone());
        }
        let digest = self
            .backend
            .script_load(script.body())
            .map_err(|e| ScriptError::from_backend(script.name(), e))?;
        debug!(script = script.name(), digest = %digest, "script loaded");
        self.digests.insert(script.body(), digest.clone());
        Ok(digest)
    }
}

impl std::fmt::Debug for ScriptExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptExecutor")
            .field("cached", &self.digests.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use vhash_backend::{BackendResult, InMemoryBackend, Keyspace};

    const COUNTER: Script = Script::new("counter", "return redis.call('hincrby', KEYS[1], 'n', 1)");

    fn counter(ks: &mut Keyspace, keys: &[String], _args: &[String]) -> BackendResult<Reply> {
        ks.hincrby(&keys[0], "n", 1).map(Reply::Int)
    }

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn memory_executor() -> (Arc<InMemoryBackend>, ScriptExecutor) {
        let backend = Arc::new(InMemoryBackend::new());
        backend.register_procedure(COUNTER.body(), counter);
        let executor = ScriptExecutor::new(backend.clone());
        (backend, executor)
    }

    /// Backend double whose replies are scripted per call.
    #[derive(Default)]
    struct ScriptedBackend {
        loads: Mutex<usize>,
        evals: Mutex<usize>,
        eval_results: Mutex<Vec<BackendResult<Reply>>>,
    }

    impl ScriptedBackend {
        fn with_results(results: Vec<BackendResult<Reply>>) -> Self {
            let mut results = results;
            results.reverse();
            Self {
                eval_results: Mutex::new(results),
                ..Default::default()
            }
        }
    }

    impl Backend for ScriptedBackend {
        fn script_load(&self, _body: &str) -> BackendResult<String> {
            *self.loads.lock() += 1;
            Ok("digest".to_string())
        }

        fn eval_digest(&self, _: &str, _: &[String], _: &[String]) -> BackendResult<Reply> {
            *self.evals.lock() += 1;
            self.eval_results
                .lock()
                .pop()
                .unwrap_or(Err(BackendError::Command("no scripted result".into())))
        }

        fn exists(&self, _: &str) -> BackendResult<bool> {
            Ok(false)
        }

        fn hget(&self, _: &str, _: &str) -> BackendResult<Option<String>> {
            Ok(None)
        }

        fn hmget(&self, _: &str, fields: &[String]) -> BackendResult<Vec<Option<String>>> {
            Ok(vec![None; fields.len()])
        }

        fn smembers(&self, _: &str) -> BackendResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn zcard(&self, _: &str) -> BackendResult<u64> {
            Ok(0)
        }

        fn zrange(&self, _: &str, _: i64, _: i64) -> BackendResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn zscore(&self, _: &str, _: &str) -> BackendResult<Option<f64>> {
            Ok(None)
        }

        fn reconnect(&self) -> BackendResult<Box<dyn Backend>> {
            Ok(Box::new(ScriptedBackend::default()))
        }

        fn close(&self) -> BackendResult<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    #[test]
    fn loads_once_then_reuses_digest() {
        let (backend, executor) = memory_executor();
        assert!(executor.cached_digest(&COUNTER).is_none());

        let first = executor.execute(&COUNTER, &keys(&["h"]), &[]).unwrap();
        let second = executor.execute(&COUNTER, &keys(&["h"]), &[]).unwrap();
        assert_eq!(first, Reply::Int(1));
        assert_eq!(second, Reply::Int(2));
        assert_eq!(backend.loaded_script_count(), 1);
        assert!(executor.cached_digest(&COUNTER).is_some());
    }

    #[test]
    fn recovers_transparently_from_server_flush() {
        let (backend, executor) = memory_executor();
        executor.execute(&COUNTER, &keys(&["h"]), &[]).unwrap();

        backend.flush_scripts();
        let reply = executor.execute(&COUNTER, &keys(&["h"]), &[]).unwrap();
        assert_eq!(reply, Reply::Int(2));
        assert_eq!(backend.loaded_script_count(), 1);
    }

    #[test]
    fn retry_is_bounded_to_one() {
        let backend = Arc::new(ScriptedBackend::with_results(vec![
            Err(BackendError::NoScript),
            Err(BackendError::NoScript),
            Ok(Reply::Int(1)),
        ]));
        let executor = ScriptExecutor::new(backend.clone());

        let err = executor.execute(&COUNTER, &[], &[]).unwrap_err();
        assert_eq!(
            err,
            ScriptError::Execution {
                script: "counter",
                source: BackendError::NoScript
            }
        );
        assert_eq!(*backend.evals.lock(), 2);
        assert_eq!(*backend.loads.lock(), 2);
    }

    #[test]
    fn single_noscript_is_invisible() {
        let backend = Arc::new(ScriptedBackend::with_results(vec![
            Err(BackendError::NoScript),
            Ok(Reply::Int(7)),
        ]));
        let executor = ScriptExecutor::new(backend.clone());
        assert_eq!(executor.execute(&COUNTER, &[], &[]).unwrap(), Reply::Int(7));
        assert_eq!(*backend.evals.lock(), 2);
    }

    #[test]
    fn other_failures_are_not_retried() {
        let backend = Arc::new(ScriptedBackend::with_results(vec![
            Err(BackendError::Command("ERR boom".into())),
            Ok(Reply::Int(1)),
        ]));
        let executor = ScriptExecutor::new(backend.clone());

        let err = executor.execute(&COUNTER, &[], &[]).unwrap_err();
        assert!(matches!(err, ScriptError::Execution { script: "counter", .. }));
        assert_eq!(*backend.evals.lock(), 1);
    }

    #[test]
    fn timeout_surfaces_as_unknown_outcome() {
        let backend = Arc::new(ScriptedBackend::with_results(vec![Err(
            BackendError::Timeout("read".into()),
        )]));
        let executor = ScriptExecutor::new(backend);
        let err = executor.execute(&COUNTER, &[], &[]).unwrap_err();
        assert!(matches!(err, ScriptError::OutcomeUnknown { .. }));
    }

    #[test]
    fn load_failure_names_the_script() {
        let backend = Arc::new(InMemoryBackend::new());
        let executor = ScriptExecutor::new(backend);
        let err = executor.execute(&COUNTER, &[], &[]).unwrap_err();
        assert_eq!(err.script(), "counter");
    }

    #[test]
    fn preload_and_invalidate() {
        let (backend, executor) = memory_executor();
        executor.preload(&[COUNTER]).unwrap();
        assert_eq!(backend.loaded_script_count(), 1);
        assert!(executor.cached_digest(&COUNTER).is_some());

        executor.invalidate();
        assert!(executor.cached_digest(&COUNTER).is_none());
        assert_eq!(executor.execute(&COUNTER, &keys(&["h"]), &[]).unwrap(), Reply::Int(1));
    }

    #[test]
    fn concurrent_first_use_is_safe() {
        let (backend, executor) = memory_executor();
        let executor = Arc::new(executor);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let executor = Arc::clone(&executor);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        executor.execute(&COUNTER, &keys(&["h"]), &[]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(backend.with_keyspace(|ks| ks.hget("h", "n").unwrap()), Some("100".to_string()));
    }
}
