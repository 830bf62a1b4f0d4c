//! Key-value backends for vhash.
//!
//! A backend exposes the small command surface the object store needs:
//! loading and invoking server-side scripts by digest, plus a handful of
//! read commands (`EXISTS`, `HGET`, `HMGET`, `SMEMBERS`, `ZCARD`, `ZRANGE`,
//! `ZSCORE`). All mutations go through scripts, so each one is atomic on the
//! server.
//!
//! # Backends
//!
//! All backends implement the [`Backend`] trait:
//!
//! - [`RedisBackend`]: a blocking Redis connection (`EVALSHA` + Lua)
//! - [`InMemoryBackend`]: a single-process server for tests and embedding.
//!   Scripts are executed by [`NativeProcedure`]s registered against their
//!   body, under one keyspace lock.
//!
//! # Failure classes
//!
//! [`BackendError::NoScript`] is the only error a caller should recover from
//! automatically (reload and retry once). [`BackendError::Timeout`] and
//! [`BackendError::ConnectionDropped`] leave the outcome of a mutation
//! unknown.

pub mod digest;
pub mod error;
pub mod keyspace;
pub mod memory;
pub mod redis_backend;
pub mod reply;
pub mod traits;

pub use digest::script_digest;
pub use error::{BackendError, BackendResult};
pub use keyspace::{Keyspace, Published, DEFAULT_PUBLISH_CAPACITY};
pub use memory::{InMemoryBackend, NativeProcedure};
pub use redis_backend::{RedisBackend, RedisConfig};
pub use reply::Reply;
pub use traits::Backend;
