//! The [`Backend`] trait defining the command surface used by the store.

use crate::error::BackendResult;
use crate::reply::Reply;

/// A connection to a key-value server with server-side scripting.
///
/// Implementations must be thread-safe (`Send + Sync`). A single backend may
/// be shared by many callers; commands issued through it are serialized in
/// the order they reach the connection.
///
/// Mutations are never issued directly: they run inside scripts invoked with
/// [`Backend::eval_digest`], which the server executes atomically.
pub trait Backend: Send + Sync {
    /// Register a script body with the server and return its digest.
    fn script_load(&self, body: &str) -> BackendResult<String>;

    /// Run a previously loaded script by digest.
    ///
    /// Returns [`BackendError::NoScript`](crate::BackendError::NoScript) if
    /// the server no longer knows the digest.
    fn eval_digest(&self, digest: &str, keys: &[String], args: &[String]) -> BackendResult<Reply>;

    /// `EXISTS key`.
    fn exists(&self, key: &str) -> BackendResult<bool>;

    /// `HGET key field`.
    fn hget(&self, key: &str, field: &str) -> BackendResult<Option<String>>;

    /// `HMGET key field...`, one entry per requested field in order.
    ///
    /// An empty field list yields an empty result without a round trip.
    fn hmget(&self, key: &str, fields: &[String]) -> BackendResult<Vec<Option<String>>>;

    /// `SMEMBERS key`.
    fn smembers(&self, key: &str) -> BackendResult<Vec<String>>;

    /// `ZCARD key`.
    fn zcard(&self, key: &str) -> BackendResult<u64>;

    /// `ZRANGE key start stop`, members in ascending score order. Negative
    /// indexes count from the end.
    fn zrange(&self, key: &str, start: i64, stop: i64) -> BackendResult<Vec<String>>;

    /// `ZSCORE key member`.
    fn zscore(&self, key: &str, member: &str) -> BackendResult<Option<f64>>;

    /// Open a fresh connection to the same server with the same client
    /// configuration. Nothing cached on this connection is shared.
    fn reconnect(&self) -> BackendResult<Box<dyn Backend>>;

    /// Close the connection. Later calls fail with
    /// [`BackendError::Closed`](crate::BackendError::Closed). Closing twice
    /// is a no-op.
    fn close(&self) -> BackendResult<()>;

    fn is_closed(&self) -> bool;
}
