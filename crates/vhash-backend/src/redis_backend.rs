use std::time::Duration;

use parking_lot::Mutex;
use redis::{Client, Cmd, Connection, ErrorKind, FromRedisValue, RedisError, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BackendError, BackendResult};
use crate::reply::Reply;
use crate::traits::Backend;

/// Connection settings for [`RedisBackend`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Server URL, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,
    /// Timeout for establishing a connection.
    pub connect_timeout_ms: u64,
    /// Read/write timeout per round trip. `0` disables it.
    pub io_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connect_timeout_ms: 5_000,
            io_timeout_ms: 30_000,
        }
    }
}

impl RedisConfig {
    fn io_timeout(&self) -> Option<Duration> {
        (self.io_timeout_ms > 0).then(|| Duration::from_millis(self.io_timeout_ms))
    }
}

/// A blocking connection to a Redis server.
///
/// The connection sits behind a mutex: concurrent callers are serialized in
/// the order they acquire it, which is the order their commands reach the
/// server.
pub struct RedisBackend {
    client: Client,
    config: RedisConfig,
    connection: Mutex<Option<Connection>>,
}

impl RedisBackend {
    /// Open a client for `config.url` and connect.
    pub fn connect(config: &RedisConfig) -> BackendResult<Self> {
        let client = Client::open(config.url.as_str())?;
        Self::from_client(client, config.clone())
    }

    fn from_client(client: Client, config: RedisConfig) -> BackendResult<Self> {
        let connection =
            client.get_connection_with_timeout(Duration::from_millis(config.connect_timeout_ms))?;
        connection.set_read_timeout(config.io_timeout())?;
        connection.set_write_timeout(config.io_timeout())?;
        info!(url = %config.url, "connected to redis");
        Ok(Self {
            client,
            config,
            connection: Mutex::new(Some(connection)),
        })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> BackendResult<T> {
        let mut guard = self.connection.lock();
        let connection = guard.as_mut().ok_or(BackendError::Closed)?;
        Ok(cmd.query(connection)?)
    }
}

impl Backend for RedisBackend {
    fn script_load(&self, body: &str) -> BackendResult<String> {
        let mut cmd = redis::cmd("SCRIPT");
        cmd.arg("LOAD").arg(body);
        self.query(&cmd)
    }

    fn eval_digest(&self, digest: &str, keys: &[String], args: &[String]) -> BackendResult<Reply> {
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(digest).arg(keys.len()).arg(keys).arg(args);
        let value: Value = self.query(&cmd)?;
        reply_from_value(value)
    }

    fn exists(&self, key: &str) -> BackendResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: i64 = self.query(&cmd)?;
        Ok(count > 0)
    }

    fn hget(&self, key: &str, field: &str) -> BackendResult<Option<String>> {
        let mut cmd = redis::cmd("HGET");
        cmd.arg(key).arg(field);
        self.query(&cmd)
    }

    fn hmget(&self, key: &str, fields: &[String]) -> BackendResult<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("HMGET");
        cmd.arg(key).arg(fields);
        self.query(&cmd)
    }

    fn smembers(&self, key: &str) -> BackendResult<Vec<String>> {
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(key);
        self.query(&cmd)
    }

    fn zcard(&self, key: &str) -> BackendResult<u64> {
        let mut cmd = redis::cmd("ZCARD");
        cmd.arg(key);
        self.query(&cmd)
    }

    fn zrange(&self, key: &str, start: i64, stop: i64) -> BackendResult<Vec<String>> {
        let mut cmd = redis::cmd("ZRANGE");
        cmd.arg(key).arg(start).arg(stop);
        self.query(&cmd)
    }

    fn zscore(&self, key: &str, member: &str) -> BackendResult<Option<f64>> {
        let mut cmd = redis::cmd("ZSCORE");
        cmd.arg(key).arg(member);
        self.query(&cmd)
    }

    fn reconnect(&self) -> BackendResult<Box<dyn Backend>> {
        let backend = Self::from_client(self.client.clone(), self.config.clone())?;
        Ok(Box::new(backend))
    }

    fn close(&self) -> BackendResult<()> {
        if self.connection.lock().take().is_some() {
            debug!(url = %self.config.url, "redis connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.connection.lock().is_none()
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("url", &self.config.url)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl From<RedisError> for BackendError {
    fn from(err: RedisError) -> Self {
        if err.kind() == ErrorKind::NoScriptError {
            BackendError::NoScript
        } else if err.is_timeout() {
            BackendError::Timeout(err.to_string())
        } else if err.is_connection_dropped() {
            BackendError::ConnectionDropped(err.to_string())
        } else if err.is_io_error() || err.is_connection_refusal() {
            BackendError::Connection(err.to_string())
        } else {
            BackendError::Command(err.to_string())
        }
    }
}

/// Convert a raw protocol value into a [`Reply`].
fn reply_from_value(value: Value) -> BackendResult<Reply> {
    match value {
        Value::Nil => Ok(Reply::Nil),
        Value::Int(n) => Ok(Reply::Int(n)),
        Value::BulkString(bytes) => String::from_utf8(bytes)
            .map(Reply::Bulk)
            .map_err(|e| BackendError::UnexpectedReply(format!("non-utf8 bulk string: {e}"))),
        Value::SimpleString(s) => Ok(Reply::Bulk(s)),
        Value::Okay => Ok(Reply::Bulk("OK".to_string())),
        Value::Array(items) => items
            .into_iter()
            .map(reply_from_value)
            .collect::<BackendResult<Vec<_>>>()
            .map(Reply::Array),
        other => Err(BackendError::UnexpectedReply(format!("{other:?}"))),
    }
}
