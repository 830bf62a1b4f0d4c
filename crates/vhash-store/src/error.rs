//! Error types for store operations.

use thiserror::Error;
use vhash_backend::BackendError;
use vhash_script::ScriptError;
use vhash_types::TypeError;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The call was malformed and rejected before any round trip.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A protocol script failed, or its outcome is unknown.
    #[error(transparent)]
    Script(ScriptError),

    /// A plain backend command failed.
    #[error("backend error: {0}")]
    Backend(#[source] BackendError),

    /// A value, reference or payload could not be encoded or decoded.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// The configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error while reading configuration.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidArgument(detail.into())
    }

    /// Returns `true` if a script's effect may or may not have been applied.
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, Self::Script(ScriptError::OutcomeUnknown { .. }))
    }
}

impl From<ScriptError> for StoreError {
    fn from(err: ScriptError) -> Self {
        if err.is_closed() {
            Self::Closed
        } else {
            Self::Script(err)
        }
    }
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Closed => Self::Closed,
            other => Self::Backend(other),
        }
    }
}

/// Convenience type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
