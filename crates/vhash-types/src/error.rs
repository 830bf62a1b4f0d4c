use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object reference {literal:?}: expected <collection>/<id>")]
    InvalidReference { literal: String },

    #[error("cannot encode value: {0}")]
    Encode(String),

    #[error("cannot decode {raw:?}: {reason}")]
    Decode { raw: String, reason: String },

    #[error("invalid notification payload: {0}")]
    InvalidNotification(String),
}

/// Convenience alias for type operations.
pub type Result<T> = std::result::Result<T, TypeError>;
