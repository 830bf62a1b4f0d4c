/// Errors produced by a backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The server does not know the script digest (its script cache was
    /// flushed or the server restarted).
    #[error("NOSCRIPT: no matching script for digest")]
    NoScript,

    /// The server rejected or failed a command or script.
    #[error("command failed: {0}")]
    Command(String),

    /// The round trip timed out; the command may or may not have run.
    #[error("timed out waiting for reply: {0}")]
    Timeout(String),

    /// The connection broke mid-request; the command may or may not have run.
    #[error("connection dropped: {0}")]
    ConnectionDropped(String),

    /// Could not establish or use the connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// The reply did not have the expected shape.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// The backend has been closed.
    #[error("backend is closed")]
    Closed,
}

impl BackendError {
    /// Returns `true` if a mutation interrupted by this error may have been
    /// applied on the server.
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ConnectionDropped(_))
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_outcome_classification() {
        assert!(BackendError::Timeout("read".into()).is_outcome_unknown());
        assert!(BackendError::ConnectionDropped("reset".into()).is_outcome_unknown());
        assert!(!BackendError::NoScript.is_outcome_unknown());
        assert!(!BackendError::Command("ERR".into()).is_outcome_unknown());
        assert!(!BackendError::Closed.is_outcome_unknown());
    }
}
