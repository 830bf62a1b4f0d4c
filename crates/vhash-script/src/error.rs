use vhash_backend::BackendError;

/// Errors from running a server-side script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    /// The script could not be loaded or executed.
    #[error("error executing script {script}: {source}")]
    Execution {
        script: &'static str,
        #[source]
        source: BackendError,
    },

    /// The round trip failed in a way that leaves the outcome unknown: the
    /// script may or may not have committed.
    #[error("outcome of script {script} is unknown: {source}")]
    OutcomeUnknown {
        script: &'static str,
        #[source]
        source: BackendError,
    },

    /// The script ran but its reply could not be interpreted.
    #[error("unparsable result from script {script}: {detail}")]
    Unparsable { script: &'static str, detail: String },
}

impl ScriptError {
    /// Classify a backend failure for `script`.
    pub fn from_backend(script: &'static str, source: BackendError) -> Self {
        if source.is_outcome_unknown() {
            Self::OutcomeUnknown { script, source }
        } else {
            Self::Execution { script, source }
        }
    }

    pub fn unparsable(script: &'static str, detail: impl Into<String>) -> Self {
        Self::Unparsable {
            script,
            detail: detail.into(),
        }
    }

    /// Name of the script that failed.
    pub fn script(&self) -> &'static str {
        match self {
            Self::Execution { script, .. }
            | Self::OutcomeUnknown { script, .. }
            | Self::Unparsable { script, .. } => script,
        }
    }

    /// Returns `true` if the failure was caused by a closed backend.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::Execution {
                source: BackendError::Closed,
                ..
            }
        )
    }
}

/// Result alias for script execution.
pub type ScriptResult<T> = Result<T, ScriptError>;
