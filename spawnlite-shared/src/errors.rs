//! Error types for spawnlite.

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type SpawnliteResult<T> = Result<T, SpawnliteError>;

/// Everything that can go wrong while supervising the helper process.
///
/// The variants matter to callers: a `Transport` or `Setup` error means one
/// request failed and the next call may well succeed, while `Restart` means
/// the helper itself could not be rebuilt and the subsystem should be treated
/// as temporarily unavailable.
#[derive(Debug, Error)]
pub enum SpawnliteError {
    /// Local transport or helper process creation failed.
    #[error("setup error: {0}")]
    Setup(String),

    /// Host-side file I/O failed, e.g. the helper log file cannot be opened.
    #[error("i/o error: {0}")]
    Io(String),

    /// The exchange with the helper failed and the channel is now suspect.
    /// The supervisor rebuilds the helper on the next request.
    #[error("transport error: {0}")]
    Transport(String),

    /// The helper had to be rebuilt during a spawn request and the rebuild
    /// itself failed. Carries the causing `Setup`/`Io` error.
    #[error("helper restart failed: {source}")]
    Restart {
        #[source]
        source: Box<SpawnliteError>,
    },

    /// Invalid supervisor configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl SpawnliteError {
    /// Wrap this error as a restart failure.
    pub fn into_restart(self) -> Self {
        SpawnliteError::Restart {
            source: Box::new(self),
        }
    }

    /// True when the helper could not be rebuilt, as opposed to a single
    /// request failing.
    pub fn is_restart_failure(&self) -> bool {
        matches!(self, SpawnliteError::Restart { .. })
    }

    /// The causing error of a restart failure, if this is one.
    pub fn restart_cause(&self) -> Option<&SpawnliteError> {
        match self {
            SpawnliteError::Restart { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_wrapper_preserves_cause() {
        let cause = SpawnliteError::Setup("cannot create a Unix socket pair".into());
        let wrapped = cause.into_restart();

        assert!(wrapped.is_restart_failure());
        let cause = wrapped.restart_cause().expect("cause should be present");
        assert!(matches!(cause, SpawnliteError::Setup(_)));
        assert!(wrapped.to_string().contains("restart failed"));
        assert!(wrapped.to_string().contains("socket pair"));
    }

    #[test]
    fn plain_errors_are_not_restart_failures() {
        let err = SpawnliteError::Transport("the helper exited unexpectedly".into());
        assert!(!err.is_restart_failure());
        assert!(err.restart_cause().is_none());
    }

    #[test]
    fn error_source_chain_reaches_cause() {
        use std::error::Error;

        let wrapped = SpawnliteError::Io("cannot open log file".into()).into_restart();
        let source = wrapped.source().expect("source should be present");
        assert!(source.to_string().contains("log file"));
    }
}
