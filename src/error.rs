//! Error types for process readiness and log synchronization.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by process handles.
///
/// The type is `Clone` so that a single log transport failure can be handed
/// to every pending waiter and to every caller that subscribes afterwards.
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    /// The requested condition did not occur within the deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that gave up (e.g. "wait_for_log").
        operation: &'static str,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The process terminated before the awaited condition was met.
    #[error("process exited before ready (exit code: {})", display_code(.exit_code))]
    ProcessExited {
        /// Exit code reported by the provider, if it could be determined.
        exit_code: Option<i32>,
    },

    /// The provider's log source (or another provider call) failed.
    #[error("transport error: {0:#}")]
    Transport(Arc<anyhow::Error>),

    /// The backend has neither a native nor a client-side implementation.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A regular expression pattern failed to compile.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// The provider did not report an exit code and its contract does not
    /// allow one to be inferred.
    #[error("provider did not report an exit code")]
    UnknownExitCode,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "unknown".to_string(),
    }
}

impl ProcessError {
    /// Create a timeout error for the named operation.
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        ProcessError::Timeout { operation, after }
    }

    /// Create a process-exited error.
    pub fn exited(exit_code: Option<i32>) -> Self {
        ProcessError::ProcessExited { exit_code }
    }

    /// Wrap a provider failure.
    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        ProcessError::Transport(Arc::new(err.into()))
    }

    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::Timeout { .. })
    }

    /// Check if this error means the process exited before it became ready.
    pub fn is_process_exited(&self) -> bool {
        matches!(self, ProcessError::ProcessExited { .. })
    }

    /// Check if this error came from the provider's transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProcessError::Transport(_))
    }

    /// Check if this error represents a missing capability.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, ProcessError::NotSupported(_))
    }

    /// The exit code carried by a [`ProcessError::ProcessExited`] error.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::ProcessExited { exit_code } => *exit_code,
            _ => None,
        }
    }

    /// Convert a backend failure into a process error.
    ///
    /// Errors that are already `ProcessError`s pass through unchanged, and a
    /// [`ProcessAlreadyExited`] marker becomes [`ProcessError::ProcessExited`].
    pub fn from_backend(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<ProcessError>() {
            return err.clone();
        }
        if let Some(exited) = err.downcast_ref::<ProcessAlreadyExited>() {
            return ProcessError::exited(exited.exit_code);
        }
        ProcessError::Transport(Arc::new(err))
    }
}

impl From<regex::Error> for ProcessError {
    fn from(err: regex::Error) -> Self {
        ProcessError::InvalidPattern(err.to_string())
    }
}

/// Marker error a backend raises when a native call failed because the
/// process had already exited.
///
/// Handles recognise it and fall back to deriving the answer from buffered
/// output instead of failing outright.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("process already exited")]
pub struct ProcessAlreadyExited {
    /// Exit code, when the provider included one.
    pub exit_code: Option<i32>,
}

/// Result type alias for process operations.
pub type Result<T> = std::result::Result<T, ProcessError>;
