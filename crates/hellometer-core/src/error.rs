//! Shared error type across hellometer crates.

use thiserror::Error;

/// How the pipeline treats an error (stable, used as a log field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Startup cannot continue; the process exits before serving.
    Fatal,
    /// Transient delivery failure; the exporter may try again.
    Retryable,
    /// The batch (or sample) is dropped without retry.
    Dropped,
    /// Bug or broken invariant.
    Internal,
}

impl Disposition {
    /// String representation used in structured logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Fatal => "FATAL",
            Disposition::Retryable => "RETRYABLE",
            Disposition::Dropped => "DROPPED",
            Disposition::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, HellometerError>;

/// Unified error type used by core and server.
#[derive(Debug, Error)]
pub enum HellometerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected by collector: {0}")]
    Rejected(String),
    #[error("deadline exceeded")]
    Timeout,
    #[error("internal: {0}")]
    Internal(String),
}

impl HellometerError {
    /// Map the error to how callers are expected to treat it.
    pub fn disposition(&self) -> Disposition {
        match self {
            HellometerError::Config(_) => Disposition::Fatal,
            HellometerError::Transport(_) | HellometerError::Timeout => Disposition::Retryable,
            HellometerError::Rejected(_) => Disposition::Dropped,
            HellometerError::Internal(_) => Disposition::Internal,
        }
    }

    /// Whether a delivery attempt that failed with this error may be repeated.
    pub fn is_retryable(&self) -> bool {
        self.disposition() == Disposition::Retryable
    }
}
