//! Error types for the dispatch coordinator.
//!
//! `FetchError` is what a worker ultimately sees; the other enums cover
//! collaborator failures and lifecycle misuse.

use thiserror::Error;

/// Transport status class attached to every caller-facing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    BadRequest,
    InternalServerError,
}

impl ErrorStatus {
    /// HTTP-style status code for the transport layer.
    pub fn code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::InternalServerError => 500,
        }
    }
}

/// Failures reported by a lock service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockServiceError {
    #[error("Process engine '{0}' is not available")]
    UnknownEngine(String),

    #[error("Process engine '{engine}' failed to fetch and lock: {message}")]
    Engine { engine: String, message: String },

    #[error("Lock service panicked: {0}")]
    Panicked(String),
}

impl LockServiceError {
    pub fn engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine { engine: engine.into(), message: message.into() }
    }
}

/// Outcome errors delivered to a response handle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("At the moment the server has to handle too many requests at the same time. Please try again later.")]
    TooManyRequests,

    #[error("The asynchronous response timeout cannot be set to a value greater than {max_ms} milliseconds")]
    TimeoutTooLarge { max_ms: u64 },

    #[error(transparent)]
    LockService(#[from] LockServiceError),

    #[error("Request rejected due to shutdown of application server.")]
    Shutdown,
}

impl FetchError {
    pub fn status(&self) -> ErrorStatus {
        match self {
            Self::TimeoutTooLarge { .. } => ErrorStatus::BadRequest,
            Self::TooManyRequests | Self::LockService(_) | Self::Shutdown => {
                ErrorStatus::InternalServerError
            }
        }
    }

    /// Rejections that never reach the pending registry.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::TooManyRequests | Self::TimeoutTooLarge { .. })
    }
}

/// Lifecycle errors raised by [`crate::Dispatcher`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatcher has been shut down and cannot be restarted")]
    Stopped,

    #[error("Failed to spawn dispatch thread: {0}")]
    Spawn(#[from] std::io::Error),
}
