//! Error taxonomy shared by every orchestration component.

use thiserror::Error;

/// Result type alias used throughout the orchestration core.
pub type Result<T> = std::result::Result<T, CoreError>;

/// The error kinds a workflow, activity, or store operation can surface.
///
/// Retryability is a property of the kind, not of the call site: an activity
/// boundary converts a transport or store failure into one of these kinds,
/// and the engine's retry policy consults [`ErrorKind::is_retryable_by_default`]
/// when `non_retryable_error_kinds` is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    QueueFull,
    Timeout,
    Unavailable,
    Cancelled,
    NoAgentAvailable,
    Internal,
}

impl ErrorKind {
    pub fn is_retryable_by_default(self) -> bool {
        !matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::NotFound
                | ErrorKind::Conflict
                | ErrorKind::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::QueueFull => "queue_full",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::NoAgentAvailable => "no_agent_available",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Crate-wide error type for domain/store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("queue full: {0}")]
    QueueFull(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("no agent available: {0}")]
    NoAgentAvailable(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict(msg.into())
    }

    pub fn queue_full(msg: impl Into<String>) -> Self {
        CoreError::QueueFull(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        CoreError::Timeout(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        CoreError::Unavailable(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        CoreError::Cancelled(msg.into())
    }

    pub fn no_agent_available(msg: impl Into<String>) -> Self {
        CoreError::NoAgentAvailable(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::QueueFull(_) => ErrorKind::QueueFull,
            CoreError::Timeout(_) => ErrorKind::Timeout,
            CoreError::Unavailable(_) => ErrorKind::Unavailable,
            CoreError::Cancelled(_) => ErrorKind::Cancelled,
            CoreError::NoAgentAvailable(_) => ErrorKind::NoAgentAvailable,
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable_by_default()
    }
}
