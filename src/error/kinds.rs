//! Directory error taxonomy
//!
//! Every failure surfaced by this crate is one of these kinds:
//! - Validation failures are raised locally, before any remote call
//! - Store and locator failures arrive as raw codes and are classified
//! - Nothing is retried here; `ServerUnavailable` is the caller's retry signal

use std::fmt;

use thiserror::Error;

/// Result type for directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Typed directory error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    // ==================
    // Local validation
    // ==================
    /// Malformed or empty identifier, unsupported enum value
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// Operation requires a lifecycle state the object is not in
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Operation is not valid for the store technology
    #[error("Not supported: {0}")]
    NotSupported(String),

    // ==================
    // Remote outcomes
    // ==================
    /// Object, domain or partition is absent
    #[error("{object} not found: {name}")]
    NotFound { object: String, name: String },

    /// Object already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Caller lacks the rights for the operation
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Server is down, busy or unreachable
    #[error("Server unavailable ({}): {message}", server.as_deref().unwrap_or("unknown"))]
    ServerUnavailable {
        server: Option<String>,
        message: String,
    },

    /// Server or client ran out of memory
    #[error("Resource exhausted")]
    ResourceExhausted,

    /// Catch-all carrying the raw code
    #[error("Operation failed (0x{code:08x}): {message}")]
    OperationFailed { code: u32, message: String },
}

/// Discriminant of [`DirectoryError`], for matching without payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryErrorKind {
    InvalidArgument,
    InvalidState,
    NotSupported,
    NotFound,
    AlreadyExists,
    AccessDenied,
    ServerUnavailable,
    ResourceExhausted,
    OperationFailed,
}

impl DirectoryErrorKind {
    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "DIRPART_INVALID_ARGUMENT",
            Self::InvalidState => "DIRPART_INVALID_STATE",
            Self::NotSupported => "DIRPART_NOT_SUPPORTED",
            Self::NotFound => "DIRPART_NOT_FOUND",
            Self::AlreadyExists => "DIRPART_ALREADY_EXISTS",
            Self::AccessDenied => "DIRPART_ACCESS_DENIED",
            Self::ServerUnavailable => "DIRPART_SERVER_UNAVAILABLE",
            Self::ResourceExhausted => "DIRPART_RESOURCE_EXHAUSTED",
            Self::OperationFailed => "DIRPART_OPERATION_FAILED",
        }
    }
}

impl fmt::Display for DirectoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl DirectoryError {
    /// Create an invalid argument error.
    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an empty-string argument error.
    pub fn empty_argument(name: impl Into<String>) -> Self {
        Self::invalid_argument(name, "must not be empty")
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Create the error raised when a committed object is required.
    pub fn uncommitted() -> Self {
        Self::invalid_state("operation cannot be performed on an uncommitted object")
    }

    /// Create a not-supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    /// Create a not-found error for a named object.
    pub fn not_found(object: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            object: object.into(),
            name: name.into(),
        }
    }

    /// Create an already-exists error.
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists(name.into())
    }

    /// Create a catch-all failure.
    pub fn operation_failed(code: u32, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            code,
            message: message.into(),
        }
    }

    /// Returns the kind of this error
    pub fn kind(&self) -> DirectoryErrorKind {
        match self {
            Self::InvalidArgument { .. } => DirectoryErrorKind::InvalidArgument,
            Self::InvalidState(_) => DirectoryErrorKind::InvalidState,
            Self::NotSupported(_) => DirectoryErrorKind::NotSupported,
            Self::NotFound { .. } => DirectoryErrorKind::NotFound,
            Self::AlreadyExists(_) => DirectoryErrorKind::AlreadyExists,
            Self::AccessDenied(_) => DirectoryErrorKind::AccessDenied,
            Self::ServerUnavailable { .. } => DirectoryErrorKind::ServerUnavailable,
            Self::ResourceExhausted => DirectoryErrorKind::ResourceExhausted,
            Self::OperationFailed { .. } => DirectoryErrorKind::OperationFailed,
        }
    }

    /// Returns the stable error code string
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Whether the failure was raised locally, before any remote call
    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind(),
            DirectoryErrorKind::InvalidArgument
                | DirectoryErrorKind::InvalidState
                | DirectoryErrorKind::NotSupported
        )
    }

    /// Whether the caller may reasonably retry, e.g. with forced rediscovery
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServerUnavailable { .. })
    }
}
