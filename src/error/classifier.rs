//! Raw error classification
//!
//! Maps raw store/locator codes into [`DirectoryError`]:
//! - Pure function of (code, context); no state
//! - Store codes arrive as facility-7 HRESULTs, locator codes as Win32 codes;
//!   both are normalized to Win32 before lookup
//! - The locator's cancelled no-op signal is filtered before any error is built

use std::fmt;

use super::kinds::{DirectoryError, DirectoryResult};
use crate::store::DirectoryContext;

/// Win32 codes with a defined meaning for classification or for callers
pub mod codes {
    pub const ACCESS_DENIED: u32 = 5;
    pub const NOT_ENOUGH_MEMORY: u32 = 8;
    pub const OUTOFMEMORY: u32 = 14;
    pub const CANCELLED: u32 = 1223;
    pub const NO_LOGON_SERVERS: u32 = 1311;
    pub const LOGON_FAILURE: u32 = 1326;
    pub const NO_SUCH_DOMAIN: u32 = 1355;
    pub const RPC_S_OUT_OF_RESOURCES: u32 = 1721;
    pub const RPC_S_SERVER_UNAVAILABLE: u32 = 1722;
    pub const RPC_S_CALL_FAILED: u32 = 1726;
    pub const OBJECT_ALREADY_EXISTS: u32 = 5010;
    pub const DS_BUSY: u32 = 8206;
    pub const DS_UNAVAILABLE: u32 = 8207;
    pub const DS_NOT_ALLOWED_ON_NON_LEAF: u32 = 8213;
    pub const DS_INAPPROPRIATE_AUTH: u32 = 8233;
    pub const DS_CONSTRAINT_VIOLATION: u32 = 8239;
    pub const DS_NO_SUCH_OBJECT: u32 = 8240;
    pub const DS_INVALID_DN_SYNTAX: u32 = 8242;
    pub const DS_UNWILLING_TO_PERFORM: u32 = 8245;
    pub const DS_SERVER_DOWN: u32 = 8250;
    pub const DS_DRA_OUT_OF_MEM: u32 = 8446;
    pub const DS_DRA_ACCESS_DENIED: u32 = 8453;
}

const HRESULT_WIN32_FACILITY: u32 = 0x8007_0000;

/// A raw failure reported by the store or the locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawError {
    code: u32,
    message: String,
}

impl RawError {
    /// Create from a raw code exactly as reported.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a store-style (HRESULT) error from a Win32 code.
    pub fn store(win32: u32, message: impl Into<String>) -> Self {
        Self::new(HRESULT_WIN32_FACILITY | (win32 & 0xFFFF), message)
    }

    /// Create a locator-style (Win32) error.
    pub fn locator(win32: u32, message: impl Into<String>) -> Self {
        Self::new(win32, message)
    }

    /// The code as reported
    pub fn code(&self) -> u32 {
        self.code
    }

    /// The code normalized into the Win32 space
    pub fn win32_code(&self) -> u32 {
        if self.code & 0xFFFF_0000 == HRESULT_WIN32_FACILITY {
            self.code & 0xFFFF
        } else {
            self.code
        }
    }

    /// Whether this error carries the given Win32 code
    pub fn is(&self, win32: u32) -> bool {
        self.win32_code() == win32
    }

    /// The message reported alongside the code
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this is the locator's intentional no-op (cancelled) signal
    pub fn is_cancelled_signal(&self) -> bool {
        self.is(codes::CANCELLED)
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}: {}", self.code, self.message)
    }
}

impl std::error::Error for RawError {}

/// Stateless mapping from raw codes to typed errors
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a raw error. `context` supplies the server name for
    /// `ServerUnavailable`.
    pub fn classify(raw: &RawError, context: Option<&DirectoryContext>) -> DirectoryError {
        let message = raw.message().to_string();
        match raw.win32_code() {
            codes::ACCESS_DENIED | codes::DS_DRA_ACCESS_DENIED | codes::LOGON_FAILURE => {
                DirectoryError::AccessDenied(message)
            }
            codes::OBJECT_ALREADY_EXISTS => DirectoryError::AlreadyExists(message),
            codes::NOT_ENOUGH_MEMORY
            | codes::OUTOFMEMORY
            | codes::DS_DRA_OUT_OF_MEM
            | codes::RPC_S_OUT_OF_RESOURCES => DirectoryError::ResourceExhausted,
            codes::DS_SERVER_DOWN
            | codes::DS_BUSY
            | codes::DS_UNAVAILABLE
            | codes::NO_LOGON_SERVERS
            | codes::NO_SUCH_DOMAIN
            | codes::RPC_S_SERVER_UNAVAILABLE
            | codes::RPC_S_CALL_FAILED => DirectoryError::ServerUnavailable {
                server: context.and_then(|c| c.server_name()).map(str::to_string),
                message,
            },
            _ => DirectoryError::operation_failed(raw.code(), message),
        }
    }

    /// Classify a batch of per-server failures.
    ///
    /// Cancelled signals are dropped first; `None` means nothing is left to report.
    /// The first remaining failure determines the error.
    pub fn aggregate(
        errors: &[RawError],
        context: Option<&DirectoryContext>,
    ) -> Option<DirectoryError> {
        errors
            .iter()
            .find(|e| !e.is_cancelled_signal())
            .map(|e| Self::classify(e, context))
    }
}

/// Classification shorthand for raw results
pub trait Classify<T> {
    /// Classify the error side against `context`.
    fn classified(self, context: &DirectoryContext) -> DirectoryResult<T>;
}

impl<T> Classify<T> for Result<T, RawError> {
    fn classified(self, context: &DirectoryContext) -> DirectoryResult<T> {
        self.map_err(|e| ErrorClassifier::classify(&e, Some(context)))
    }
}
