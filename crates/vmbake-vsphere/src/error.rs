//! Error types for the vSphere driver crate.

use thiserror::Error;

/// Categorised error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VsphereErrorKind {
    /// Endpoint unreachable or transport failure
    ConnectionError,
    /// Authentication failed (401) or no active session
    AuthenticationError,
    /// Malformed connection or driver configuration
    InvalidConfig,
    /// Inventory lookup matched nothing
    NotFound,
    /// Inventory lookup matched more than one object
    Ambiguous,
    /// An operation precondition does not hold (nothing was submitted)
    Precondition,
    /// Task failed on vCenter
    TaskError,
    /// Timeout
    Timeout,
    /// Power state could not be queried
    StateError,
    /// The session's cancellation token fired
    Cancelled,
    /// Permission denied (403)
    AccessDenied,
    /// HTTP / API error with status code
    ApiError(u16),
    /// JSON parse / deserialization error
    ParseError,
    /// Generic
    Other,
}

/// Crate error type carrying a kind + human-readable message.
#[derive(Debug, Clone, Error)]
#[error("[{kind:?}] {message}")]
pub struct VsphereError {
    pub kind: VsphereErrorKind,
    pub message: String,
}

impl VsphereError {
    pub fn new(kind: VsphereErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::ConnectionError, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::AuthenticationError, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::InvalidConfig, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::NotFound, msg)
    }

    pub fn ambiguous(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::Ambiguous, msg)
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::Precondition, msg)
    }

    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::ApiError(status), msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::ParseError, msg)
    }

    pub fn task(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::TaskError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::Timeout, msg)
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::StateError, msg)
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::Cancelled, msg)
    }

    /// Whether an inventory lookup failed to match exactly one object.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self.kind,
            VsphereErrorKind::NotFound | VsphereErrorKind::Ambiguous
        )
    }
}

impl From<reqwest::Error> for VsphereError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("HTTP timeout: {e}"))
        } else if e.is_connect() {
            Self::connection(format!("Connection failed: {e}"))
        } else {
            Self::new(VsphereErrorKind::Other, format!("HTTP error: {e}"))
        }
    }
}

impl From<serde_json::Error> for VsphereError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {e}"))
    }
}

/// Convenience alias.
pub type VsphereResult<T> = Result<T, VsphereError>;
