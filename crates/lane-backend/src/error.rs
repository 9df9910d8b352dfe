//! Error types raised by backend collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Substrings that mark a backend failure as transport-related.
///
/// Only consulted for errors whose kind is [`ErrorKind::Other`], i.e. when the
/// backend could not say what went wrong in a structured way.
pub const TRANSIENT_MARKERS: &[&str] = &[
    "connection reset",
    "connection aborted",
    "connection refused",
    "device offline",
    "transport",
    "socket",
    "rpc",
    "timed out",
    "timeout",
];

/// Structured failure category reported by a backend.
///
/// These codes are stable and surface in request-loop error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The device or automation service could not be reached, or dropped the connection.
    Connection,
    /// A backend call did not complete in time.
    Timeout,
    /// Failure in the transport/RPC layer between host and device.
    Transport,
    /// The backend rejected the call's arguments.
    Validation,
    /// The requested element, package or resource does not exist.
    NotFound,
    /// Unclassified failure.
    Other,
}

impl ErrorKind {
    /// Whether a failure of this kind is safe to retry after reconnecting.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Connection | Self::Timeout | Self::Transport)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "CONNECTION"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Transport => write!(f, "TRANSPORT"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

/// Case-insensitive substring match against [`TRANSIENT_MARKERS`].
///
/// This is a heuristic, not a classification: "rpc" will also match words
/// that merely contain it.
pub fn message_looks_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// A failure raised by a device-bridge or UI-automation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    /// Structured category.
    pub kind: ErrorKind,
    /// Single-line description from the backend.
    pub message: String,
}

impl BackendError {
    /// Create a new backend error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a CONNECTION error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Create a TIMEOUT error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Create a TRANSPORT error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Create a VALIDATION error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a NOT_FOUND error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create an unclassified error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }

    /// Whether this failure is safe to retry after a fresh connection.
    ///
    /// A structured transient kind always qualifies. Unclassified errors fall
    /// back to [`message_looks_transient`]; validation and not-found errors
    /// never qualify whatever their text says.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            kind if kind.is_transient() => true,
            ErrorKind::Other => message_looks_transient(&self.message),
            _ => false,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        let kind = match err.kind() {
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected => ErrorKind::Connection,
            Io::TimedOut => ErrorKind::Timeout,
            Io::BrokenPipe | Io::UnexpectedEof => ErrorKind::Transport,
            _ => ErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

/// Result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_kinds() {
        assert!(ErrorKind::Connection.is_transient());
        assert!(ErrorKind::Timeout.is_transient());
        assert!(ErrorKind::Transport.is_transient());
        assert!(!ErrorKind::Validation.is_transient());
        assert!(!ErrorKind::NotFound.is_transient());
        assert!(!ErrorKind::Other.is_transient());
    }

    #[test]
    fn test_message_heuristic_is_case_insensitive() {
        assert!(message_looks_transient("Connection reset by peer"));
        assert!(message_looks_transient("adb: DEVICE OFFLINE"));
        assert!(message_looks_transient("uiautomator RPC error"));
        assert!(message_looks_transient("read Timed Out"));
        assert!(!message_looks_transient("invalid parameter"));
        assert!(!message_looks_transient("element not found"));
    }

    #[test]
    fn test_other_kind_uses_heuristic() {
        assert!(BackendError::other("socket closed unexpectedly").is_transient());
        assert!(!BackendError::other("bad selector").is_transient());
    }

    #[test]
    fn test_validation_never_transient() {
        // Text mentions a timeout, but the backend said it was a bad argument.
        let err = BackendError::validation("timeout must be positive");
        assert!(!err.is_transient());

        let err = BackendError::not_found("socket view not found");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_io_error_mapping() {
        use std::io::{Error, ErrorKind as Io};

        let err: BackendError = Error::new(Io::ConnectionReset, "reset").into();
        assert_eq!(err.kind, ErrorKind::Connection);

        let err: BackendError = Error::new(Io::TimedOut, "slow").into();
        assert_eq!(err.kind, ErrorKind::Timeout);

        let err: BackendError = Error::new(Io::PermissionDenied, "denied").into();
        assert_eq!(err.kind, ErrorKind::Other);
    }

    #[test]
    fn test_display() {
        let err = BackendError::transport("pipe closed");
        assert_eq!(err.to_string(), "TRANSPORT: pipe closed");
        assert_eq!(ErrorKind::NotFound.to_string(), "NOT_FOUND");
    }

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorKind::NotFound).unwrap();
        assert_eq!(json, "\"NOT_FOUND\"");
    }
}
