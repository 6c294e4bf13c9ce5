//! Error types for POP3 operations.

use std::io;
use std::time::Duration;

use crate::types::ResponseCode;

/// Result type alias for POP3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// POP3 error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Server answered `-ERR`.
    #[error("POP3 error{}: {message}", code.as_ref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Server {
        /// Extended response code (RFC 2449), if the server sent one.
        code: Option<ResponseCode>,
        /// Error text from the server.
        message: String,
    },

    /// Server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A command did not complete in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Protocol error (malformed or unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates a server error from an optional response code and message.
    #[must_use]
    pub fn server(code: Option<ResponseCode>, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
        }
    }

    /// Returns true if the failure is worth retrying on a fresh connection.
    ///
    /// Covers network failures, timeouts and the `[IN-USE]` / `[SYS/TEMP]`
    /// response codes.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout(_) => true,
            Self::Server { code: Some(code), .. } => code.is_transient(),
            _ => false,
        }
    }

    /// Returns true if the connection can no longer be used after this error.
    #[must_use]
    pub const fn is_fatal_to_connection(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Tls(_) | Self::Timeout(_))
    }
}
