//! Error types for the core library.

use thiserror::Error;

use crate::backup::BackupError;
use crate::orchestrator::Progress;

/// Classified failure of a mail store operation.
///
/// Every adapter maps its own errors onto this taxonomy so the engine can
/// decide between retrying, re-querying and giving up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Credentials rejected. Never retried.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Timeout, refused or reset connection, locked maildrop.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Unexpected reply to a command on a live session.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The index does not exist in the current view of the mailbox.
    #[error("Message {index} out of range (mailbox holds {count})")]
    IndexOutOfRange {
        /// Requested index.
        index: u32,
        /// Message count known to the session.
        count: u32,
    },

    /// The store cannot be reached as configured (bad host name and similar).
    #[error("Store configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Returns true if the operation may succeed on a fresh session.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns true if retrying can never help.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Config(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum Error {
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The boundary could not be located without guessing.
    #[error("Boundary resolution failed: {0}")]
    BoundaryResolution(String),

    /// Retries ran out; the progress made so far is exact.
    #[error("Retries exhausted: {progress}")]
    RetriesExhausted {
        /// Progress at the time the run gave up.
        progress: Progress,
    },

    /// Archive could not be opened.
    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
