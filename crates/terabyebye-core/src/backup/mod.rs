//! Message backup.
//!
//! A [`BackupSink`] receives each message before it is marked for deletion.
//! The engine marks a message only after the sink acknowledged it.

#![allow(async_fn_in_trait)]

mod mbox;

pub use mbox::MboxArchive;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Backup failures.
#[derive(Debug, Error)]
pub enum BackupError {
    /// I/O error while writing the archive.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink refused the message.
    #[error("Message {index} rejected: {reason}")]
    Rejected {
        /// Index of the rejected message.
        index: u32,
        /// Why it was rejected.
        reason: String,
    },
}

/// Destination for message backups.
pub trait BackupSink {
    /// Durably stores one raw message. Returns only after the data is safe.
    ///
    /// # Errors
    ///
    /// Any error means the message was not stored and must not be deleted.
    async fn store(
        &mut self,
        index: u32,
        raw: &[u8],
        date: Option<DateTime<Utc>>,
    ) -> Result<(), BackupError>;

    /// Per-archive counts, for the final report.
    fn report(&self) -> Vec<(String, u32)>;
}
