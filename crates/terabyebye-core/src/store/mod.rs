//! The mail store capability.
//!
//! The engine only needs a handful of coarse operations from a mailbox:
//! count, fetch headers, retrieve, mark for deletion, reset and commit on
//! close. [`MailStore`] opens authenticated [`MailSession`]s; a session is
//! strictly sequential and is consumed by [`MailSession::commit`] or
//! [`MailSession::abort`].
//!
//! Adapters:
//! - [`Pop3Store`] talks to a real server.
//! - [`MemoryStore`] keeps messages in memory and can inject failures.

#![allow(async_fn_in_trait)]

mod memory;
mod pop3;

pub use memory::{Fault, MemorySession, MemoryStore, synthetic_message};
pub use pop3::{Pop3Session, Pop3Settings, Pop3Store, Security};
pub use terabyebye_pop3::MailboxStat;

use crate::error::StoreResult;

/// Something that can open sessions against one mailbox.
pub trait MailStore {
    /// Session type produced by [`MailStore::open`].
    type Session: MailSession;

    /// Opens and authenticates a new session.
    ///
    /// # Errors
    ///
    /// [`StoreError::Auth`](crate::StoreError::Auth) for rejected credentials,
    /// [`StoreError::Transient`](crate::StoreError::Transient) for network
    /// trouble or a locked maildrop.
    async fn open(&self) -> StoreResult<Self::Session>;

    /// Short description of the endpoint, for logs.
    fn describe(&self) -> String;
}

/// One authenticated session. Indices are 1-based and stable only for the
/// lifetime of the session.
pub trait MailSession {
    /// Returns the message count and total size.
    ///
    /// # Errors
    ///
    /// Returns a classified store error.
    async fn stat(&mut self) -> StoreResult<MailboxStat>;

    /// Returns the raw header block of the message at `index`.
    ///
    /// # Errors
    ///
    /// [`StoreError::IndexOutOfRange`](crate::StoreError::IndexOutOfRange)
    /// when `index` is past the end of the mailbox.
    async fn fetch_header(&mut self, index: u32) -> StoreResult<Vec<u8>>;

    /// Returns the full raw message at `index`.
    ///
    /// # Errors
    ///
    /// Same as [`MailSession::fetch_header`].
    async fn retrieve(&mut self, index: u32) -> StoreResult<Vec<u8>>;

    /// Marks the message at `index` for deletion on commit.
    ///
    /// # Errors
    ///
    /// Same as [`MailSession::fetch_header`].
    async fn mark_deleted(&mut self, index: u32) -> StoreResult<()>;

    /// Unmarks everything marked in this session.
    ///
    /// # Errors
    ///
    /// Returns a classified store error.
    async fn reset(&mut self) -> StoreResult<()>;

    /// Closes the session cleanly, making every mark durable.
    ///
    /// # Errors
    ///
    /// An error means the outcome is unknown; callers must re-query the
    /// count to learn what happened.
    async fn commit(self) -> StoreResult<()>;

    /// Drops the connection without committing. Marks are discarded.
    async fn abort(self);
}
