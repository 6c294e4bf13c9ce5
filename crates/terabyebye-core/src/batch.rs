//! Two-phase deletion batches.
//!
//! Marks are collected with [`MarkSet::mark`] and made durable only by
//! [`MarkSet::commit`], which consumes the session. [`MarkSet::abort`] drops
//! the session so the server discards every mark.

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::MailSession;

/// Indices marked for deletion within one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkSet {
    marked: Vec<u32>,
}

impl MarkSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `index` on `session`. A malformed reply gets one retry.
    ///
    /// # Errors
    ///
    /// Returns the store error if the mark could not be placed; the set is
    /// unchanged in that case.
    pub async fn mark<S: MailSession>(&mut self, session: &mut S, index: u32) -> StoreResult<()> {
        match session.mark_deleted(index).await {
            Ok(()) => {}
            Err(StoreError::Protocol(msg)) => {
                warn!(index, error = %msg, "DELE failed, retrying once");
                session.mark_deleted(index).await?;
            }
            Err(e) => return Err(e),
        }
        self.marked.push(index);
        Ok(())
    }

    /// Number of marks placed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.marked.len()
    }

    /// Returns true if nothing was marked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }

    /// Closes the session cleanly, making the marks durable.
    ///
    /// # Errors
    ///
    /// An error leaves the outcome unknown until the count is re-queried.
    pub async fn commit<S: MailSession>(self, session: S) -> StoreResult<usize> {
        let n = self.marked.len();
        session.commit().await?;
        debug!(marked = n, "Batch committed");
        Ok(n)
    }

    /// Drops the session; the server discards every mark.
    pub async fn abort<S: MailSession>(self, session: S) {
        debug!(marked = self.marked.len(), "Batch aborted");
        session.abort().await;
    }
}
