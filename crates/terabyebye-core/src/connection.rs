//! Session lifecycle.
//!
//! The [`ConnectionManager`] owns the store and at most one open session.
//! It authenticates, reconnects with backoff after transient failures and
//! makes sure read-only work never leaves a session half open.

use tracing::{debug, info, warn};

use crate::error::{Error, Result, StoreError};
use crate::orchestrator::Progress;
use crate::retry::RetryPolicy;
use crate::store::{MailSession, MailStore};

/// Owns the store and the current session.
#[derive(Debug)]
pub struct ConnectionManager<St: MailStore> {
    store: St,
    policy: RetryPolicy,
    session: Option<St::Session>,
}

impl<St: MailStore> ConnectionManager<St> {
    /// Creates a manager without connecting.
    pub const fn new(store: St, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            session: None,
        }
    }

    /// The retry policy in force.
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The underlying store.
    pub const fn store(&self) -> &St {
        &self.store
    }

    /// Opens a session, retrying transient failures with exponential
    /// backoff. Authentication failures are returned at once.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] for fatal failures, [`Error::RetriesExhausted`] when
    /// every attempt failed transiently.
    pub async fn reconnect_with_backoff(&mut self) -> Result<&mut St::Session> {
        self.discard().await;

        let mut attempt = 0;
        loop {
            match self.store.open().await {
                Ok(session) => {
                    if attempt > 0 {
                        info!(attempt, "Reconnected");
                    } else {
                        debug!(store = %self.store.describe(), "Session opened");
                    }
                    self.session = Some(session);
                    return self.current();
                }
                Err(e) if e.is_transient() && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(error = %e, attempt = attempt + 1, ?delay, "Connection failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, attempts = attempt + 1, "Giving up on connection");
                    return Err(Error::RetriesExhausted {
                        progress: Progress::default(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Returns the open session, connecting with backoff if there is none.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::reconnect_with_backoff`].
    pub async fn session(&mut self) -> Result<&mut St::Session> {
        if self.session.is_some() {
            self.current()
        } else {
            self.reconnect_with_backoff().await
        }
    }

    fn current(&mut self) -> Result<&mut St::Session> {
        self.session
            .as_mut()
            .ok_or_else(|| StoreError::Transient("no open session".into()).into())
    }

    /// Returns true if a session is open.
    pub const fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Hands the open session to the caller, typically to commit it.
    pub fn take(&mut self) -> Option<St::Session> {
        self.session.take()
    }

    /// Drops the session without committing; pending marks are discarded.
    pub async fn discard(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("Discarding session");
            session.abort().await;
        }
    }

    /// Closes the session without applying any marks: unmark, then quit.
    /// Failures are logged, never assumed successful.
    pub async fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Err(e) = session.reset().await {
            warn!(error = %e, "Reset before close failed, dropping session");
            session.abort().await;
            return;
        }
        match session.commit().await {
            Ok(()) => debug!("Session closed"),
            Err(e) => warn!(error = %e, "Close failed"),
        }
    }

    /// Runs `op` and closes the session on every exit path.
    ///
    /// # Errors
    ///
    /// Returns whatever `op` returns.
    pub async fn scoped<T>(&mut self, op: impl AsyncFnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = op(self).await;
        self.close().await;
        result
    }
}
