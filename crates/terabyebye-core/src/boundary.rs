//! Boundary search.
//!
//! Messages are numbered in arrival order, which is assumed to match
//! `Date:` order. For a cutoff `D` the boundary `b` is the smallest index
//! whose date is not older than `D`:
//!
//! ```text
//! date(b - 1) < D <= date(b)
//! ```
//!
//! Indices below `b` are older; a message dated exactly `D` is on the kept
//! side. Finding `b` is a binary search costing O(log N) header fetches.
//! If the dates are not monotonic the boundary is best effort.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::error::{Error, Result, StoreError};
use crate::header::fetch_header;
use crate::store::{MailSession, MailStore, MailboxStat};

/// Offsets tried, in order, when a message looked at has no usable date.
const NEIGHBOR_OFFSETS: [i32; 6] = [1, -1, 2, -2, 5, -5];

/// Why a search step could not complete.
enum Interrupt {
    /// The index space changed; start over with a fresh count.
    Restart(String),
    /// Give up.
    Fail(Error),
}

impl From<Error> for Interrupt {
    fn from(e: Error) -> Self {
        Self::Fail(e)
    }
}

/// Binary search over the message index space.
///
/// Borrows the connection manager for the duration of the search so header fetches
/// reuse the open session.
pub struct BoundaryResolver<'a, St: MailStore> {
    conn: &'a mut ConnectionManager<St>,
    count: u32,
    size: u64,
    // Dates seen in the current index space.
    dates: HashMap<u32, Option<DateTime<Utc>>>,
    edges: Option<(DateTime<Utc>, DateTime<Utc>)>,
    fetches: u32,
}

impl<St: MailStore> std::fmt::Debug for BoundaryResolver<'_, St> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryResolver")
            .field("count", &self.count)
            .field("fetches", &self.fetches)
            .finish_non_exhaustive()
    }
}

impl<'a, St: MailStore> BoundaryResolver<'a, St> {
    /// Creates a resolver and queries the current message count.
    ///
    /// # Errors
    ///
    /// Returns an error if no session can be opened or `STAT` keeps failing.
    pub async fn new(conn: &'a mut ConnectionManager<St>) -> Result<Self> {
        let mut resolver = Self::with_count(conn, 0);
        resolver.refresh_count().await?;
        Ok(resolver)
    }

    /// Creates a resolver trusting an already known count.
    pub fn with_count(conn: &'a mut ConnectionManager<St>, count: u32) -> Self {
        Self {
            conn,
            count,
            size: 0,
            dates: HashMap::new(),
            edges: None,
            fetches: 0,
        }
    }

    /// Message count of the current index space.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Count and size from the latest `STAT`.
    #[must_use]
    pub const fn mailbox(&self) -> MailboxStat {
        MailboxStat {
            count: self.count,
            size: self.size,
        }
    }

    /// Header fetches issued so far.
    #[must_use]
    pub const fn fetches(&self) -> u32 {
        self.fetches
    }

    /// Dates of the first and last message, once a full search saw them.
    #[must_use]
    pub const fn edge_dates(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.edges
    }

    /// Re-queries the message count and forgets every cached date.
    ///
    /// # Errors
    ///
    /// Returns an error if `STAT` fails on every attempt.
    pub async fn refresh_count(&mut self) -> Result<u32> {
        let attempts = self.conn.policy().fetch_retries + 1;
        let mut last = None;

        for _ in 0..attempts {
            let session = self.conn.session().await?;
            match session.stat().await {
                Ok(stat) => {
                    self.count = stat.count;
                    self.size = stat.size;
                    self.dates.clear();
                    return Ok(stat.count);
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, "STAT failed");
                    if e.is_transient() {
                        self.conn.discard().await;
                    }
                    last = Some(e);
                }
            }
        }

        Err(last
            .unwrap_or_else(|| StoreError::Transient("STAT failed".into()))
            .into())
    }

    /// Finds the boundary for `cutoff` over the whole mailbox.
    ///
    /// Returns `1` for an empty mailbox or when nothing is older, `N + 1`
    /// when everything is.
    ///
    /// # Errors
    ///
    /// [`Error::BoundaryResolution`] if a message and all of its neighbours
    /// lack a usable date, or the mailbox keeps changing.
    pub async fn resolve(&mut self, cutoff: DateTime<Utc>) -> Result<u32> {
        let mut restarts = 0;
        loop {
            match self.search_all(cutoff).await {
                Ok(b) => return Ok(b),
                Err(Interrupt::Fail(e)) => return Err(e),
                Err(Interrupt::Restart(reason)) => {
                    restarts += 1;
                    if restarts > self.conn.policy().search_restarts {
                        return Err(Error::BoundaryResolution(format!(
                            "mailbox kept changing during the search: {reason}"
                        )));
                    }
                    warn!(%reason, restarts, "Restarting boundary search");
                    self.refresh_count().await?;
                }
            }
        }
    }

    /// Finds the boundary inside `[lo, hi]`, given that every index below
    /// `lo` is older than `cutoff` and `hi` (if it exists) is not.
    ///
    /// Falls back to a full search if the mailbox changes underneath.
    ///
    /// # Errors
    ///
    /// Same as [`BoundaryResolver::resolve`].
    pub async fn resolve_in(&mut self, cutoff: DateTime<Utc>, lo: u32, hi: u32) -> Result<u32> {
        match self.search(cutoff, lo, hi).await {
            Ok(b) => Ok(b),
            Err(Interrupt::Fail(e)) => Err(e),
            Err(Interrupt::Restart(reason)) => {
                warn!(%reason, "Bounded search interrupted, searching whole mailbox");
                self.refresh_count().await?;
                self.resolve(cutoff).await
            }
        }
    }

    /// Date of the message at `index`, standing in a neighbour's date when
    /// the message itself has none.
    ///
    /// # Errors
    ///
    /// [`Error::BoundaryResolution`] if no nearby message has a date.
    pub async fn date_at(&mut self, index: u32) -> Result<DateTime<Utc>> {
        match self.dated(index).await {
            Ok(date) => Ok(date),
            Err(Interrupt::Fail(e)) => Err(e),
            Err(Interrupt::Restart(reason)) => {
                debug!(%reason, "Date lookup interrupted");
                Err(StoreError::IndexOutOfRange {
                    index,
                    count: self.count,
                }
                .into())
            }
        }
    }

    async fn search_all(&mut self, cutoff: DateTime<Utc>) -> std::result::Result<u32, Interrupt> {
        let n = self.count;
        if n == 0 {
            return Ok(1);
        }

        let first = self.dated(1).await?;
        let last = self.dated(n).await?;
        self.edges = Some((first, last));

        if first >= cutoff {
            return Ok(1);
        }
        if last < cutoff {
            return Ok(n + 1);
        }
        self.search(cutoff, 2, n).await
    }

    async fn search(
        &mut self,
        cutoff: DateTime<Utc>,
        lo: u32,
        hi: u32,
    ) -> std::result::Result<u32, Interrupt> {
        let mut lo = lo.max(1);
        let mut hi = hi.min(self.count + 1);

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.dated(mid).await? < cutoff {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        debug!(boundary = lo, fetches = self.fetches, "Boundary resolved");
        Ok(lo)
    }

    async fn dated(&mut self, index: u32) -> std::result::Result<DateTime<Utc>, Interrupt> {
        if let Some(date) = self.fetch_date(index).await? {
            return Ok(date);
        }

        for offset in NEIGHBOR_OFFSETS {
            let Some(neighbor) = index
                .checked_add_signed(offset)
                .filter(|j| (1..=self.count).contains(j))
            else {
                continue;
            };
            if let Some(date) = self.fetch_date(neighbor).await? {
                debug!(index, neighbor, "Using neighbour date for undated message");
                return Ok(date);
            }
        }

        Err(Interrupt::Fail(Error::BoundaryResolution(format!(
            "message {index} and its neighbours have no usable Date header"
        ))))
    }

    async fn fetch_date(
        &mut self,
        index: u32,
    ) -> std::result::Result<Option<DateTime<Utc>>, Interrupt> {
        if let Some(date) = self.dates.get(&index) {
            return Ok(*date);
        }

        let attempts = self.conn.policy().fetch_retries + 1;
        let mut last = None;

        for attempt in 1..=attempts {
            if !self.conn.is_open() {
                self.reopen().await?;
            }
            let session = self.conn.session().await?;
            self.fetches += 1;

            match fetch_header(session, index).await {
                Ok(header) => {
                    self.dates.insert(index, header.date);
                    return Ok(header.date);
                }
                Err(StoreError::IndexOutOfRange { index, count }) => {
                    return Err(Interrupt::Restart(format!(
                        "message {index} gone (mailbox holds {count})"
                    )));
                }
                Err(e) if e.is_fatal() => return Err(Interrupt::Fail(e.into())),
                Err(e) => {
                    warn!(index, attempt, error = %e, "Header fetch failed");
                    if e.is_transient() {
                        self.conn.discard().await;
                    }
                    last = Some(e);
                }
            }
        }

        Err(Interrupt::Fail(Error::BoundaryResolution(format!(
            "message {index} unreadable after {attempts} attempts: {}",
            last.map(|e| e.to_string()).unwrap_or_default()
        ))))
    }

    /// Reconnects and re-queries the count. Arrivals only append, so a
    /// larger count keeps the index space; a smaller one does not.
    async fn reopen(&mut self) -> std::result::Result<(), Interrupt> {
        let session = self.conn.reconnect_with_backoff().await?;
        match session.stat().await {
            Ok(stat) if stat.count < self.count => Err(Interrupt::Restart(format!(
                "mailbox shrank from {} to {}",
                self.count, stat.count
            ))),
            Ok(stat) => {
                self.count = stat.count;
                self.size = stat.size;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(Interrupt::Fail(e.into())),
            Err(e) => {
                self.conn.discard().await;
                Err(Interrupt::Restart(format!("STAT after reconnect failed: {e}")))
            }
        }
    }
}
