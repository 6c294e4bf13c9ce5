//! Batch deletion orchestrator.
//!
//! Drives one run through its states:
//!
//! ```text
//! Idle -> ResolvingRange -> Previewing ------------> Done
//!                        -> BackingUp -------------> Done
//!                        -> Deleting --------------> Done
//! ```
//!
//! `Error` is reachable from every state. Deletion happens in batches, each
//! in its own session: verify the window, mark, commit with `QUIT`, reopen
//! and learn from the new message count what the server actually did.

mod plan;
mod summary;

pub use plan::DeletionPlan;
pub use summary::{Progress, RunSummary};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::backup::{BackupError, BackupSink};
use crate::batch::MarkSet;
use crate::boundary::BoundaryResolver;
use crate::config::{RunConfig, RunMode};
use crate::connection::ConnectionManager;
use crate::cutoff::CutoffWindow;
use crate::error::{Error, Result, StoreError, StoreResult};
use crate::header::{MessageHeader, fetch_header};
use crate::store::{MailSession, MailStore};

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Nothing started.
    #[default]
    Idle,
    /// Searching for the window boundaries.
    ResolvingRange,
    /// Reporting the plan without touching anything.
    Previewing,
    /// Archiving without deleting.
    BackingUp,
    /// Deleting batches.
    Deleting,
    /// Finished normally, possibly cancelled.
    Done,
    /// Stopped by a terminal error.
    Error,
}

impl RunState {
    /// Returns true once the run can make no further progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::ResolvingRange => "resolving range",
            Self::Previewing => "previewing",
            Self::BackingUp => "backing up",
            Self::Deleting => "deleting",
            Self::Done => "done",
            Self::Error => "error",
        })
    }
}

/// How a batch failed.
enum BatchError {
    /// Worth another attempt on a fresh session.
    Retry(StoreError),
    /// Ends the run.
    Fatal(Error),
}

impl From<StoreError> for BatchError {
    fn from(e: StoreError) -> Self {
        if e.is_fatal() {
            Self::Fatal(e.into())
        } else {
            Self::Retry(e)
        }
    }
}

impl From<Error> for BatchError {
    fn from(e: Error) -> Self {
        match e {
            Error::Store(e) => e.into(),
            other => Self::Fatal(other),
        }
    }
}

/// Messages kept in place by one batch. Counted only if the batch commits.
#[derive(Debug, Default)]
struct Tally {
    kept: u32,
    excluded: u32,
    out_of_order: u32,
    backup_failures: u32,
}

impl Tally {
    fn keep_newer(&mut self, index: u32) {
        warn!(index, "Message dated after the cutoff inside the window, keeping it");
        self.kept += 1;
        self.out_of_order += 1;
    }
}

/// The indices one batch session covers and what became of them.
#[derive(Debug)]
struct Batch {
    first: u32,
    last: u32,
    // Known to be newer than the cutoff although inside the window.
    newer: Option<u32>,
    marks: MarkSet,
    tally: Tally,
}

/// Position of a run inside the window.
///
/// Everything below `lo` is outside the window and never touched. Messages
/// kept in place pile up at the front of the window, so the next candidate
/// is always `lo + offset`. `hi` shrinks by what each commit removed.
#[derive(Debug)]
struct Run {
    lo: u32,
    hi: u32,
    offset: u32,
    batch_size: u32,
    failures: u32,
    // Indices already archived in the current numbering.
    archived: HashSet<u32>,
    summary: RunSummary,
}

impl Run {
    fn new(plan: &DeletionPlan, mode: RunMode, batch_size: u32) -> Self {
        Self {
            lo: plan.range.start,
            hi: plan.range.end,
            offset: 0,
            batch_size,
            failures: 0,
            archived: HashSet::new(),
            summary: RunSummary {
                mode,
                planned: plan.len(),
                final_batch_size: batch_size,
                ..RunSummary::default()
            },
        }
    }

    const fn cursor(&self) -> u32 {
        self.lo.saturating_add(self.offset)
    }

    const fn remaining(&self) -> u32 {
        self.hi.saturating_sub(self.cursor())
    }

    const fn progress(&self) -> Progress {
        Progress {
            deleted: self.summary.deleted,
            retained: self.summary.retained,
            remaining: self.remaining(),
            unverified: self.summary.unverified,
        }
    }
}

/// Runs one purge against one mailbox.
///
/// Call [`Orchestrator::plan`] first, show the plan, then hand it to
/// [`Orchestrator::execute`].
pub struct Orchestrator<St: MailStore> {
    conn: ConnectionManager<St>,
    config: RunConfig,
    state: RunState,
    cancel: Arc<AtomicBool>,
    now: Option<DateTime<Utc>>,
}

impl<St: MailStore> fmt::Debug for Orchestrator<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("store", &self.conn.store().describe())
            .field("mode", &self.config.mode)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<St: MailStore> Orchestrator<St> {
    /// Creates an idle orchestrator. Nothing connects until [`plan`](Self::plan).
    pub fn new(store: St, config: RunConfig) -> Self {
        let conn = ConnectionManager::new(store, config.retry.clone());
        Self {
            conn,
            config,
            state: RunState::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
            now: None,
        }
    }

    /// Pins the clock used to resolve relative cutoffs.
    #[must_use]
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Flag that stops the run at the next batch boundary once set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Current state.
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// The configuration this run was built with.
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The underlying store.
    pub const fn store(&self) -> &St {
        self.conn.store()
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "Run state changed");
            self.state = next;
        }
    }

    fn fail(&mut self, e: &Error) {
        warn!(error = %e, "Run failed");
        self.transition(RunState::Error);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Resolves the deletion window in one read-only session.
    ///
    /// # Errors
    ///
    /// Connection, authentication and boundary resolution failures. The
    /// state moves to [`RunState::Error`].
    pub async fn plan(&mut self) -> Result<DeletionPlan> {
        self.transition(RunState::ResolvingRange);

        let cutoff = self.config.cutoff;
        let window = cutoff.window(self.now.unwrap_or_else(Utc::now));
        debug!(?window, %cutoff, "Resolving window");

        let result = self
            .conn
            .scoped(async |conn| {
                let mut resolver = BoundaryResolver::new(conn).await?;
                let hi = resolver.resolve(window.end).await?;
                let lo = match window.start {
                    Some(start) => resolver.resolve(start).await?.min(hi),
                    None => 1,
                };
                let edges = resolver.edge_dates();
                Ok(DeletionPlan {
                    cutoff,
                    window,
                    range: lo..hi,
                    mailbox: resolver.mailbox(),
                    oldest: edges.map(|(first, _)| first),
                    newest: edges.map(|(_, last)| last),
                    fetches: resolver.fetches(),
                })
            })
            .await;

        match result {
            Ok(plan) => {
                info!(
                    lo = plan.range.start,
                    hi = plan.range.end,
                    messages = plan.len(),
                    count = plan.mailbox.count,
                    fetches = plan.fetches,
                    "Deletion window resolved"
                );
                Ok(plan)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Carries out `plan` according to the configured mode.
    ///
    /// The backup modes need a `sink`; the others ignore it.
    ///
    /// # Errors
    ///
    /// Fatal store errors, [`Error::BoundaryResolution`], and
    /// [`Error::RetriesExhausted`] carrying exact progress. The state moves
    /// to [`RunState::Error`].
    pub async fn execute<B: BackupSink>(
        &mut self,
        plan: &DeletionPlan,
        mut sink: Option<&mut B>,
    ) -> Result<RunSummary> {
        let mode = self.config.mode;
        if mode.backs_up() && sink.is_none() {
            let e = Error::Config(format!("{} mode needs a backup archive", mode.name()));
            self.fail(&e);
            return Err(e);
        }

        let started = Instant::now();
        let mut run = Run::new(plan, mode, self.config.effective_batch_size());

        let outcome = match mode {
            RunMode::Preview => {
                self.transition(RunState::Previewing);
                info!(messages = plan.len(), "Preview only, nothing changed");
                Ok(())
            }
            RunMode::BackupOnly => {
                self.transition(RunState::BackingUp);
                match sink.as_deref_mut() {
                    Some(sink) => self.backup_range(&mut run, sink).await,
                    None => Ok(()),
                }
            }
            RunMode::Delete | RunMode::BackupAndDelete => {
                self.transition(RunState::Deleting);
                self.delete_range(&mut run, plan.window, sink.as_deref_mut())
                    .await
            }
        };
        self.conn.close().await;

        run.summary.final_batch_size = run.batch_size;
        run.summary.elapsed = started.elapsed();
        if let Some(sink) = sink.as_deref() {
            run.summary.archives = sink.report();
        }

        match outcome {
            Ok(()) => {
                let unprocessed = run.summary.unprocessed();
                if unprocessed > 0 && mode.deletes() {
                    warn!(
                        unprocessed,
                        cancelled = run.summary.cancelled,
                        "Planned messages neither deleted nor retained"
                    );
                }
                self.transition(RunState::Done);
                info!(
                    deleted = run.summary.deleted,
                    retained = run.summary.retained,
                    backed_up = run.summary.backed_up,
                    cancelled = run.summary.cancelled,
                    "Run finished"
                );
                Ok(run.summary)
            }
            Err(e) => {
                let e = match e {
                    Error::RetriesExhausted { .. } => Error::RetriesExhausted {
                        progress: run.progress(),
                    },
                    other => other,
                };
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn delete_range<B: BackupSink>(
        &mut self,
        run: &mut Run,
        window: CutoffWindow,
        mut sink: Option<&mut B>,
    ) -> Result<()> {
        // Count observed after the last commit, valid while that session lives.
        let mut count = None;
        let mut renumbered = 0;

        while run.cursor() < run.hi {
            if self.cancelled() {
                info!(progress = %run.progress(), "Cancelled between batches");
                run.summary.cancelled = true;
                return Ok(());
            }

            run.summary.batches += 1;
            match self
                .delete_batch(run, window, sink.as_deref_mut(), &mut count)
                .await
            {
                Ok(()) => {
                    run.failures = 0;
                    renumbered = 0;
                }
                Err(BatchError::Fatal(e)) => return Err(e),
                Err(BatchError::Retry(StoreError::IndexOutOfRange { index, count: n }))
                    if renumbered < self.config.retry.search_restarts =>
                {
                    renumbered += 1;
                    count = None;
                    warn!(index, count = n, "Mailbox renumbered under the run");
                    self.conn.discard().await;
                    self.reresolve_window(run, window).await?;
                }
                Err(BatchError::Retry(e)) => {
                    count = None;
                    self.after_failure(run, &e).await?;
                    if self.config.cutoff.is_relative() {
                        self.reresolve_upper(run, window).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete_batch<B: BackupSink>(
        &mut self,
        run: &mut Run,
        window: CutoffWindow,
        sink: Option<&mut B>,
        count: &mut Option<u32>,
    ) -> std::result::Result<(), BatchError> {
        let known = match *count {
            Some(n) if self.conn.is_open() => n,
            _ => self.conn.session().await?.stat().await?.count,
        };
        if run.hi > known + 1 {
            warn!(hi = run.hi, count = known, "Mailbox shrank below the window end");
            run.hi = known + 1;
        }

        let cursor = run.cursor();
        if cursor >= run.hi {
            return Ok(());
        }
        let mut batch = Batch {
            first: cursor,
            last: cursor.saturating_add(run.batch_size - 1).min(run.hi - 1),
            newer: None,
            marks: MarkSet::new(),
            tally: Tally::default(),
        };

        // The last message of the batch must still be older than the cutoff.
        // If it is not but the window end still is, only that message is out
        // of order; otherwise the window end moved.
        let n_before = {
            let mut resolver = BoundaryResolver::with_count(&mut self.conn, known);
            if resolver.date_at(batch.last).await? >= window.end {
                let edge = run.hi - 1;
                if batch.last < edge && resolver.date_at(edge).await? < window.end {
                    batch.newer = Some(batch.last);
                } else {
                    let hi = resolver
                        .resolve_in(window.end, cursor, batch.last)
                        .await?
                        .clamp(cursor, run.hi);
                    info!(old = run.hi, new = hi, "Window end moved, boundary re-resolved");
                    run.hi = hi;
                    batch.last = hi.saturating_sub(1);
                }
            }
            resolver.count()
        };
        if cursor >= run.hi {
            return Ok(());
        }

        let session = self.conn.session().await?;
        let filled = fill_batch(session, &self.config, window.end, &mut batch, run, sink).await;
        let Batch { marks, tally, .. } = batch;
        if let Err(e) = filled {
            if let Some(session) = self.conn.take() {
                marks.abort(session).await;
            }
            return Err(e);
        }

        let marked = u32::try_from(marks.len()).unwrap_or(u32::MAX);
        let Some(session) = self.conn.take() else {
            return Err(BatchError::Retry(StoreError::Transient(
                "session lost before commit".into(),
            )));
        };
        let committed = marks.commit(session).await;
        if let Err(e) = &committed {
            warn!(error = %e, marked, "Commit not acknowledged, checking the count");
        }

        sleep(self.config.profile.inter_batch_pause).await;
        let n_after = match BoundaryResolver::new(&mut self.conn).await {
            Ok(resolver) => resolver.count(),
            Err(e) => {
                // The commit outcome is unknown.
                run.summary.unverified += marked;
                return Err(BatchError::Fatal(match e {
                    Error::Store(se) if !se.is_fatal() => Error::RetriesExhausted {
                        progress: run.progress(),
                    },
                    other => other,
                }));
            }
        };
        *count = Some(n_after);

        let dropped = n_before.saturating_sub(n_after);
        // Nothing vanished: the commit did not happen.
        match committed {
            Err(e) if dropped == 0 && marked > 0 => return Err(e.into()),
            _ => {}
        }
        if dropped > marked {
            warn!(dropped, marked, "Count fell by more than was marked");
        }
        let observed = dropped.min(marked);
        if observed < marked {
            warn!(
                missing = marked - observed,
                "Count does not confirm every mark"
            );
            run.summary.unverified += marked - observed;
        }

        run.offset += tally.kept;
        run.hi = run.hi.saturating_sub(observed).max(run.cursor());
        run.archived.clear();
        run.summary.deleted += observed;
        run.summary.retained += tally.kept;
        run.summary.excluded += tally.excluded;
        run.summary.out_of_order += tally.out_of_order;
        run.summary.backup_failures += tally.backup_failures;

        info!(
            batch = run.summary.batches,
            deleted = run.summary.deleted,
            retained = run.summary.retained,
            remaining = run.remaining(),
            "Batch committed"
        );
        Ok(())
    }

    async fn backup_range<B: BackupSink>(&mut self, run: &mut Run, sink: &mut B) -> Result<()> {
        while run.cursor() < run.hi {
            if self.cancelled() {
                info!(progress = %run.progress(), "Cancelled between batches");
                run.summary.cancelled = true;
                return Ok(());
            }

            run.summary.batches += 1;
            match self.backup_batch(run, sink).await {
                Ok(()) => run.failures = 0,
                Err(BatchError::Fatal(e)) => return Err(e),
                Err(BatchError::Retry(e)) => self.after_failure(run, &e).await?,
            }
        }
        Ok(())
    }

    async fn backup_batch<B: BackupSink>(
        &mut self,
        run: &mut Run,
        sink: &mut B,
    ) -> std::result::Result<(), BatchError> {
        let session = self.conn.session().await?;
        let count = session.stat().await?.count;
        run.hi = run.hi.min(count + 1);

        let cursor = run.cursor();
        if cursor >= run.hi {
            return Ok(());
        }
        let last = cursor.saturating_add(run.batch_size - 1).min(run.hi - 1);

        for index in cursor..=last {
            match session.retrieve(index).await {
                Ok(raw) => {
                    let date = MessageHeader::parse(&raw).date;
                    match sink.store(index, &raw, date).await {
                        Ok(()) => run.summary.backed_up += 1,
                        Err(e) => {
                            warn!(index, error = %e, "Backup failed");
                            run.summary.backup_failures += 1;
                        }
                    }
                }
                Err(StoreError::Protocol(msg)) => {
                    warn!(index, error = %msg, "RETR failed, skipping message");
                    run.summary.backup_failures += 1;
                }
                Err(e) => return Err(e.into()),
            }
            run.offset += 1;
        }

        info!(
            backed_up = run.summary.backed_up,
            remaining = run.remaining(),
            "Backup batch done"
        );
        Ok(())
    }

    /// Books a failed batch: backs off, and halves the batch size every
    /// `failures_before_shrink` consecutive failures.
    async fn after_failure(&mut self, run: &mut Run, error: &StoreError) -> Result<()> {
        self.conn.discard().await;
        run.summary.failed_batches += 1;
        run.failures += 1;
        warn!(
            error = %error,
            failures = run.failures,
            batch_size = run.batch_size,
            "Batch failed"
        );

        let shrink_every = self.config.retry.failures_before_shrink.max(1);
        if run.failures.is_multiple_of(shrink_every) {
            if run.batch_size == 1 {
                return Err(Error::RetriesExhausted {
                    progress: run.progress(),
                });
            }
            run.batch_size = (run.batch_size / 2).max(1);
            warn!(batch_size = run.batch_size, "Shrinking batch size");
        }

        let delay = self.config.retry.commit_backoff(run.failures);
        debug!(?delay, "Backing off after failed batch");
        sleep(delay).await;
        Ok(())
    }

    /// Finds both window ends again after the mailbox was renumbered by
    /// someone else. Messages already kept stay at the front of the window.
    async fn reresolve_window(&mut self, run: &mut Run, window: CutoffWindow) -> Result<()> {
        let mut resolver = BoundaryResolver::new(&mut self.conn).await?;
        let hi = resolver.resolve(window.end).await?;
        let lo = match window.start {
            Some(start) => resolver.resolve(start).await?.min(hi),
            None => 1,
        };
        info!(
            old_lo = run.lo,
            old_hi = run.hi,
            lo,
            hi,
            count = resolver.count(),
            "Window re-resolved on the new numbering"
        );
        run.lo = lo;
        run.hi = hi.max(run.cursor());
        Ok(())
    }

    /// Relative cutoffs re-check the window end after a failure, on the
    /// fresh numbering.
    async fn reresolve_upper(&mut self, run: &mut Run, window: CutoffWindow) -> Result<()> {
        let mut resolver = BoundaryResolver::new(&mut self.conn).await?;
        let top = resolver.count() + 1;
        let hi = resolver
            .resolve_in(window.end, run.cursor().min(top), top)
            .await?;
        if hi != run.hi {
            info!(old = run.hi, new = hi, "Window end re-resolved");
        }
        run.hi = hi.max(run.cursor());
        Ok(())
    }
}

/// Walks one batch on an open session: filter, back up, then mark.
///
/// Messages kept in place are tallied; everything else ends up in the
/// batch's mark set.
async fn fill_batch<S: MailSession, B: BackupSink>(
    session: &mut S,
    config: &RunConfig,
    cutoff: DateTime<Utc>,
    batch: &mut Batch,
    run: &mut Run,
    mut sink: Option<&mut B>,
) -> std::result::Result<(), BatchError> {
    let filtering = !config.exclusions.is_empty();
    let backs_up = config.mode.backs_up();
    let tally = &mut batch.tally;

    for index in batch.first..=batch.last {
        if batch.newer == Some(index) {
            tally.keep_newer(index);
            continue;
        }

        if filtering {
            match header_with_retry(session, index).await {
                Ok(header) => {
                    if header.date.is_some_and(|d| d >= cutoff) {
                        tally.keep_newer(index);
                        continue;
                    }
                    if let Some(reason) = config.exclusions.excludes(&header) {
                        debug!(index, %reason, "Excluded");
                        tally.excluded += 1;
                        tally.kept += 1;
                        continue;
                    }
                }
                Err(StoreError::Protocol(msg)) => {
                    warn!(index, error = %msg, "Headers unreadable, keeping message");
                    tally.kept += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if backs_up && !run.archived.contains(&index) {
            let Some(sink) = sink.as_deref_mut() else {
                return Err(BatchError::Fatal(Error::Config(
                    "backup requested without an archive".into(),
                )));
            };
            let stored = match session.retrieve(index).await {
                Ok(raw) => {
                    let date = MessageHeader::parse(&raw).date;
                    if date.is_some_and(|d| d >= cutoff) {
                        tally.keep_newer(index);
                        continue;
                    }
                    sink.store(index, &raw, date).await
                }
                Err(StoreError::Protocol(reason)) => Err(BackupError::Rejected { index, reason }),
                Err(e) => return Err(e.into()),
            };
            if let Err(e) = stored {
                warn!(index, error = %e, "Backup failed, keeping message");
                tally.backup_failures += 1;
                tally.kept += 1;
                continue;
            }
            run.archived.insert(index);
            run.summary.backed_up += 1;
        }

        match batch.marks.mark(session, index).await {
            Ok(()) => {}
            Err(StoreError::Protocol(msg)) => {
                warn!(index, error = %msg, "Could not mark, keeping message");
                tally.kept += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

async fn header_with_retry<S: MailSession>(session: &mut S, index: u32) -> StoreResult<MessageHeader> {
    match fetch_header(session, index).await {
        Err(StoreError::Protocol(msg)) => {
            debug!(index, error = %msg, "TOP failed, retrying once");
            fetch_header(session, index).await
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Datelike, NaiveDate, TimeDelta, TimeZone};

    use super::*;
    use crate::backup::MboxArchive;
    use crate::cutoff::Cutoff;
    use crate::provider::ProviderProfile;
    use crate::store::MemoryStore;

    fn yearly(from: i32, to: i32) -> MemoryStore {
        MemoryStore::from_dates(
            (from..=to).map(|y| Utc.with_ymd_and_hms(y, 6, 1, 12, 0, 0).unwrap()),
        )
    }

    fn daily(n: i64) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2010, 1, 1, 12, 0, 0).unwrap();
        (0..n).map(|i| start + TimeDelta::days(i)).collect()
    }

    fn config(cutoff: Cutoff, mode: RunMode) -> RunConfig {
        let mut config = RunConfig::new(cutoff, ProviderProfile::yahoo());
        config.mode = mode;
        config
    }

    fn before(year: i32) -> Cutoff {
        Cutoff::Before(NaiveDate::from_ymd_opt(year, 1, 1).unwrap())
    }

    #[tokio::test]
    async fn plan_reports_window_and_overview() {
        let store = yearly(2005, 2014);
        let mut orch = Orchestrator::new(store, config(before(2010), RunMode::Preview));
        let plan = orch.plan().await.unwrap();

        assert_eq!(plan.range, 1..6);
        assert_eq!(plan.mailbox.count, 10);
        assert_eq!(plan.oldest.unwrap().year(), 2005);
        assert_eq!(plan.newest.unwrap().year(), 2014);
        assert_eq!(orch.state(), RunState::ResolvingRange);
    }

    #[tokio::test]
    async fn year_range_plan() {
        let store = yearly(2005, 2014);
        let cutoff = Cutoff::YearRange {
            start: 2007,
            end: 2009,
        };
        let mut orch = Orchestrator::new(store, config(cutoff, RunMode::Preview));
        let plan = orch.plan().await.unwrap();
        assert_eq!(plan.range, 3..6);
    }

    #[tokio::test]
    async fn relative_cutoff_uses_pinned_clock() {
        let store = yearly(2005, 2014);
        let now = Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap();
        let mut orch =
            Orchestrator::new(store, config(Cutoff::OlderThanYears(3), RunMode::Preview))
                .with_clock(now);
        let plan = orch.plan().await.unwrap();
        // now - 3*365 days lands in early January 2012.
        assert_eq!(plan.range, 1..8);
    }

    #[tokio::test]
    async fn preview_never_mutates() {
        let store = yearly(2005, 2014);
        let mut orch = Orchestrator::new(store.clone(), config(before(2010), RunMode::Preview));
        let plan = orch.plan().await.unwrap();
        let summary = orch.execute::<MboxArchive>(&plan, None).await.unwrap();

        assert_eq!(summary.deleted, 0);
        assert_eq!(summary.planned, 5);
        assert_eq!(store.count(), 10);
        assert_eq!(orch.state(), RunState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_removes_window() {
        let store = yearly(2005, 2014);
        let mut orch = Orchestrator::new(store.clone(), config(before(2010), RunMode::Delete));
        let plan = orch.plan().await.unwrap();
        let summary = orch.execute::<MboxArchive>(&plan, None).await.unwrap();

        assert_eq!(summary.deleted, 5);
        assert_eq!(summary.failed_batches, 0);
        assert_eq!(store.count(), 5);
        assert_eq!(orch.state(), RunState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_message_inside_window_is_kept() {
        let mut dates = daily(200);
        dates[99] = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
        let store = MemoryStore::from_dates(dates);
        let mut orch = Orchestrator::new(store.clone(), config(before(2015), RunMode::Delete));
        let plan = orch.plan().await.unwrap();
        assert_eq!(plan.len(), 200);

        let summary = orch.execute::<MboxArchive>(&plan, None).await.unwrap();
        assert_eq!(summary.deleted, 199);
        assert_eq!(summary.retained, 1);
        assert_eq!(summary.out_of_order, 1);
        assert_eq!(summary.unprocessed(), 0);
        assert_eq!(summary.batches, 4);

        let left = store.messages();
        assert_eq!(left.len(), 1);
        assert!(String::from_utf8_lossy(&left[0]).contains("Subject: Message 100\r\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn renumbered_mailbox_is_searched_again() {
        let store = MemoryStore::from_dates(daily(40));
        let cutoff = Cutoff::Before(NaiveDate::from_ymd_opt(2010, 2, 8).unwrap());
        let mut orch = Orchestrator::new(store.clone(), config(cutoff, RunMode::Delete));
        let plan = orch.plan().await.unwrap();
        assert_eq!(plan.range, 1..39);

        // Another client removes five of the planned messages mid-run.
        store.inject(crate::store::Fault::VanishBeforeHeader(5));
        let summary = orch.execute::<MboxArchive>(&plan, None).await.unwrap();

        assert_eq!(summary.deleted, 33);
        assert_eq!(summary.failed_batches, 0);
        assert_eq!(summary.final_batch_size, 50);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.unprocessed(), 5);
        assert_eq!(store.count(), 2);
        assert_eq!(orch.state(), RunState::Done);
    }

    #[tokio::test]
    async fn backup_mode_requires_sink() {
        let store = yearly(2005, 2014);
        let mut orch = Orchestrator::new(store, config(before(2010), RunMode::BackupOnly));
        let plan = orch.plan().await.unwrap();
        let err = orch.execute::<MboxArchive>(&plan, None).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(orch.state(), RunState::Error);
    }

    #[tokio::test]
    async fn auth_failure_ends_in_error_state() {
        let store = yearly(2005, 2014);
        store.inject(crate::store::Fault::OpenAuth);
        let mut orch = Orchestrator::new(store, config(before(2010), RunMode::Preview));
        assert!(orch.plan().await.is_err());
        assert!(orch.state().is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn backup_only_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = MboxArchive::create(dir.path()).await.unwrap();
        let store = yearly(2005, 2014);
        let mut orch = Orchestrator::new(store.clone(), config(before(2008), RunMode::BackupOnly));
        let plan = orch.plan().await.unwrap();
        let summary = orch.execute(&plan, Some(&mut archive)).await.unwrap();

        assert_eq!(summary.backed_up, 3);
        assert_eq!(summary.deleted, 0);
        assert_eq!(store.count(), 10);
        assert_eq!(summary.archives.len(), 3);
        assert_eq!(summary.archives[0], ("emails_2005-06.mbox".to_string(), 1));
    }

    #[test]
    fn run_tracks_cursor_and_progress() {
        let cutoff = before(2010);
        let plan = DeletionPlan {
            cutoff,
            window: cutoff.window(Utc::now()),
            range: 3..13,
            mailbox: crate::store::MailboxStat::default(),
            oldest: None,
            newest: None,
            fetches: 0,
        };
        let mut run = Run::new(&plan, RunMode::Delete, 4);
        assert_eq!(run.cursor(), 3);
        assert_eq!(run.remaining(), 10);

        run.offset = 2;
        run.hi = 9;
        run.summary.deleted = 4;
        run.summary.retained = 2;
        assert_eq!(
            run.progress(),
            Progress {
                deleted: 4,
                retained: 2,
                remaining: 4,
                unverified: 0,
            }
        );
    }
}
