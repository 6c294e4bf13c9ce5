//! End-to-end runs against the in-memory store.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use terabyebye_core::store::synthetic_message;
use terabyebye_core::{
    BackupError, BackupSink, Cutoff, Error, ExclusionFilter, Fault, MboxArchive, MemoryStore,
    MessageHeader, Orchestrator, ProviderProfile, RunConfig, RunMode, RunState, RunSummary,
};

fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// `n` dates spread evenly over `[from, to]`.
fn even_dates(n: u32, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let span = (to - from).num_seconds();
    (0..n)
        .map(|i| from + TimeDelta::seconds(span * i64::from(i) / i64::from(n - 1)))
        .collect()
}

fn older_than(dates: &[DateTime<Utc>], cutoff: DateTime<Utc>) -> u32 {
    u32::try_from(dates.iter().filter(|d| **d < cutoff).count()).unwrap()
}

fn remaining_dates(store: &MemoryStore) -> Vec<DateTime<Utc>> {
    store
        .messages()
        .iter()
        .filter_map(|raw| MessageHeader::parse(raw).date)
        .collect()
}

fn contains_subject(store: &MemoryStore, subject: &str) -> bool {
    let needle = format!("Subject: {subject}\r\n");
    store
        .messages()
        .iter()
        .any(|raw| raw.windows(needle.len()).any(|w| w == needle.as_bytes()))
}

fn before(y: i32, m: u32, d: u32) -> Cutoff {
    Cutoff::Before(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn config(cutoff: Cutoff, mode: RunMode, batch_size: u32) -> RunConfig {
    let mut config = RunConfig::new(cutoff, ProviderProfile::yahoo());
    config.mode = mode;
    config.batch_size = batch_size;
    config
}

async fn run(store: &MemoryStore, config: RunConfig) -> terabyebye_core::Result<RunSummary> {
    let mut orch = Orchestrator::new(store.clone(), config);
    let plan = orch.plan().await?;
    orch.execute::<MboxArchive>(&plan, None).await
}

/// Backup sink kept in memory; can refuse one subject or raise the cancel
/// flag after its first write.
#[derive(Default)]
struct TestSink {
    stored: Vec<u32>,
    refuse_subject: Option<String>,
    cancel_after_first: Option<Arc<AtomicBool>>,
}

impl BackupSink for TestSink {
    async fn store(
        &mut self,
        index: u32,
        raw: &[u8],
        _date: Option<DateTime<Utc>>,
    ) -> Result<(), BackupError> {
        if let Some(subject) = &self.refuse_subject {
            let needle = format!("Subject: {subject}\r\n");
            if raw.windows(needle.len()).any(|w| w == needle.as_bytes()) {
                return Err(BackupError::Rejected {
                    index,
                    reason: "disk full".into(),
                });
            }
        }
        self.stored.push(index);
        if let Some(flag) = &self.cancel_after_first {
            flag.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    fn report(&self) -> Vec<(String, u32)> {
        vec![("memory".into(), u32::try_from(self.stored.len()).unwrap())]
    }
}

#[tokio::test(start_paused = true)]
async fn deletes_exactly_the_older_messages_then_nothing() {
    let dates = even_dates(1000, utc(2009, 1, 1), utc(2024, 1, 1));
    let cutoff = utc(2015, 1, 1);
    let expected = older_than(&dates, cutoff);
    let store = MemoryStore::from_dates(dates);

    let summary = run(&store, config(before(2015, 1, 1), RunMode::Delete, 50))
        .await
        .unwrap();

    assert_eq!(summary.planned, expected);
    assert_eq!(summary.deleted, expected);
    assert_eq!(summary.failed_batches, 0);
    assert_eq!(summary.unverified, 0);
    assert_eq!(store.count(), 1000 - expected as usize);
    assert!(remaining_dates(&store).iter().all(|d| *d >= cutoff));

    let again = run(&store, config(before(2015, 1, 1), RunMode::Delete, 50))
        .await
        .unwrap();
    assert_eq!(again.planned, 0);
    assert_eq!(again.deleted, 0);
    assert_eq!(store.count(), 1000 - expected as usize);
}

#[tokio::test]
async fn planning_uses_logarithmic_fetches() {
    let store = MemoryStore::from_dates(even_dates(1000, utc(2009, 1, 1), utc(2024, 1, 1)));
    let mut orch = Orchestrator::new(store.clone(), config(before(2015, 1, 1), RunMode::Preview, 50));
    let plan = orch.plan().await.unwrap();

    // Two edge fetches plus at most ceil(log2(1000)) search steps.
    assert!(plan.fetches <= 12, "{} fetches", plan.fetches);
    assert_eq!(store.header_fetches(), plan.fetches as usize);
    assert_eq!(plan.mailbox.count, 1000);
    assert!(plan.oldest.is_some() && plan.newest.is_some());
}

#[tokio::test(start_paused = true)]
async fn year_range_leaves_both_sides_alone() {
    let dates = even_dates(1000, utc(2009, 1, 1), utc(2024, 1, 1));
    let start = utc(2010, 1, 1);
    let end = utc(2013, 1, 1);
    let expected = u32::try_from(dates.iter().filter(|d| **d >= start && **d < end).count()).unwrap();
    let store = MemoryStore::from_dates(dates);

    let cutoff = Cutoff::YearRange {
        start: 2010,
        end: 2012,
    };
    let summary = run(&store, config(cutoff, RunMode::Delete, 50)).await.unwrap();

    assert_eq!(summary.deleted, expected);
    assert!(remaining_dates(&store).iter().all(|d| *d < start || *d >= end));
    assert_eq!(store.count(), 1000 - expected as usize);
}

#[tokio::test(start_paused = true)]
async fn disconnect_before_commit_is_retried() {
    let dates = even_dates(200, utc(2010, 1, 1), utc(2020, 1, 1));
    let expected = older_than(&dates, utc(2015, 1, 1));
    let store = MemoryStore::from_dates(dates);

    let mut orch = Orchestrator::new(store.clone(), config(before(2015, 1, 1), RunMode::Delete, 50));
    let plan = orch.plan().await.unwrap();
    store.inject(Fault::DropAfterMarks(10));
    let summary = orch.execute::<MboxArchive>(&plan, None).await.unwrap();

    assert_eq!(summary.failed_batches, 1);
    assert_eq!(summary.deleted, expected);
    assert_eq!(store.count(), 200 - expected as usize);
}

#[tokio::test(start_paused = true)]
async fn lost_quit_reply_is_settled_by_the_count() {
    let dates = even_dates(200, utc(2010, 1, 1), utc(2020, 1, 1));
    let expected = older_than(&dates, utc(2015, 1, 1));
    let store = MemoryStore::from_dates(dates);

    let mut orch = Orchestrator::new(store.clone(), config(before(2015, 1, 1), RunMode::Delete, 50));
    let plan = orch.plan().await.unwrap();
    store.inject(Fault::CommitUnacknowledged);
    let summary = orch.execute::<MboxArchive>(&plan, None).await.unwrap();

    assert_eq!(summary.failed_batches, 0);
    assert_eq!(summary.deleted, expected);
    assert_eq!(summary.unverified, 0);
}

#[tokio::test(start_paused = true)]
async fn repeated_commit_failures_halve_the_batch() {
    let dates = even_dates(200, utc(2010, 1, 1), utc(2020, 1, 1));
    let expected = older_than(&dates, utc(2015, 1, 1));
    let store = MemoryStore::from_dates(dates);

    let mut orch = Orchestrator::new(store.clone(), config(before(2015, 1, 1), RunMode::Delete, 50));
    let plan = orch.plan().await.unwrap();
    for _ in 0..3 {
        store.inject(Fault::CommitDropped);
    }
    let summary = orch.execute::<MboxArchive>(&plan, None).await.unwrap();

    assert_eq!(summary.failed_batches, 3);
    assert_eq!(summary.final_batch_size, 25);
    assert_eq!(summary.deleted, expected);
    assert_eq!(store.count(), 200 - expected as usize);
}

#[tokio::test(start_paused = true)]
async fn failures_at_batch_size_one_end_with_progress() {
    let dates = even_dates(20, utc(2010, 1, 1), utc(2020, 1, 1));
    let expected = older_than(&dates, utc(2015, 1, 1));
    let store = MemoryStore::from_dates(dates);

    let mut orch = Orchestrator::new(store.clone(), config(before(2015, 1, 1), RunMode::Delete, 1));
    let plan = orch.plan().await.unwrap();
    for _ in 0..3 {
        store.inject(Fault::CommitDropped);
    }
    let err = orch.execute::<MboxArchive>(&plan, None).await.unwrap_err();

    let Error::RetriesExhausted { progress } = err else {
        panic!("expected RetriesExhausted, got {err:?}");
    };
    assert_eq!(progress.deleted, 0);
    assert_eq!(progress.remaining, expected);
    assert_eq!(orch.state(), RunState::Error);
    assert_eq!(store.count(), 20);
}

#[tokio::test(start_paused = true)]
async fn relative_cutoff_survives_a_dropped_commit() {
    let dates = even_dates(100, utc(2010, 1, 1), utc(2020, 1, 1));
    let now = utc(2020, 6, 1);
    let expected = older_than(&dates, now - TimeDelta::days(5 * 365));
    let store = MemoryStore::from_dates(dates);

    let mut orch =
        Orchestrator::new(store.clone(), config(Cutoff::OlderThanYears(5), RunMode::Delete, 50))
            .with_clock(now);
    let plan = orch.plan().await.unwrap();
    store.inject(Fault::CommitDropped);
    let summary = orch.execute::<MboxArchive>(&plan, None).await.unwrap();

    assert_eq!(summary.failed_batches, 1);
    assert_eq!(summary.deleted, expected);
}

#[tokio::test(start_paused = true)]
async fn failed_backup_keeps_exactly_that_message() {
    let dates = even_dates(60, utc(2010, 1, 1), utc(2020, 1, 1));
    let expected = older_than(&dates, utc(2015, 1, 1));
    let store = MemoryStore::from_dates(dates);

    let mut sink = TestSink {
        refuse_subject: Some("Message 5".into()),
        ..TestSink::default()
    };
    let mut orch = Orchestrator::new(
        store.clone(),
        config(before(2015, 1, 1), RunMode::BackupAndDelete, 50),
    );
    let plan = orch.plan().await.unwrap();
    let summary = orch.execute(&plan, Some(&mut sink)).await.unwrap();

    assert_eq!(summary.backup_failures, 1);
    assert_eq!(summary.retained, 1);
    assert_eq!(summary.deleted, expected - 1);
    assert_eq!(summary.backed_up, expected - 1);
    assert!(contains_subject(&store, "Message 5"));
    assert!(!contains_subject(&store, "Message 4"));
    assert_eq!(store.count(), 60 - (expected as usize - 1));
}

#[tokio::test(start_paused = true)]
async fn excluded_messages_are_retained() {
    let start = utc(2014, 12, 1);
    let store = MemoryStore::with_messages((0..40).map(|i| {
        let date = start + TimeDelta::days(i);
        let subject = if i % 10 == 0 {
            format!("Your receipt {i}")
        } else {
            format!("Newsletter {i}")
        };
        let from = if i == 7 {
            "Boss <boss@work.example>"
        } else {
            "news@example.com"
        };
        synthetic_message(Some(date), &subject, from)
    }));

    let mut config = config(before(2015, 1, 1), RunMode::Delete, 50);
    config.exclusions = ExclusionFilter::from_lists("receipt", "*@work.example");
    let summary = run(&store, config).await.unwrap();

    // December has 31 messages: 4 receipts and one from the boss stay.
    assert_eq!(summary.excluded, 5);
    assert_eq!(summary.retained, 5);
    assert_eq!(summary.deleted, 26);
    assert_eq!(store.count(), 14);
    assert!(contains_subject(&store, "Your receipt 20"));
    assert!(contains_subject(&store, "Newsletter 7"));
    assert!(!contains_subject(&store, "Newsletter 8"));
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_between_batches() {
    let dates = even_dates(200, utc(2010, 1, 1), utc(2020, 1, 1));
    let store = MemoryStore::from_dates(dates);

    let mut orch = Orchestrator::new(
        store.clone(),
        config(before(2015, 1, 1), RunMode::BackupAndDelete, 50),
    );
    let mut sink = TestSink {
        cancel_after_first: Some(orch.cancel_handle()),
        ..TestSink::default()
    };
    let plan = orch.plan().await.unwrap();
    let summary = orch.execute(&plan, Some(&mut sink)).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.deleted, 50);
    assert_eq!(store.count(), 150);
    assert_eq!(orch.state(), RunState::Done);
}

#[tokio::test(start_paused = true)]
async fn mbox_backup_before_delete() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = MboxArchive::create(dir.path().join("backup")).await.unwrap();
    let dates = even_dates(24, utc(2013, 1, 15), utc(2014, 12, 15));
    let store = MemoryStore::from_dates(dates);

    let mut orch = Orchestrator::new(
        store.clone(),
        config(before(2014, 1, 1), RunMode::BackupAndDelete, 50),
    );
    let plan = orch.plan().await.unwrap();
    let summary = orch.execute(&plan, Some(&mut archive)).await.unwrap();

    assert_eq!(summary.deleted, 12);
    assert_eq!(summary.backed_up, 12);
    assert_eq!(summary.archives.len(), 12);
    assert!(summary.archives.iter().all(|(name, n)| name.starts_with("emails_2013-") && *n == 1));
    assert_eq!(store.count(), 12);
}
