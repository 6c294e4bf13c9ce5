//! # terabyebye-core
//!
//! Engine for purging old mail from a POP3 mailbox.
//!
//! This crate provides:
//! - **Connection management** - sessions with reconnect and backoff
//! - **Header fetching** - `Date`, `Subject` and `From` via `TOP n 0`
//! - **Boundary search** - O(log N) binary search for the cutoff index
//! - **Batch deletion** - mark, commit on `QUIT`, verify from the new count
//! - **Backups** - monthly mbox archives written before anything is marked
//! - **Exclusions** - subject keywords and sender patterns never deleted
//!
//! The engine talks to mailboxes through the [`MailStore`] trait; the POP3
//! adapter and an in-memory store with failure injection ship with it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod backup;
pub mod batch;
pub mod boundary;
pub mod config;
pub mod connection;
pub mod cutoff;
mod error;
pub mod filter;
pub mod header;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod store;

pub use backup::{BackupError, BackupSink, MboxArchive};
pub use batch::MarkSet;
pub use boundary::BoundaryResolver;
pub use config::{RunConfig, RunMode, ValidationError};
pub use connection::ConnectionManager;
pub use cutoff::{Cutoff, CutoffWindow};
pub use error::{Error, Result, StoreError, StoreResult};
pub use filter::ExclusionFilter;
pub use header::{MessageHeader, fetch_header};
pub use orchestrator::{DeletionPlan, Orchestrator, Progress, RunState, RunSummary};
pub use provider::{Provider, ProviderProfile};
pub use retry::RetryPolicy;
pub use store::{
    Fault, MailSession, MailStore, MailboxStat, MemoryStore, Pop3Settings, Pop3Store, Security,
};
