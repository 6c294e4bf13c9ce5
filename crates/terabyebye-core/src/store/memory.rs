//! In-memory mail store with failure injection.
//!
//! Behaves like a POP3 maildrop: one session at a time, indices fixed for
//! the lifetime of a session, marks applied only on a clean commit.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::{MailSession, MailStore, MailboxStat};
use crate::error::{StoreError, StoreResult};

/// A failure to inject into the next matching operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Next `open` fails with a transient error.
    OpenTransient,
    /// Next `open` fails with an authentication error.
    OpenAuth,
    /// Next header fetch fails and the connection drops.
    HeaderTransient,
    /// Next header fetch gets a malformed reply; the session stays usable.
    HeaderProtocol,
    /// Just before the next header fetch another client removes the oldest
    /// `n` messages and the server renumbers the open session.
    VanishBeforeHeader(usize),
    /// Next mark gets a malformed reply; the session stays usable.
    MarkProtocol,
    /// The connection drops after this many further successful marks.
    DropAfterMarks(usize),
    /// Next commit drops the connection before the server applies anything.
    CommitDropped,
    /// Next commit is applied but the reply is lost.
    CommitUnacknowledged,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: u64,
    raw: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<StoredMessage>,
    next_id: u64,
    faults: Vec<Fault>,
    locked: bool,
    opens: usize,
    commits: usize,
    header_fetches: usize,
}

impl Inner {
    fn take_fault(&mut self, pred: impl Fn(&Fault) -> bool) -> Option<Fault> {
        let pos = self.faults.iter().position(pred)?;
        Some(self.faults.remove(pos))
    }
}

/// Mail store that keeps every message in memory.
///
/// Clones share the same mailbox, so a test can keep a handle while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Creates an empty mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mailbox holding the given raw messages, oldest first.
    #[must_use]
    pub fn with_messages(messages: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let store = Self::new();
        for raw in messages {
            store.deliver(raw);
        }
        store
    }

    /// Creates a mailbox with one synthetic message per date.
    #[must_use]
    pub fn from_dates(dates: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        Self::with_messages(dates.into_iter().enumerate().map(|(i, date)| {
            synthetic_message(Some(date), &format!("Message {}", i + 1), "sender@example.com")
        }))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a newly arrived message at the end of the mailbox.
    pub fn deliver(&self, raw: Vec<u8>) {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.messages.push(StoredMessage { id, raw });
    }

    /// Queues a failure for the next matching operation.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    /// Current number of messages.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lock().messages.len()
    }

    /// Raw messages currently in the mailbox, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.lock().messages.iter().map(|m| m.raw.clone()).collect()
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    /// Number of commits applied so far.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    /// Number of header fetches served so far.
    #[must_use]
    pub fn header_fetches(&self) -> usize {
        self.lock().header_fetches
    }
}

impl MailStore for MemoryStore {
    type Session = MemorySession;

    async fn open(&self) -> StoreResult<MemorySession> {
        let mut inner = self.lock();
        if inner.locked {
            return Err(StoreError::Transient("[IN-USE] maildrop locked".into()));
        }
        match inner.take_fault(|f| matches!(f, Fault::OpenTransient | Fault::OpenAuth)) {
            Some(Fault::OpenAuth) => return Err(StoreError::Auth("invalid credentials".into())),
            Some(_) => return Err(StoreError::Transient("connection refused".into())),
            None => {}
        }

        inner.locked = true;
        inner.opens += 1;
        let view = inner.messages.iter().map(|m| m.id).collect();
        drop(inner);

        Ok(MemorySession {
            inner: Arc::clone(&self.inner),
            view,
            marked: BTreeSet::new(),
            marks_until_drop: None,
            dropped: false,
        })
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

/// Session on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySession {
    inner: Arc<Mutex<Inner>>,
    // Message ids visible to this session, by index - 1.
    view: Vec<u64>,
    marked: BTreeSet<u32>,
    marks_until_drop: Option<usize>,
    dropped: bool,
}

impl MemorySession {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_alive(&self) -> StoreResult<()> {
        if self.dropped {
            Err(StoreError::Transient("connection reset".into()))
        } else {
            Ok(())
        }
    }

    fn drop_connection(&mut self) -> StoreError {
        self.dropped = true;
        self.marked.clear();
        StoreError::Transient("connection reset".into())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn check_index(&self, index: u32) -> StoreResult<()> {
        let count = self.visible_count();
        if index == 0 || index as usize > self.view.len() {
            return Err(StoreError::IndexOutOfRange { index, count });
        }
        if self.marked.contains(&index) {
            return Err(StoreError::Protocol(format!("message {index} already deleted")));
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn visible_count(&self) -> u32 {
        (self.view.len() - self.marked.len()) as u32
    }

    /// Removes the `n` oldest messages from the mailbox and renumbers this
    /// session. Marks follow their messages.
    #[allow(clippy::cast_possible_truncation)]
    fn vanish_oldest(&mut self, n: usize) {
        let gone: Vec<u64> = {
            let mut inner = self.lock();
            let n = n.min(inner.messages.len());
            inner.messages.drain(..n).map(|m| m.id).collect()
        };
        let marked: Vec<u64> = self
            .marked
            .iter()
            .map(|&index| self.view[index as usize - 1])
            .collect();

        self.view.retain(|id| !gone.contains(id));
        self.marked = marked
            .iter()
            .filter_map(|id| self.view.iter().position(|v| v == id))
            .map(|pos| pos as u32 + 1)
            .collect();
    }

    fn raw(&self, index: u32) -> Vec<u8> {
        let id = self.view[index as usize - 1];
        self.lock()
            .messages
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.raw.clone())
            .unwrap_or_default()
    }
}

impl MailSession for MemorySession {
    async fn stat(&mut self) -> StoreResult<MailboxStat> {
        self.ensure_alive()?;
        let inner = self.lock();
        let size = self
            .view
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.marked.contains(&(*i as u32 + 1)))
            .filter_map(|(_, id)| inner.messages.iter().find(|m| m.id == *id))
            .map(|m| m.raw.len() as u64)
            .sum();
        drop(inner);
        Ok(MailboxStat {
            count: self.visible_count(),
            size,
        })
    }

    async fn fetch_header(&mut self, index: u32) -> StoreResult<Vec<u8>> {
        self.ensure_alive()?;
        let vanish = self
            .lock()
            .take_fault(|f| matches!(f, Fault::VanishBeforeHeader(_)));
        if let Some(Fault::VanishBeforeHeader(n)) = vanish {
            self.vanish_oldest(n);
        }
        self.check_index(index)?;

        let fault = {
            let mut inner = self.lock();
            inner.header_fetches += 1;
            inner.take_fault(|f| matches!(f, Fault::HeaderTransient | Fault::HeaderProtocol))
        };
        match fault {
            Some(Fault::HeaderTransient) => return Err(self.drop_connection()),
            Some(_) => return Err(StoreError::Protocol("malformed TOP reply".into())),
            None => {}
        }

        let raw = self.raw(index);
        let end = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map_or(raw.len(), |p| p + 4);
        Ok(raw[..end].to_vec())
    }

    async fn retrieve(&mut self, index: u32) -> StoreResult<Vec<u8>> {
        self.ensure_alive()?;
        self.check_index(index)?;
        Ok(self.raw(index))
    }

    async fn mark_deleted(&mut self, index: u32) -> StoreResult<()> {
        self.ensure_alive()?;
        self.check_index(index)?;

        let fault = self
            .lock()
            .take_fault(|f| matches!(f, Fault::MarkProtocol | Fault::DropAfterMarks(_)));
        match fault {
            Some(Fault::MarkProtocol) => {
                return Err(StoreError::Protocol("malformed DELE reply".into()));
            }
            Some(Fault::DropAfterMarks(n)) => self.marks_until_drop = Some(n),
            _ => {}
        }

        if let Some(remaining) = self.marks_until_drop {
            if remaining == 0 {
                return Err(self.drop_connection());
            }
            self.marks_until_drop = Some(remaining - 1);
        }

        self.marked.insert(index);
        Ok(())
    }

    async fn reset(&mut self) -> StoreResult<()> {
        self.ensure_alive()?;
        self.marked.clear();
        Ok(())
    }

    async fn commit(mut self) -> StoreResult<()> {
        self.ensure_alive()?;

        let fault = self
            .lock()
            .take_fault(|f| matches!(f, Fault::CommitDropped | Fault::CommitUnacknowledged));
        if fault == Some(Fault::CommitDropped) {
            return Err(self.drop_connection());
        }

        let doomed: Vec<u64> = self
            .marked
            .iter()
            .map(|&index| self.view[index as usize - 1])
            .collect();
        {
            let mut inner = self.lock();
            inner.messages.retain(|m| !doomed.contains(&m.id));
            inner.commits += 1;
        }
        self.marked.clear();

        if fault == Some(Fault::CommitUnacknowledged) {
            return Err(StoreError::Transient("connection reset after QUIT".into()));
        }
        Ok(())
    }

    async fn abort(self) {}
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.lock().locked = false;
    }
}

/// Builds a minimal RFC 5322 message.
///
/// A `None` date produces a message without a `Date:` header.
#[must_use]
pub fn synthetic_message(date: Option<DateTime<Utc>>, subject: &str, from: &str) -> Vec<u8> {
    let mut raw = String::new();
    if let Some(date) = date {
        raw.push_str(&format!("Date: {}\r\n", date.to_rfc2822()));
    }
    raw.push_str(&format!("From: {from}\r\n"));
    raw.push_str(&format!("Subject: {subject}\r\n"));
    raw.push_str("\r\n");
    raw.push_str(&format!("Body of {subject}\r\n"));
    raw.into_bytes()
}
