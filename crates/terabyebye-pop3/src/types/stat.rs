//! Maildrop listing types.

/// Result of the `STAT` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MailboxStat {
    /// Number of messages in the maildrop (not counting messages marked as deleted).
    pub count: u32,
    /// Total size of the maildrop in octets.
    pub size: u64,
}

impl MailboxStat {
    /// Returns true if the maildrop has no messages.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true if `index` addresses an existing message.
    #[must_use]
    pub const fn contains(&self, index: u32) -> bool {
        index >= 1 && index <= self.count
    }
}
