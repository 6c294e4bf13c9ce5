//! The resolved deletion window.

use std::fmt;
use std::ops::Range;

use chrono::{DateTime, Utc};

use crate::cutoff::{Cutoff, CutoffWindow};
use crate::store::MailboxStat;

/// Outcome of planning: which indices fall in the window, plus an overview
/// of the mailbox at the time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionPlan {
    /// Cutoff as configured.
    pub cutoff: Cutoff,
    /// Cutoff resolved against the clock.
    pub window: CutoffWindow,
    /// Half-open index range `[lo, hi)` in the numbering seen at planning.
    pub range: Range<u32>,
    /// Count and size at planning.
    pub mailbox: MailboxStat,
    /// Date of the first message, if the search saw it.
    pub oldest: Option<DateTime<Utc>>,
    /// Date of the last message, if the search saw it.
    pub newest: Option<DateTime<Utc>>,
    /// Header fetches the search needed.
    pub fetches: u32,
}

impl DeletionPlan {
    /// Messages in the window.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.range.end.saturating_sub(self.range.start)
    }

    /// Returns true if nothing falls in the window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rough size of the window, assuming messages of average size.
    #[must_use]
    pub fn estimated_bytes(&self) -> u64 {
        if self.mailbox.count == 0 {
            return 0;
        }
        self.mailbox.size / u64::from(self.mailbox.count) * u64::from(self.len())
    }
}

impl fmt::Display for DeletionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Mailbox:  {} messages, {:.1} MB",
            self.mailbox.count,
            mb(self.mailbox.size)
        )?;
        if let (Some(oldest), Some(newest)) = (self.oldest, self.newest) {
            writeln!(
                f,
                "Dates:    {} .. {}",
                oldest.format("%Y-%m-%d"),
                newest.format("%Y-%m-%d")
            )?;
        }
        writeln!(f, "Cutoff:   {}", self.cutoff)?;
        if self.is_empty() {
            write!(f, "Window:   nothing to delete")
        } else {
            write!(
                f,
                "Window:   messages {}..={} ({} messages, ~{:.1} MB)",
                self.range.start,
                self.range.end - 1,
                self.len(),
                mb(self.estimated_bytes())
            )
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn plan(range: Range<u32>) -> DeletionPlan {
        let cutoff = Cutoff::Before(NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
        DeletionPlan {
            cutoff,
            window: cutoff.window(Utc::now()),
            range,
            mailbox: MailboxStat {
                count: 100,
                size: 100 * 2048,
            },
            oldest: None,
            newest: None,
            fetches: 7,
        }
    }

    #[test]
    fn length_and_estimate() {
        let plan = plan(1..41);
        assert_eq!(plan.len(), 40);
        assert!(!plan.is_empty());
        assert_eq!(plan.estimated_bytes(), 40 * 2048);
    }

    #[test]
    fn empty_window() {
        let plan = plan(1..1);
        assert!(plan.is_empty());
        assert!(plan.to_string().contains("nothing to delete"));
    }
}
