//! Run outcome reporting.

use std::fmt;
use std::time::Duration;

use crate::config::RunMode;

/// Exact counts at the moment a run stopped.
///
/// Built from observed mailbox counts, never from remembered indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Messages confirmed gone by a drop in the server's count.
    pub deleted: u32,
    /// Messages in the window deliberately left in place.
    pub retained: u32,
    /// Messages in the window not yet processed.
    pub remaining: u32,
    /// Marks whose commit could not be confirmed from the count.
    pub unverified: u32,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} deleted, {} retained, {} still to delete",
            self.deleted, self.retained, self.remaining
        )?;
        if self.unverified > 0 {
            write!(f, ", {} unverified", self.unverified)?;
        }
        Ok(())
    }
}

/// Final report of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Mode that ran.
    pub mode: RunMode,
    /// Messages in the planned window.
    pub planned: u32,
    /// Messages deleted, as observed from the count.
    pub deleted: u32,
    /// Messages left in place: excluded, out of order, failed backup or
    /// failed mark.
    pub retained: u32,
    /// Of `retained`, how many an exclusion filter matched.
    pub excluded: u32,
    /// Of `retained`, how many were dated after the cutoff despite their
    /// position in the window.
    pub out_of_order: u32,
    /// Messages written to the archive.
    pub backed_up: u32,
    /// Messages whose archive write failed.
    pub backup_failures: u32,
    /// Batches attempted.
    pub batches: u32,
    /// Batches that failed and were retried.
    pub failed_batches: u32,
    /// Batch size in force at the end.
    pub final_batch_size: u32,
    /// Marks whose commit could not be confirmed.
    pub unverified: u32,
    /// Wall time of the execution phase.
    pub elapsed: Duration,
    /// Stopped early by a cancellation request.
    pub cancelled: bool,
    /// Archive files and how many messages each received.
    pub archives: Vec<(String, u32)>,
}

impl RunSummary {
    /// Messages of the window neither deleted nor retained.
    #[must_use]
    pub const fn unprocessed(&self) -> u32 {
        self.planned
            .saturating_sub(self.deleted)
            .saturating_sub(self.retained)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mode:            {}", self.mode.name())?;
        writeln!(f, "Planned:         {}", self.planned)?;
        writeln!(f, "Deleted:         {}", self.deleted)?;
        write!(f, "Retained:        {} ({} excluded", self.retained, self.excluded)?;
        if self.out_of_order > 0 {
            write!(f, ", {} dated after the cutoff", self.out_of_order)?;
        }
        writeln!(f, ")")?;
        writeln!(f, "Unprocessed:     {}", self.unprocessed())?;
        if self.mode.backs_up() {
            writeln!(f, "Backed up:       {}", self.backed_up)?;
            writeln!(f, "Backup failures: {}", self.backup_failures)?;
        }
        writeln!(
            f,
            "Batches:         {} ({} failed, final size {})",
            self.batches, self.failed_batches, self.final_batch_size
        )?;
        if self.unverified > 0 {
            writeln!(f, "Unverified:      {}", self.unverified)?;
        }
        if self.cancelled {
            writeln!(f, "Cancelled:       yes")?;
        }
        write!(f, "Elapsed:         {:.1}s", self.elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_display() {
        let progress = Progress {
            deleted: 10,
            retained: 2,
            remaining: 5,
            unverified: 0,
        };
        assert_eq!(progress.to_string(), "10 deleted, 2 retained, 5 still to delete");

        let progress = Progress {
            unverified: 3,
            ..progress
        };
        assert!(progress.to_string().ends_with(", 3 unverified"));
    }

    #[test]
    fn unprocessed_never_underflows() {
        let summary = RunSummary {
            planned: 10,
            deleted: 7,
            retained: 1,
            ..RunSummary::default()
        };
        assert_eq!(summary.unprocessed(), 2);

        let summary = RunSummary {
            planned: 1,
            deleted: 3,
            ..RunSummary::default()
        };
        assert_eq!(summary.unprocessed(), 0);
    }

    #[test]
    fn summary_lists_backups_only_when_relevant() {
        let summary = RunSummary {
            mode: RunMode::Delete,
            ..RunSummary::default()
        };
        assert!(!summary.to_string().contains("Backed up"));

        let summary = RunSummary {
            mode: RunMode::BackupAndDelete,
            backed_up: 4,
            ..RunSummary::default()
        };
        assert!(summary.to_string().contains("Backed up:       4"));
    }

    #[test]
    fn summary_always_reports_unprocessed() {
        let summary = RunSummary {
            planned: 200,
            deleted: 99,
            ..RunSummary::default()
        };
        assert!(summary.to_string().contains("Unprocessed:     101"));

        let summary = RunSummary {
            planned: 200,
            deleted: 199,
            retained: 1,
            out_of_order: 1,
            ..RunSummary::default()
        };
        let text = summary.to_string();
        assert!(text.contains("Unprocessed:     0"));
        assert!(text.contains("Retained:        1 (0 excluded, 1 dated after the cutoff)"));
    }
}
