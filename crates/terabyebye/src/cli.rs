//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use terabyebye_core::RunMode;

/// Archive directory used by `--safe` when `--backup` is not given.
pub const SAFE_BACKUP_DIR: &str = "terabyebye-backup";

/// Batch size ceiling in `--safe` mode.
pub const SAFE_BATCH_SIZE: u32 = 50;

#[derive(Parser, Debug)]
#[command(name = "terabyebye")]
#[command(version, about = "Bulk delete old mail from a POP3 mailbox", long_about = None)]
#[command(after_help = "\
Examples:
  terabyebye                          Preview what would be deleted
  terabyebye --delete                 Delete, after typing DELETE
  terabyebye --backup ./backup        Back up only, no deletion
  terabyebye --backup ./backup --delete
                                      Back up each batch, then delete it
  terabyebye --safe                   Back up and delete in small batches
  terabyebye --unhinged               Delete without any prompts")]
pub struct Cli {
    /// Preview what would be deleted (default)
    #[arg(long, conflicts_with_all = ["delete", "unhinged", "safe"])]
    pub preview: bool,

    /// Delete messages (asks for confirmation)
    #[arg(long)]
    pub delete: bool,

    /// Back up messages to monthly mbox files in DIR; add --delete to also delete
    #[arg(long, value_name = "DIR")]
    pub backup: Option<PathBuf>,

    /// Delete without any prompts
    #[arg(long, conflicts_with = "safe")]
    pub unhinged: bool,

    /// Back up and delete, with small batches and confirmations
    #[arg(long)]
    pub safe: bool,

    /// Settings file (default: ./terabyebye.json, then the user config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Show the account, provider and mailbox size, then exit
    #[arg(long)]
    pub status: bool,
}

impl Cli {
    /// Run mode selected by the flags.
    pub fn mode(&self) -> RunMode {
        let deletes = self.delete || self.unhinged || self.safe;
        match (self.backup_dir().is_some(), deletes) {
            (true, true) => RunMode::BackupAndDelete,
            (true, false) => RunMode::BackupOnly,
            (false, true) => RunMode::Delete,
            (false, false) => RunMode::Preview,
        }
    }

    /// Archive directory, if any mode needs one.
    pub fn backup_dir(&self) -> Option<PathBuf> {
        self.backup
            .clone()
            .or_else(|| self.safe.then(|| PathBuf::from(SAFE_BACKUP_DIR)))
    }

    /// Upper bound on the batch size imposed by the flags.
    pub fn batch_limit(&self) -> Option<u32> {
        self.safe.then_some(SAFE_BATCH_SIZE)
    }

    /// Returns true if confirmations are skipped.
    pub const fn skip_confirmation(&self) -> bool {
        self.unhinged
    }
}
