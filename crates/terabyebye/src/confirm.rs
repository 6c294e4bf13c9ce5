//! Interactive confirmation.

use std::io::{self, BufRead, Write};

use terabyebye_core::{DeletionPlan, RunMode};

/// Backups larger than this many messages get a warning first.
pub const LARGE_BACKUP: u32 = 10_000;

/// Asks the user to confirm the run. Deletion needs the word `DELETE`,
/// backups a `y`.
///
/// # Errors
///
/// Returns an error if the terminal cannot be read or written.
pub fn confirm(
    mode: RunMode,
    plan: &DeletionPlan,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> io::Result<bool> {
    let (question, expected) = match mode {
        RunMode::Preview => return Ok(true),
        RunMode::Delete => {
            writeln!(
                output,
                "\nAbout to delete {} messages ({}).\nThis cannot be undone!",
                plan.len(),
                plan.cutoff
            )?;
            ("Type 'DELETE' to confirm: ", "DELETE")
        }
        RunMode::BackupOnly => ("\nProceed with backup? (y/N): ", "y"),
        RunMode::BackupAndDelete => ("\nProceed with backup AND deletion? (y/N): ", "y"),
    };
    write!(output, "{question}")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    Ok(if expected == "y" {
        answer.eq_ignore_ascii_case("y")
    } else {
        answer == expected
    })
}

/// Warning shown before backing up a very large window.
pub fn backup_warning(plan: &DeletionPlan) -> Option<String> {
    (plan.len() > LARGE_BACKUP).then(|| {
        format!(
            "Backing up {} messages will take a while. Consider a smaller date range first.",
            plan.len()
        )
    })
}
