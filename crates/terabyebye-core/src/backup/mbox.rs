//! Monthly mbox archives.
//!
//! Messages go to `emails_YYYY-MM.mbox` by their date, or
//! `emails_undated.mbox`. Lines starting with `>*From ` are quoted with one
//! more `>` (mboxrd), so the archive can be split back losslessly.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{BackupError, BackupSink};

/// Writes messages into one mbox file per calendar month.
#[derive(Debug)]
pub struct MboxArchive {
    dir: PathBuf,
    files: HashMap<String, File>,
    counts: BTreeMap<String, u32>,
}

impl MboxArchive {
    /// Creates the archive directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn create(dir: impl AsRef<Path>) -> Result<Self, BackupError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            files: HashMap::new(),
            counts: BTreeMap::new(),
        })
    }

    /// Archive directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a message date.
    #[must_use]
    pub fn file_name(date: Option<DateTime<Utc>>) -> String {
        date.map_or_else(
            || "emails_undated.mbox".to_string(),
            |d| format!("emails_{}.mbox", d.format("%Y-%m")),
        )
    }

    async fn file(&mut self, name: &str) -> Result<&mut File, BackupError> {
        if !self.files.contains_key(name) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(name))
                .await?;
            self.files.insert(name.to_string(), file);
        }
        self.files
            .get_mut(name)
            .ok_or_else(|| BackupError::Io(std::io::Error::other("archive handle missing")))
    }
}

impl BackupSink for MboxArchive {
    async fn store(
        &mut self,
        index: u32,
        raw: &[u8],
        date: Option<DateTime<Utc>>,
    ) -> Result<(), BackupError> {
        let name = Self::file_name(date);
        let entry = mbox_entry(raw, date);

        let file = self.file(&name).await?;
        let start = file.metadata().await?.len();

        let written = async {
            file.write_all(&entry).await?;
            file.flush().await?;
            file.sync_data().await
        }
        .await;

        if let Err(e) = written {
            // Roll back a partial entry so the archive stays parseable.
            if let Err(trunc) = file.set_len(start).await {
                warn!(index, error = %trunc, "Failed to roll back partial mbox entry");
            }
            self.files.remove(&name);
            return Err(e.into());
        }

        *self.counts.entry(name.clone()).or_default() += 1;
        debug!(index, file = %name, bytes = entry.len(), "Message archived");
        Ok(())
    }

    fn report(&self) -> Vec<(String, u32)> {
        self.counts.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

/// Builds one mboxrd entry: separator line, quoted body with LF endings and
/// a trailing blank line.
fn mbox_entry(raw: &[u8], date: Option<DateTime<Utc>>) -> Vec<u8> {
    let stamp = date
        .unwrap_or(DateTime::UNIX_EPOCH)
        .format("%a %b %e %H:%M:%S %Y");
    let mut out = format!("From MAILER-DAEMON {stamp}\n").into_bytes();

    for line in raw.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let quotes = line.iter().take_while(|&&b| b == b'>').count();
        if line[quotes..].starts_with(b"From ") {
            out.push(b'>');
        }
        out.extend_from_slice(line);
        out.push(b'\n');
    }

    // split() yields a trailing empty line for input ending in LF.
    if raw.ends_with(b"\n") {
        out.pop();
    }
    out.push(b'\n');
    out
}
