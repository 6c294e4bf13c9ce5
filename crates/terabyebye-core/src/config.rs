//! Run configuration.

use std::path::PathBuf;

use crate::cutoff::Cutoff;
use crate::filter::ExclusionFilter;
use crate::provider::ProviderProfile;
use crate::retry::RetryPolicy;

/// What a run does with the messages in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Count and describe, never mutate.
    #[default]
    Preview,
    /// Delete without backup.
    Delete,
    /// Archive without deleting.
    BackupOnly,
    /// Archive each message, then delete it.
    BackupAndDelete,
}

impl RunMode {
    /// Returns true if the mode marks messages for deletion.
    #[must_use]
    pub const fn deletes(self) -> bool {
        matches!(self, Self::Delete | Self::BackupAndDelete)
    }

    /// Returns true if the mode writes backups.
    #[must_use]
    pub const fn backs_up(self) -> bool {
        matches!(self, Self::BackupOnly | Self::BackupAndDelete)
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Delete => "delete",
            Self::BackupOnly => "backup",
            Self::BackupAndDelete => "backup + delete",
        }
    }
}

/// Everything the engine needs for one run. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// What to delete.
    pub cutoff: Cutoff,
    /// What to do with it.
    pub mode: RunMode,
    /// Requested messages per batch, clamped by the provider ceiling.
    pub batch_size: u32,
    /// Provider endpoint and limits.
    pub profile: ProviderProfile,
    /// Skip interactive confirmation.
    pub skip_confirmation: bool,
    /// Messages never to delete.
    pub exclusions: ExclusionFilter,
    /// Retry and backoff policy.
    pub retry: RetryPolicy,
    /// Archive directory for the backup modes.
    pub backup_dir: Option<PathBuf>,
}

impl RunConfig {
    /// Creates a preview configuration with defaults for everything else.
    #[must_use]
    pub fn new(cutoff: Cutoff, profile: ProviderProfile) -> Self {
        Self {
            cutoff,
            mode: RunMode::Preview,
            batch_size: profile.batch_ceiling,
            profile,
            skip_confirmation: false,
            exclusions: ExclusionFilter::default(),
            retry: RetryPolicy::default(),
            backup_dir: None,
        }
    }

    /// Batch size after applying the provider ceiling.
    #[must_use]
    pub fn effective_batch_size(&self) -> u32 {
        self.profile.clamp_batch(self.batch_size)
    }

    /// Checks the configuration, collecting every problem.
    ///
    /// # Errors
    ///
    /// Returns all validation errors found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.batch_size == 0 {
            errors.push(ValidationError::ZeroBatchSize);
        }
        if self.mode.backs_up() && self.backup_dir.is_none() {
            errors.push(ValidationError::MissingBackupDir);
        }
        if matches!(self.cutoff, Cutoff::OlderThanYears(0)) {
            errors.push(ValidationError::ZeroYears);
        }
        if self.profile.batch_ceiling == 0 {
            errors.push(ValidationError::ZeroBatchCeiling);
        }
        if self.profile.host.trim().is_empty() {
            errors.push(ValidationError::EmptyHost);
        }
        if self.profile.port == 0 {
            errors.push(ValidationError::InvalidPort);
        }
        if self.retry.max_attempts == 0 || self.retry.failures_before_shrink == 0 {
            errors.push(ValidationError::InvalidRetryPolicy);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validation error for a run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Batch size is zero.
    ZeroBatchSize,
    /// A backup mode was chosen without a directory.
    MissingBackupDir,
    /// Provider ceiling is zero.
    ZeroBatchCeiling,
    /// "Older than 0 years" would delete everything.
    ZeroYears,
    /// Server host is empty.
    EmptyHost,
    /// Server port is zero.
    InvalidPort,
    /// Retry policy allows no attempts.
    InvalidRetryPolicy,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ZeroBatchSize => "Batch size must be at least 1",
            Self::MissingBackupDir => "Backup directory is required for backup modes",
            Self::ZeroBatchCeiling => "Provider batch ceiling must be at least 1",
            Self::ZeroYears => "Years old must be at least 1",
            Self::EmptyHost => "POP3 server is required",
            Self::InvalidPort => "POP3 port must be 1-65535",
            Self::InvalidRetryPolicy => "Retry attempts and shrink threshold must be at least 1",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::ZeroBatchSize => "batch_size",
            Self::MissingBackupDir => "backup_dir",
            Self::ZeroBatchCeiling => "batch_ceiling",
            Self::ZeroYears => "years_old",
            Self::EmptyHost => "host",
            Self::InvalidPort => "port",
            Self::InvalidRetryPolicy => "retry",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig::new(Cutoff::OlderThanYears(1), ProviderProfile::yahoo())
    }

    #[test]
    fn defaults_are_valid() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.mode, RunMode::Preview);
        assert_eq!(config.effective_batch_size(), 50);
    }

    #[test]
    fn collects_all_errors() {
        let mut config = config();
        config.batch_size = 0;
        config.mode = RunMode::BackupAndDelete;
        config.cutoff = Cutoff::OlderThanYears(0);

        let errors = config.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroBatchSize,
                ValidationError::MissingBackupDir,
                ValidationError::ZeroYears,
            ]
        );
        assert_eq!(errors[1].field(), "backup_dir");
    }

    #[test]
    fn zero_provider_ceiling_is_rejected() {
        let mut config = config();
        config.profile.batch_ceiling = 0;
        assert_eq!(config.effective_batch_size(), 1);
        assert_eq!(
            config.validate().unwrap_err(),
            vec![ValidationError::ZeroBatchCeiling]
        );
    }

    #[test]
    fn batch_size_clamped_by_provider() {
        let mut config = config();
        config.batch_size = 1000;
        assert_eq!(config.effective_batch_size(), 50);
    }

    #[test]
    fn mode_flags() {
        assert!(!RunMode::Preview.deletes());
        assert!(RunMode::BackupAndDelete.deletes());
        assert!(RunMode::BackupAndDelete.backs_up());
        assert!(!RunMode::Delete.backs_up());
        assert!(!RunMode::BackupOnly.deletes());
    }
}
