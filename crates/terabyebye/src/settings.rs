//! Settings file.
//!
//! A JSON document looked up at `--config`, `./terabyebye.json`, then
//! `<config dir>/terabyebye/config.json`. The password may instead come from
//! the `TERABYEBYE_PASSWORD` environment variable, which wins.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use terabyebye_core::{
    Cutoff, ExclusionFilter, Pop3Settings, Provider, ProviderProfile, RunConfig, Security,
};

use crate::cli::Cli;

/// Environment variable overriding the password from the file.
pub const PASSWORD_ENV: &str = "TERABYEBYE_PASSWORD";

const LOCAL_FILE: &str = "terabyebye.json";
const DEFAULT_BATCH_SIZE: u32 = 50;
const DEFAULT_YEARS_OLD: u32 = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Contents of the settings file. Every field is optional except the
/// account address.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Account address, also the POP3 login.
    pub email: String,
    /// App password. Spaces are ignored.
    pub password: Option<String>,
    /// Provider; detected from the address when absent.
    pub provider: Option<Provider>,
    /// Server host, required for custom providers.
    pub host: Option<String>,
    /// Server port; defaults from `security`.
    pub port: Option<u16>,
    /// Connection security.
    pub security: Option<Security>,
    /// Delete everything before this day (`DD-Mon-YYYY` or `YYYY-MM-DD`).
    pub cutoff_date: Option<String>,
    /// Delete everything older than this many years.
    pub years_old: Option<u32>,
    /// Delete these calendar years (`"2009-2015"` or `"2015"`).
    pub delete_years: Option<String>,
    /// Messages per batch.
    pub batch_size: Option<u32>,
    /// Comma-separated subject keywords never deleted.
    pub exclude_subjects: String,
    /// Comma-separated sender patterns never deleted.
    pub exclude_senders: String,
    /// Per-command timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("provider", &self.provider)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("cutoff_date", &self.cutoff_date)
            .field("years_old", &self.years_old)
            .field("delete_years", &self.delete_years)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Finds the settings file: the explicit path, then the working directory,
/// then the user config directory.
pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    locate_in(explicit, &cwd, dirs::config_dir())
}

fn locate_in(explicit: Option<&Path>, cwd: &Path, config_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = cwd.join(LOCAL_FILE);
    if local.exists() {
        return Some(local);
    }
    config_dir
        .map(|dir| dir.join("terabyebye").join("config.json"))
        .filter(|path| path.exists())
}

impl Settings {
    /// Reads and parses a settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid settings in {}", path.display()))
    }

    /// Provider endpoint and limits.
    pub fn profile(&self) -> ProviderProfile {
        let provider = self
            .provider
            .unwrap_or_else(|| Provider::detect(&self.email));
        match provider {
            Provider::Yahoo => ProviderProfile::yahoo(),
            Provider::Custom => {
                let security = self.security.unwrap_or_default();
                ProviderProfile::custom(
                    self.host.clone().unwrap_or_default(),
                    self.port.unwrap_or_else(|| security.default_port()),
                    security,
                )
            }
        }
    }

    /// The cutoff: `delete_years` wins over `cutoff_date`, which wins over
    /// `years_old`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured value does not parse.
    pub fn cutoff(&self) -> Result<Cutoff> {
        if let Some(years) = self.delete_years.as_deref().filter(|s| !s.trim().is_empty()) {
            return Ok(Cutoff::parse_year_range(years)?);
        }
        if let Some(date) = self.cutoff_date.as_deref().filter(|s| !s.trim().is_empty()) {
            return Ok(Cutoff::Before(Cutoff::parse_date(date)?));
        }
        Ok(Cutoff::OlderThanYears(
            self.years_old.unwrap_or(DEFAULT_YEARS_OLD),
        ))
    }

    /// Connection settings. `env_password`, when set, replaces the password
    /// from the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the address or the password is missing.
    pub fn pop3_settings(&self, env_password: Option<String>) -> Result<Pop3Settings> {
        if self.email.trim().is_empty() {
            bail!("\"email\" is missing from the settings");
        }
        let password = env_password
            .or_else(|| self.password.clone())
            .map(|p| p.replace(' ', ""))
            .filter(|p| !p.is_empty())
            .with_context(|| {
                format!("no password: set \"password\" in the settings or {PASSWORD_ENV}")
            })?;

        let profile = self.profile();
        Ok(Pop3Settings {
            host: profile.host,
            port: profile.port,
            security: profile.security,
            username: self.email.trim().to_string(),
            password,
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }

    /// Builds the run configuration for the given flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the cutoff does not parse.
    pub fn run_config(&self, cli: &Cli) -> Result<RunConfig> {
        let mut config = RunConfig::new(self.cutoff()?, self.profile());
        config.mode = cli.mode();
        config.batch_size = self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if let Some(limit) = cli.batch_limit() {
            config.batch_size = config.batch_size.min(limit);
        }
        config.skip_confirmation = cli.skip_confirmation();
        config.exclusions = ExclusionFilter::from_lists(&self.exclude_subjects, &self.exclude_senders);
        config.backup_dir = cli.backup_dir();
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;
    use terabyebye_core::RunMode;

    use super::*;

    fn settings(json: &str) -> Settings {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn minimal_file() {
        let s = settings(r#"{ "email": "me@yahoo.com", "password": "abcd efgh ijkl mnop" }"#);
        let pop3 = s.pop3_settings(None).unwrap();
        assert_eq!(pop3.host, "pop.mail.yahoo.com");
        assert_eq!(pop3.port, 995);
        assert_eq!(pop3.password, "abcdefghijklmnop");
        assert_eq!(pop3.timeout, Duration::from_secs(60));
        assert_eq!(s.cutoff().unwrap(), Cutoff::OlderThanYears(1));
    }

    #[test]
    fn environment_password_wins() {
        let s = settings(r#"{ "email": "me@yahoo.com", "password": "from-file" }"#);
        let pop3 = s.pop3_settings(Some("from env".into())).unwrap();
        assert_eq!(pop3.password, "fromenv");
    }

    #[test]
    fn missing_password_is_an_error() {
        let s = settings(r#"{ "email": "me@yahoo.com" }"#);
        let err = s.pop3_settings(None).unwrap_err();
        assert!(err.to_string().contains(PASSWORD_ENV));

        let s = settings(r#"{ "password": "x" }"#);
        assert!(s.pop3_settings(None).is_err());
    }

    #[test]
    fn cutoff_precedence() {
        let s = settings(
            r#"{ "email": "a@b", "cutoff_date": "01-Jan-2015", "delete_years": "2009-2011", "years_old": 3 }"#,
        );
        assert_eq!(
            s.cutoff().unwrap(),
            Cutoff::YearRange {
                start: 2009,
                end: 2011
            }
        );

        let s = settings(r#"{ "email": "a@b", "cutoff_date": "2015-01-01", "years_old": 3 }"#);
        assert!(matches!(s.cutoff().unwrap(), Cutoff::Before(_)));

        let s = settings(r#"{ "email": "a@b", "years_old": 3 }"#);
        assert_eq!(s.cutoff().unwrap(), Cutoff::OlderThanYears(3));

        let s = settings(r#"{ "email": "a@b", "cutoff_date": "yesterday" }"#);
        assert!(s.cutoff().is_err());
    }

    #[test]
    fn custom_provider() {
        let s = settings(
            r#"{ "email": "me@example.org", "host": "pop.example.org", "security": "none" }"#,
        );
        let profile = s.profile();
        assert_eq!(profile.provider, Provider::Custom);
        assert_eq!(profile.host, "pop.example.org");
        assert_eq!(profile.port, 110);
        assert_eq!(profile.security, Security::None);
    }

    #[test]
    fn run_config_from_flags() {
        let s = settings(
            r#"{ "email": "me@yahoo.com", "batch_size": 200, "exclude_subjects": "invoice, receipt" }"#,
        );
        let cli = Cli::try_parse_from(["terabyebye", "--safe"]).unwrap();
        let config = s.run_config(&cli).unwrap();

        assert_eq!(config.mode, RunMode::BackupAndDelete);
        assert_eq!(config.batch_size, 50);
        assert!(config.backup_dir.is_some());
        assert!(!config.exclusions.is_empty());
        assert!(!config.skip_confirmation);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_redacts_password() {
        let s = settings(r#"{ "email": "me@yahoo.com", "password": "hunter2" }"#);
        let text = format!("{s:?}");
        assert!(!text.contains("hunter2"));
        assert!(text.contains("REDACTED"));
    }

    #[test]
    fn lookup_order() {
        let cwd = tempfile::tempdir().unwrap();
        let config_dir = tempfile::tempdir().unwrap();
        let user_file = config_dir.path().join("terabyebye").join("config.json");
        std::fs::create_dir_all(user_file.parent().unwrap()).unwrap();
        std::fs::write(&user_file, "{}").unwrap();

        let explicit = Path::new("/somewhere/else.json");
        assert_eq!(
            locate_in(Some(explicit), cwd.path(), Some(config_dir.path().to_path_buf())).unwrap(),
            explicit
        );
        assert_eq!(
            locate_in(None, cwd.path(), Some(config_dir.path().to_path_buf())).unwrap(),
            user_file
        );

        let local = cwd.path().join(LOCAL_FILE);
        std::fs::write(&local, "{}").unwrap();
        assert_eq!(
            locate_in(None, cwd.path(), Some(config_dir.path().to_path_buf())).unwrap(),
            local
        );
        assert!(locate_in(None, Path::new("/nonexistent"), None).is_none());
    }

    #[tokio::test]
    async fn load_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{ "email": "me@yahoo.com", "years_old": 2 }"#)
            .await
            .unwrap();
        let s = Settings::load(&path).await.unwrap();
        assert_eq!(s.years_old, Some(2));

        tokio::fs::write(&path, "{ not json").await.unwrap();
        let err = Settings::load(&path).await.unwrap_err();
        assert!(format!("{err:#}").contains("invalid settings"));
    }
}
