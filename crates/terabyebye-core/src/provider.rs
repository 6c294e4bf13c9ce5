//! Provider profiles.
//!
//! Mail providers that expose POP3 differ in how much load they tolerate
//! before dropping sessions. A profile carries the endpoint plus the limits
//! the engine must respect for that provider.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::Security;

/// Known providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Yahoo Mail (pop.mail.yahoo.com).
    #[default]
    Yahoo,
    /// Any other POP3 server.
    Custom,
}

impl Provider {
    /// Detects the provider from an email address domain.
    #[must_use]
    pub fn detect(email: &str) -> Self {
        let domain = email
            .rsplit_once('@')
            .map(|(_, d)| d.to_ascii_lowercase())
            .unwrap_or_default();
        if domain.starts_with("yahoo.")
            || domain.starts_with("ymail.")
            || domain.starts_with("rocketmail.")
        {
            Self::Yahoo
        } else {
            Self::Custom
        }
    }
}

/// Endpoint and pacing limits for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    /// Which provider this profile describes.
    pub provider: Provider,
    /// POP3 host.
    pub host: String,
    /// POP3 port.
    pub port: u16,
    /// Connection security.
    pub security: Security,
    /// Largest number of deletions the provider accepts in one session.
    pub batch_ceiling: u32,
    /// Pause between consecutive batch sessions.
    pub inter_batch_pause: Duration,
}

impl ProviderProfile {
    /// Yahoo drops sessions that mark more than about 50 messages and
    /// rate-limits logins.
    #[must_use]
    pub fn yahoo() -> Self {
        Self {
            provider: Provider::Yahoo,
            host: "pop.mail.yahoo.com".into(),
            port: 995,
            security: Security::Tls,
            batch_ceiling: 50,
            inter_batch_pause: Duration::from_secs(3),
        }
    }

    /// Profile for an arbitrary server.
    #[must_use]
    pub fn custom(host: impl Into<String>, port: u16, security: Security) -> Self {
        Self {
            provider: Provider::Custom,
            host: host.into(),
            port,
            security,
            batch_ceiling: 500,
            inter_batch_pause: Duration::from_secs(1),
        }
    }

    /// Effective batch size for a requested size. Never below 1, even for a
    /// zero ceiling.
    #[must_use]
    pub fn clamp_batch(&self, requested: u32) -> u32 {
        requested.min(self.batch_ceiling).max(1)
    }
}
