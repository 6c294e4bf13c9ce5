//! POP3 adapter for the mail store capability.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use terabyebye_pop3::connection::{connect_plain, connect_tls};
use terabyebye_pop3::{Client, Error as Pop3Error, MailboxStat, Pop3Stream, ResponseCode, Transaction};
use tracing::debug;

use super::{MailSession, MailStore};
use crate::error::{StoreError, StoreResult};

/// Security/encryption mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption (testing only).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
}

impl Security {
    /// Default POP3 port for the security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 110,
            Self::Tls => 995,
        }
    }
}

/// Connection settings for a POP3 mailbox.
#[derive(Clone)]
pub struct Pop3Settings {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Login name.
    pub username: String,
    /// Password (app password for most providers).
    pub password: String,
    /// Per-command timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for Pop3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pop3Settings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Mail store backed by a POP3 server.
#[derive(Debug, Clone)]
pub struct Pop3Store {
    settings: Pop3Settings,
}

impl Pop3Store {
    /// Creates a store for the given server and account.
    #[must_use]
    pub const fn new(settings: Pop3Settings) -> Self {
        Self { settings }
    }
}

impl MailStore for Pop3Store {
    type Session = Pop3Session;

    async fn open(&self) -> StoreResult<Pop3Session> {
        let s = &self.settings;
        debug!(host = %s.host, port = s.port, "Opening POP3 session");

        let stream = match s.security {
            Security::Tls => connect_tls(&s.host, s.port, s.timeout).await,
            Security::None => connect_plain(&s.host, s.port, s.timeout).await,
        }
        .map_err(classify)?;

        let client = Client::from_stream(stream, s.timeout)
            .await
            .map_err(classify)?;
        let mut client = client
            .login(&s.username, &s.password)
            .await
            .map_err(classify)?;

        let stat = client.stat().await.map_err(classify)?;
        Ok(Pop3Session { client, stat })
    }

    fn describe(&self) -> String {
        format!("{}@{}:{}", self.settings.username, self.settings.host, self.settings.port)
    }
}

/// An authenticated POP3 session in the TRANSACTION state.
#[derive(Debug)]
pub struct Pop3Session {
    client: Client<Pop3Stream, Transaction>,
    // Last STAT seen on this session; indices above `count` are never sent.
    stat: MailboxStat,
}

impl Pop3Session {
    fn check_index(&self, index: u32) -> StoreResult<()> {
        if self.stat.contains(index) {
            Ok(())
        } else {
            Err(StoreError::IndexOutOfRange {
                index,
                count: self.stat.count,
            })
        }
    }

    fn classify_indexed(&self, index: u32, err: Pop3Error) -> StoreError {
        match &err {
            Pop3Error::Server { code: None, message } if is_no_such_message(message) => {
                StoreError::IndexOutOfRange {
                    index,
                    count: self.stat.count,
                }
            }
            _ => classify(err),
        }
    }
}

impl MailSession for Pop3Session {
    async fn stat(&mut self) -> StoreResult<MailboxStat> {
        let stat = self.client.stat().await.map_err(classify)?;
        self.stat = stat;
        Ok(stat)
    }

    async fn fetch_header(&mut self, index: u32) -> StoreResult<Vec<u8>> {
        self.check_index(index)?;
        match self.client.top(index, 0).await {
            Ok(raw) => Ok(raw),
            Err(e) => Err(self.classify_indexed(index, e)),
        }
    }

    async fn retrieve(&mut self, index: u32) -> StoreResult<Vec<u8>> {
        self.check_index(index)?;
        match self.client.retr(index).await {
            Ok(raw) => Ok(raw),
            Err(e) => Err(self.classify_indexed(index, e)),
        }
    }

    async fn mark_deleted(&mut self, index: u32) -> StoreResult<()> {
        self.check_index(index)?;
        match self.client.dele(index).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.classify_indexed(index, e)),
        }
    }

    async fn reset(&mut self) -> StoreResult<()> {
        self.client.rset().await.map_err(classify)
    }

    async fn commit(self) -> StoreResult<()> {
        self.client.quit().await.map_err(classify)
    }

    async fn abort(self) {
        // Dropping the stream without QUIT makes the server discard marks.
        drop(self.client);
    }
}

fn is_no_such_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("no such message") || lower.contains("already deleted")
}

/// Maps a POP3 client error onto the store taxonomy.
fn classify(err: Pop3Error) -> StoreError {
    match err {
        Pop3Error::Auth(msg) => StoreError::Auth(msg),
        Pop3Error::Server {
            code: Some(ResponseCode::Auth),
            message,
        } => StoreError::Auth(message),
        Pop3Error::InvalidDnsName(e) => StoreError::Config(e.to_string()),
        // A poisoned client needs a fresh connection.
        Pop3Error::InvalidState(msg) => StoreError::Transient(msg),
        Pop3Error::Tls(e) => StoreError::Transient(format!("TLS: {e}")),
        e if e.is_transient() => StoreError::Transient(e.to_string()),
        e => StoreError::Protocol(e.to_string()),
    }
}
