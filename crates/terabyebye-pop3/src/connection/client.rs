//! Type-state POP3 client.

use std::marker::PhantomData;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::framed::FramedStream;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{parse_stat, parse_status};
use crate::types::{MailboxStat, ResponseCode, Status};

/// Default per-command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Type-state marker for the AUTHORIZATION state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authorization;

/// Type-state marker for the TRANSACTION state.
///
/// Messages marked with `DELE` are only removed when the session leaves this
/// state through `QUIT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transaction;

/// POP3 client with type-state pattern.
pub struct Client<S, State> {
    stream: FramedStream<S>,
    greeting: String,
    timeout: Duration,
    // Set once a command times out or the stream fails mid-response.
    poisoned: bool,
    _state: PhantomData<State>,
}

impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("greeting", &self.greeting)
            .field("timeout", &self.timeout)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl<S> Client<S, Authorization>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a connected stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting cannot be read or is negative.
    pub async fn from_stream(stream: S, timeout: Duration) -> Result<Self> {
        let mut client = Self {
            stream: FramedStream::new(stream),
            greeting: String::new(),
            timeout,
            poisoned: false,
            _state: PhantomData,
        };

        let greeting = client.read_status().await?;
        if !greeting.is_ok() {
            return Err(Error::server(greeting.code, greeting.text));
        }

        client.greeting = greeting.text;
        Ok(client)
    }

    /// Authenticates with `USER`/`PASS` and enters the TRANSACTION state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the server rejects the credentials, or a
    /// transient [`Error::Server`] if the maildrop is locked or the server is
    /// temporarily unavailable.
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<S, Transaction>> {
        let status = self
            .execute(&Command::User {
                name: username.to_string(),
            })
            .await?;
        if !status.is_ok() {
            return Err(login_error(status));
        }

        let status = self
            .execute(&Command::Pass {
                password: password.to_string(),
            })
            .await?;
        if !status.is_ok() {
            return Err(login_error(status));
        }

        debug!("POP3 login accepted");
        Ok(Client {
            stream: self.stream,
            greeting: self.greeting,
            timeout: self.timeout,
            poisoned: false,
            _state: PhantomData,
        })
    }
}

/// Classifies a negative USER/PASS reply.
fn login_error(status: Status) -> Error {
    match status.code {
        Some(code) if code.is_transient() => Error::server(Some(code), status.text),
        Some(ResponseCode::SysPerm) => Error::server(Some(ResponseCode::SysPerm), status.text),
        _ => Error::Auth(status.text),
    }
}

impl<S> Client<S, Transaction>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the message count and maildrop size.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the reply is malformed.
    pub async fn stat(&mut self) -> Result<MailboxStat> {
        let status = self.execute_ok(&Command::Stat).await?;
        parse_stat(&status.text)
    }

    /// Retrieves the headers of a message plus the first `lines` body lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the index or the stream fails.
    pub async fn top(&mut self, index: u32, lines: u32) -> Result<Vec<u8>> {
        self.execute_multiline(&Command::Top { index, lines }).await
    }

    /// Retrieves a whole message.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the index or the stream fails.
    pub async fn retr(&mut self, index: u32) -> Result<Vec<u8>> {
        self.execute_multiline(&Command::Retr { index }).await
    }

    /// Marks a message as deleted. Takes effect only on [`Client::quit`].
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the index.
    pub async fn dele(&mut self, index: u32) -> Result<()> {
        self.execute_ok(&Command::Dele { index }).await.map(|_| ())
    }

    /// Unmarks every message marked as deleted in this session.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rset(&mut self) -> Result<()> {
        self.execute_ok(&Command::Rset).await.map(|_| ())
    }

    /// Sends QUIT, committing every deletion marked in this session.
    ///
    /// Deletions are durable only if this returns `Ok`; an error means the
    /// server may or may not have entered the UPDATE state.
    ///
    /// # Errors
    ///
    /// Returns an error if the server reports a failure in the UPDATE state
    /// or the connection drops before the reply.
    pub async fn quit(mut self) -> Result<()> {
        self.execute_ok(&Command::Quit).await?;
        // The server closes its side; failing to shut ours down changes nothing.
        let _ = self.stream.shutdown().await;
        Ok(())
    }
}

// Common implementation for all states
impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the server greeting text.
    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Returns true if an earlier failure left the stream unusable.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    async fn execute(&mut self, cmd: &Command) -> Result<Status> {
        if self.poisoned {
            return Err(Error::InvalidState(
                "connection unusable after an earlier failure".into(),
            ));
        }

        debug!(command = cmd.name(), "POP3 send");
        let timeout = self.timeout;
        let data = cmd.serialize();

        let result = tokio::time::timeout(timeout, async {
            self.stream.write_command(&data).await?;
            let line = self.stream.read_line().await?;
            parse_status(&line)
        })
        .await;

        self.settle(result)
    }

    async fn execute_ok(&mut self, cmd: &Command) -> Result<Status> {
        let status = self.execute(cmd).await?;
        if status.is_ok() {
            Ok(status)
        } else {
            Err(Error::server(status.code, status.text))
        }
    }

    async fn execute_multiline(&mut self, cmd: &Command) -> Result<Vec<u8>> {
        self.execute_ok(cmd).await?;

        let timeout = self.timeout;
        let result = tokio::time::timeout(timeout, self.stream.read_multiline()).await;
        self.settle(result)
    }

    async fn read_status(&mut self) -> Result<Status> {
        let timeout = self.timeout;
        let result = tokio::time::timeout(timeout, async {
            let line = self.stream.read_line().await?;
            parse_status(&line)
        })
        .await;

        self.settle(result)
    }

    /// Maps a timed-out or failed exchange to an error and poisons the stream
    /// when the framing can no longer be trusted.
    fn settle<T>(
        &mut self,
        result: std::result::Result<Result<T>, tokio::time::error::Elapsed>,
    ) -> Result<T> {
        let result = result.unwrap_or(Err(Error::Timeout(self.timeout)));
        if result
            .as_ref()
            .is_err_and(|e| e.is_fatal_to_connection() || matches!(e, Error::Protocol(_)))
        {
            self.poisoned = true;
        }
        result
    }
}
