//! # terabyebye-pop3
//!
//! An async POP3 client implementing RFC 1939, with RFC 2449 extended
//! response codes.
//!
//! ## Features
//!
//! - **Type-state sessions**: `USER`/`PASS` only in [`Authorization`],
//!   maildrop commands only in [`Transaction`]
//! - **Explicit commit**: deletions marked with `DELE` take effect only when
//!   [`Client::quit`] succeeds; dropping the client discards them
//! - **Per-command timeouts**: a timed-out client is poisoned instead of
//!   reading a desynchronized stream
//! - **TLS support**: implicit TLS (port 995) via rustls
//!
//! ## Quick Start
//!
//! ```ignore
//! use terabyebye_pop3::{Client, connection::connect_tls, DEFAULT_TIMEOUT};
//!
//! #[tokio::main]
//! async fn main() -> terabyebye_pop3::Result<()> {
//!     let stream = connect_tls("pop.mail.yahoo.com", 995, DEFAULT_TIMEOUT).await?;
//!     let client = Client::from_stream(stream, DEFAULT_TIMEOUT).await?;
//!     let mut client = client.login("user@yahoo.com", "app-password").await?;
//!
//!     let stat = client.stat().await?;
//!     let headers = client.top(1, 0).await?;
//!     println!("{} messages, first header block is {} bytes", stat.count, headers.len());
//!
//!     client.dele(1).await?;
//!     client.quit().await?; // commits the deletion
//!     Ok(())
//! }
//! ```
//!
//! ## Session States
//!
//! ```text
//! ┌───────────────┐  login()  ┌─────────────┐  quit()  ┌────────┐
//! │ Authorization │ ────────→ │ Transaction │ ───────→ │ Update │
//! └───────────────┘           └─────────────┘          └────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{Authorization, Client, DEFAULT_TIMEOUT, Pop3Stream, Transaction};
pub use error::{Error, Result};
pub use types::{MailboxStat, ResponseCode, Status};
