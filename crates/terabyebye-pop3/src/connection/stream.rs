//! Transport for POP3 sessions: plain TCP or implicit TLS.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::{Error, Result};

/// A connected POP3 transport.
pub enum Pop3Stream {
    /// Unencrypted TCP, for port 110 or local test servers.
    Plain(TcpStream),
    /// TLS over TCP.
    Tls(Box<TlsStream<TcpStream>>),
}

/// Forwards a poll call to whichever transport is inside.
macro_rules! forward {
    ($this:expr, $method:ident ( $($arg:expr),* )) => {
        match $this.get_mut() {
            Pop3Stream::Plain(tcp) => Pin::new(tcp).$method($($arg),*),
            Pop3Stream::Tls(tls) => Pin::new(tls.as_mut()).$method($($arg),*),
        }
    };
}

impl Pop3Stream {
    /// Returns true for a TLS transport.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl std::fmt::Debug for Pop3Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.is_tls() { "Pop3Stream::Tls" } else { "Pop3Stream::Plain" })
    }
}

impl AsyncRead for Pop3Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        forward!(self, poll_read(cx, buf))
    }
}

impl AsyncWrite for Pop3Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        forward!(self, poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        forward!(self, poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        forward!(self, poll_shutdown(cx))
    }
}

/// TLS connector trusting the Mozilla root set from `webpki-roots`.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Opens an implicit-TLS session, usually on port 995.
///
/// `timeout` covers the TCP connect and the handshake together.
pub async fn connect_tls(host: &str, port: u16, timeout: Duration) -> Result<Pop3Stream> {
    let server_name = ServerName::try_from(host.to_string())?;
    within(timeout, async {
        let tcp = TcpStream::connect((host, port)).await?;
        let tls = create_tls_connector().connect(server_name, tcp).await?;
        Ok(Pop3Stream::Tls(Box::new(tls)))
    })
    .await
}

/// Opens an unencrypted session.
pub async fn connect_plain(host: &str, port: u16, timeout: Duration) -> Result<Pop3Stream> {
    within(timeout, async {
        Ok(Pop3Stream::Plain(TcpStream::connect((host, port)).await?))
    })
    .await
}

async fn within<T>(timeout: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or(Err(Error::Timeout(timeout)))
}
