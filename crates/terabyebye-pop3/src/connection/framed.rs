//! Line framing for POP3.
//!
//! Every response line ends in CRLF. A multi-line response runs until a line
//! holding only `.`, with leading dots doubled on the wire.

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::parser::unstuff_line;
use crate::{Error, Result};

const READ_CAPACITY: usize = 16 * 1024;

/// Longest single line accepted from the server.
const LINE_LIMIT: usize = 1024 * 1024;

/// Largest multi-line body accepted from the server.
const BODY_LIMIT: usize = 100 * 1024 * 1024;

/// A POP3 byte stream split into lines.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    outgoing: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_CAPACITY, stream),
            outgoing: BytesMut::with_capacity(256),
        }
    }

    /// Reads one line, terminator included.
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let limit = u64::try_from(LINE_LIMIT + 1).unwrap_or(u64::MAX);
        (&mut self.reader).take(limit).read_until(b'\n', &mut line).await?;

        if line.ends_with(b"\n") {
            return Ok(line);
        }
        if line.len() > LINE_LIMIT {
            return Err(Error::Protocol("line too long".to_string()));
        }
        Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "server closed the connection",
        )))
    }

    /// Reads a multi-line body up to the closing `.` line.
    ///
    /// Dot-stuffing is undone; lines keep their CRLF.
    pub async fn read_multiline(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        while let Some(content) = unstuff_line(&self.read_line().await?) {
            if body.len() + content.len() > BODY_LIMIT {
                return Err(Error::Protocol(format!(
                    "response larger than {BODY_LIMIT} bytes"
                )));
            }
            body.extend_from_slice(content);
        }
        Ok(body)
    }

    /// Sends one command line. A missing CRLF is appended.
    pub async fn write_command(&mut self, line: &[u8]) -> Result<()> {
        self.outgoing.clear();
        self.outgoing.put_slice(line);
        if !line.ends_with(b"\r\n") {
            self.outgoing.put_slice(b"\r\n");
        }

        let stream = self.reader.get_mut();
        stream.write_all(&self.outgoing).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Closes the write half.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.reader.get_mut().shutdown().await?;
        Ok(())
    }
}
