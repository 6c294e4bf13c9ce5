//! POP3 response parser.

use crate::error::{Error, Result};
use crate::types::{MailboxStat, ResponseCode, Status};

/// Parses a status line.
///
/// POP3 status lines start with an indicator and an optional RFC 2449
/// response code:
/// - `+OK 2 320\r\n`
/// - `-ERR [IN-USE] maildrop already locked\r\n`
///
/// # Errors
///
/// Returns an error if the line starts with neither `+OK` nor `-ERR`.
pub fn parse_status(line: &[u8]) -> Result<Status> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);

    let (ok, rest) = if let Some(rest) = strip_indicator(line, "+OK") {
        (true, rest)
    } else if let Some(rest) = strip_indicator(line, "-ERR") {
        (false, rest)
    } else {
        return Err(Error::Protocol(format!("Invalid status line: {line}")));
    };

    let rest = rest.trim_start();
    let (code, text) = match rest.strip_prefix('[').and_then(|r| r.split_once(']')) {
        Some((code, text)) => (Some(ResponseCode::parse(code)), text.trim_start()),
        None => (None, rest),
    };

    Ok(Status {
        ok,
        code,
        text: text.to_string(),
    })
}

/// Strips a status indicator, requiring a separator or end of line after it.
fn strip_indicator<'a>(line: &'a str, indicator: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(indicator)?;
    if rest.is_empty() || rest.starts_with(' ') {
        Some(rest)
    } else {
        None
    }
}

/// Parses the text of a positive `STAT` response (`<count> <size>`).
///
/// # Errors
///
/// Returns an error if either number is missing or malformed.
pub fn parse_stat(text: &str) -> Result<MailboxStat> {
    let mut parts = text.split_whitespace();
    let count = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| Error::Protocol(format!("Malformed STAT response: {text}")))?;
    let size = parts
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| Error::Protocol(format!("Malformed STAT response: {text}")))?;

    Ok(MailboxStat { count, size })
}

/// Removes the byte-stuffing from one line of a multi-line response.
///
/// Returns `None` for the terminating `.` line.
#[must_use]
pub fn unstuff_line(line: &[u8]) -> Option<&[u8]> {
    let content = line.strip_suffix(b"\r\n").unwrap_or(line);
    if content == b"." {
        return None;
    }
    Some(line.strip_prefix(b".").unwrap_or(line))
}
