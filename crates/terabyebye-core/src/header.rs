//! Header fetching and parsing.
//!
//! Only three fields matter to the engine: the date that orders the
//! mailbox, and the subject and sender that exclusion filters look at.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

use crate::error::StoreResult;
use crate::store::MailSession;

/// The parsed headers of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeader {
    /// `Date:` normalized to UTC, if present and parseable.
    pub date: Option<DateTime<Utc>>,
    /// Decoded `Subject:`.
    pub subject: String,
    /// Raw `From:` value.
    pub from: String,
}

impl MessageHeader {
    /// Parses a raw header block (as returned by `TOP n 0`).
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let mut header = Self::default();
        let mut seen_date = false;

        for (name, value) in unfold(&text) {
            if name.eq_ignore_ascii_case("date") && !seen_date {
                seen_date = true;
                header.date = parse_date(&value);
            } else if name.eq_ignore_ascii_case("subject") && header.subject.is_empty() {
                header.subject = decode_encoded_words(&value);
            } else if name.eq_ignore_ascii_case("from") && header.from.is_empty() {
                header.from = decode_encoded_words(&value);
            }
        }

        header
    }

    /// The bare sender address: the part inside `<...>` if present,
    /// lowercased.
    #[must_use]
    pub fn sender_address(&self) -> String {
        let from = self.from.trim();
        let addr = match (from.rfind('<'), from.rfind('>')) {
            (Some(open), Some(close)) if open < close => &from[open + 1..close],
            _ => from,
        };
        addr.trim().to_lowercase()
    }
}

/// Fetches and parses the headers of the message at `index`.
///
/// # Errors
///
/// Propagates the store error; a missing date is not an error.
pub async fn fetch_header<S: MailSession>(session: &mut S, index: u32) -> StoreResult<MessageHeader> {
    let raw = session.fetch_header(index).await?;
    Ok(MessageHeader::parse(&raw))
}

/// Splits a header block into unfolded `(name, value)` pairs.
fn unfold(text: &str) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }

        if let Some(field) = current.take() {
            fields.push(field);
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name.trim().to_string(), value.trim().to_string()));
        }
    }

    if let Some(field) = current {
        fields.push(field);
    }
    fields
}

const ZONED_FORMATS: [&str; 4] = [
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%d %b %y %H:%M:%S %z",
    "%d-%b-%Y %H:%M:%S %z",
];

// Dates without a zone are taken as UTC.
const NAIVE_FORMATS: [&str; 3] = ["%d %b %Y %H:%M:%S", "%d %b %Y %H:%M", "%Y-%m-%d %H:%M:%S"];

/// Parses a `Date:` value into UTC.
///
/// Accepts RFC 2822 dates plus the sloppy variants found in old mail:
/// trailing comments, named zones, missing weekday or seconds, missing
/// zone (taken as UTC).
#[must_use]
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let cleaned = strip_comments(value);
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(&cleaned) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&cleaned) {
        return Some(dt.with_timezone(&Utc));
    }

    let without_weekday = match cleaned.split_once(' ') {
        Some((first, rest)) if first.trim_end_matches(',').chars().all(char::is_alphabetic) => {
            rest.to_string()
        }
        _ => cleaned.clone(),
    };
    let normalized = replace_named_zone(&without_weekday);

    for format in ZONED_FORMATS {
        if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(&normalized, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
        .map(|naive| naive.and_utc())
}

fn strip_comments(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut depth = 0usize;
    for c in value.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn replace_named_zone(value: &str) -> String {
    let Some((head, zone)) = value.rsplit_once(' ') else {
        return value.to_string();
    };
    let offset = match zone.to_ascii_uppercase().as_str() {
        "GMT" | "UT" | "UTC" | "Z" => "+0000",
        "EDT" => "-0400",
        "EST" | "CDT" => "-0500",
        "CST" | "MDT" => "-0600",
        "MST" | "PDT" => "-0700",
        "PST" => "-0800",
        _ => return value.to_string(),
    };
    format!("{head} {offset}")
}

/// Decodes RFC 2047 encoded words (`=?charset?B|Q?text?=`) in a header
/// value. Undecodable words are left as they are.
#[must_use]
pub fn decode_encoded_words(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut last_was_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        let Some((decoded, consumed)) = decode_word(candidate) else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            last_was_word = false;
            continue;
        };

        // Whitespace between adjacent encoded words is dropped.
        if !(last_was_word && before.trim().is_empty()) {
            out.push_str(before);
        }
        out.push_str(&decoded);
        rest = &candidate[consumed..];
        last_was_word = true;
    }

    out.push_str(rest);
    out
}

/// Decodes one encoded word at the start of `s`, returning the text and the
/// number of bytes consumed.
fn decode_word(s: &str) -> Option<(String, usize)> {
    let inner = s.strip_prefix("=?")?;
    let (charset, inner) = inner.split_once('?')?;
    let (encoding, inner) = inner.split_once('?')?;
    let end = inner.find("?=")?;
    let text = &inner[..end];
    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => STANDARD
            .decode(text)
            .or_else(|_| STANDARD_NO_PAD.decode(text))
            .ok()?,
        "Q" => decode_q(text)?,
        _ => return None,
    };

    let charset = charset.split('*').next().unwrap_or(charset).to_ascii_lowercase();
    let decoded = match charset.as_str() {
        "iso-8859-1" | "latin1" | "windows-1252" => bytes.iter().map(|&b| char::from(b)).collect(),
        _ => String::from_utf8_lossy(&bytes).into_owned(),
    };
    Some((decoded, consumed))
}

fn decode_q(text: &str) -> Option<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => {
                let hex = text.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    Some(out)
}
