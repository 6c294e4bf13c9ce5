//! Deletion cutoffs.
//!
//! A cutoff is resolved once per run into a [`CutoffWindow`]: messages dated
//! inside `[start, end)` are deleted. Comparisons happen in UTC, so a message
//! dated exactly at a bound is on the kept side of `end`.

use std::fmt;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use crate::error::{Error, Result};

/// What to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    /// Everything dated before midnight UTC of this day.
    Before(NaiveDate),
    /// Everything dated within these calendar years, inclusive.
    YearRange {
        /// First year deleted.
        start: i32,
        /// Last year deleted.
        end: i32,
    },
    /// Everything older than this many years (365 days each) before now.
    OlderThanYears(u32),
}

/// Half-open date window `[start, end)` of messages to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutoffWindow {
    /// Inclusive lower bound; `None` means from the first message.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub end: DateTime<Utc>,
}

impl CutoffWindow {
    /// Returns true if a message with this date falls in the window.
    #[must_use]
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| date >= s) && date < self.end
    }
}

impl Cutoff {
    /// Parses a cutoff date in `DD-Mon-YYYY` (`01-Jan-2015`) or ISO
    /// `YYYY-MM-DD` form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if neither form matches.
    pub fn parse_date(s: &str) -> Result<NaiveDate> {
        let s = s.trim();
        NaiveDate::parse_from_str(s, "%d-%b-%Y")
            .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
            .map_err(|_| {
                Error::Config(format!(
                    "invalid cutoff date '{s}' (expected DD-Mon-YYYY or YYYY-MM-DD)"
                ))
            })
    }

    /// Parses `"2009-2015"` or a single year `"2015"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed or reversed ranges.
    pub fn parse_year_range(s: &str) -> Result<Self> {
        let s = s.trim();
        let parse = |y: &str| {
            y.trim()
                .parse::<i32>()
                .ok()
                .filter(|y| (1970..=9999).contains(y))
                .ok_or_else(|| Error::Config(format!("invalid year '{y}' in '{s}'")))
        };

        let (start, end) = match s.split_once('-') {
            Some((a, b)) => (parse(a)?, parse(b)?),
            None => {
                let y = parse(s)?;
                (y, y)
            }
        };
        if start > end {
            return Err(Error::Config(format!(
                "year range '{s}' ends before it starts"
            )));
        }
        Ok(Self::YearRange { start, end })
    }

    /// Resolves the cutoff against the current time.
    #[must_use]
    pub fn window(&self, now: DateTime<Utc>) -> CutoffWindow {
        match *self {
            Self::Before(day) => CutoffWindow {
                start: None,
                end: day.and_time(chrono::NaiveTime::MIN).and_utc(),
            },
            Self::YearRange { start, end } => CutoffWindow {
                start: Some(new_year(start)),
                end: new_year(end.saturating_add(1)),
            },
            Self::OlderThanYears(years) => CutoffWindow {
                start: None,
                end: now - TimeDelta::days(i64::from(years) * 365),
            },
        }
    }

    /// Returns true if the window moves with the clock.
    #[must_use]
    pub const fn is_relative(&self) -> bool {
        matches!(self, Self::OlderThanYears(_))
    }
}

fn new_year(year: i32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .unwrap_or(NaiveDate::MAX)
        .and_time(chrono::NaiveTime::MIN)
        .and_utc()
}

impl fmt::Display for Cutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before(day) => write!(f, "before {}", day.format("%d-%b-%Y")),
            Self::YearRange { start, end } if start == end => write!(f, "from {start}"),
            Self::YearRange { start, end } => write!(f, "from {start} through {end}"),
            Self::OlderThanYears(1) => write!(f, "older than 1 year"),
            Self::OlderThanYears(y) => write!(f, "older than {y} years"),
        }
    }
}
