//! Timestamp layouts
//!
//! Converts a text timestamp into milliseconds since the Unix epoch. Named
//! layouts cover the common log formats; anything else is taken as a custom
//! strftime layout. Layouts without a zone are read as UTC.
//!
//! Layouts that carry no year (like `stamp`) get the year inferred from the
//! wall clock, with the New-Year rule: a December timestamp seen in January
//! belongs to the previous year.

use chrono::format::{Parsed, StrftimeItems, parse};
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Common log format used by web servers.
const LAYOUT_COMMON: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Year-less syslog-style stamp, e.g. `Jan  2 15:04:05`.
const LAYOUT_STAMP: &str = "%b %e %H:%M:%S";

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("invalid timestamp layout '{0}'")]
    InvalidLayout(String),

    #[error("invalid timestamp '{value}' ({layout})")]
    InvalidTimestamp { value: String, layout: String },
}

/// Declarative timestamp format, as it appears in an agent's schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimestampFormat {
    /// Layout name or custom strftime layout.
    ///
    /// Named: "rfc3339" (default), "rfc3339nano", "common", "stamp", "unix".
    #[serde(default)]
    pub format: String,
}

impl TimestampFormat {
    /// Resolve the format into a parser, validating custom layouts.
    pub fn compile(&self) -> Result<TimestampParser, TimestampError> {
        let layout = match self.format.to_lowercase().as_str() {
            "" | "rfc3339" | "rfc3339nano" => Layout::Rfc3339,
            "common" => Layout::Strftime(LAYOUT_COMMON.to_string()),
            "stamp" => Layout::Strftime(LAYOUT_STAMP.to_string()),
            "unix" => Layout::Unix,
            _ => {
                // Custom strftime layout; reject malformed ones up front.
                StrftimeItems::new(&self.format)
                    .parse()
                    .map_err(|_| TimestampError::InvalidLayout(self.format.clone()))?;
                Layout::Strftime(self.format.clone())
            }
        };

        Ok(TimestampParser { layout })
    }
}

#[derive(Debug, Clone)]
enum Layout {
    Rfc3339,
    Unix,
    Strftime(String),
}

/// Compiled timestamp parser.
#[derive(Debug, Clone)]
pub struct TimestampParser {
    layout: Layout,
}

impl TimestampParser {
    /// Convert a timestamp string to epoch milliseconds.
    pub fn convert(&self, source: &str) -> Result<i64, TimestampError> {
        self.convert_at(source, Utc::now())
    }

    /// Like [`convert`](Self::convert), with the wall clock injected so the
    /// year-inference path is testable.
    pub fn convert_at(&self, source: &str, now: DateTime<Utc>) -> Result<i64, TimestampError> {
        match &self.layout {
            Layout::Rfc3339 => DateTime::parse_from_rfc3339(source)
                .map(|dt| dt.timestamp_millis())
                .map_err(|_| self.invalid(source)),
            Layout::Unix => self.parse_unix(source),
            Layout::Strftime(layout) => self.parse_strftime(layout, source, now),
        }
    }

    fn invalid(&self, source: &str) -> TimestampError {
        let layout = match &self.layout {
            Layout::Rfc3339 => "rfc3339".to_string(),
            Layout::Unix => "unix".to_string(),
            Layout::Strftime(l) => l.clone(),
        };
        TimestampError::InvalidTimestamp {
            value: source.to_string(),
            layout,
        }
    }

    /// Unix epoch seconds with an optional fraction. The fraction is read to
    /// millisecond precision: the first three digits, missing digits zero.
    fn parse_unix(&self, source: &str) -> Result<i64, TimestampError> {
        let (sec, frac) = match source.split_once('.') {
            Some((sec, frac)) => (sec, Some(frac)),
            None => (source, None),
        };

        let seconds: i64 = sec.parse().map_err(|_| self.invalid(source))?;
        let mut milliseconds = seconds * 1000;

        if let Some(frac) = frac {
            let digits = &frac.as_bytes()[..frac.len().min(3)];
            if !digits.iter().all(|b| b.is_ascii_digit()) {
                return Err(self.invalid(source));
            }

            let mut multiply = 100;
            for b in digits {
                milliseconds += i64::from(b - b'0') * multiply;
                multiply /= 10;
            }
        }

        Ok(milliseconds)
    }

    fn parse_strftime(
        &self,
        layout: &str,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, TimestampError> {
        let mut parsed = Parsed::new();
        parse(&mut parsed, source, StrftimeItems::new(layout)).map_err(|_| self.invalid(source))?;

        if parsed.year().is_none() {
            let year = if parsed.month() == Some(12) && now.month() == 1 {
                now.year() - 1
            } else {
                now.year()
            };
            parsed
                .set_year(i64::from(year))
                .map_err(|_| self.invalid(source))?;
        }

        let offset = parsed.offset().unwrap_or(0);
        let naive = parsed
            .to_naive_datetime_with_offset(offset)
            .map_err(|_| self.invalid(source))?;

        Ok(naive.and_utc().timestamp_millis() - i64::from(offset) * 1000)
    }
}

#[cfg(test)]
#[path = "timestamp_test.rs"]
mod timestamp_test;
