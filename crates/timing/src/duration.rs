//! Duration grammar
//!
//! Parses compact duration strings like `90s`, `1h30m`, or `2d` into a
//! [`std::time::Duration`]. Units are seconds, minutes, hours, and days
//! (`d` = 24h); a component without a unit means seconds. Matching is
//! case-insensitive and the whole string must parse - `1d 14h` with
//! whitespace is rejected.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// Error returned for strings outside the duration grammar.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration: {0}")]
pub struct DurationError(pub String);

static RE_FULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d+[smhd]?)+$").expect("duration grammar"));

static RE_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)([smhd]?)").expect("duration component"));

/// Parse a duration string, summing all components.
///
/// `parse("1h30m")`, `parse("90m")`, and `parse("5400s")` are equal.
pub fn parse(input: &str) -> Result<Duration, DurationError> {
    if input.is_empty() || !RE_FULL.is_match(input) {
        return Err(DurationError(input.to_string()));
    }

    let mut total = Duration::ZERO;
    for caps in RE_PART.captures_iter(input) {
        let value: u64 = caps[1]
            .parse()
            .map_err(|_| DurationError(input.to_string()))?;

        let unit = match caps[2].to_ascii_lowercase().as_str() {
            "" | "s" => 1,
            "m" => 60,
            "h" => 3600,
            "d" => 86400,
            _ => return Err(DurationError(input.to_string())),
        };

        total += Duration::from_secs(value * unit);
    }

    Ok(total)
}

/// Whether the string parses cleanly under the duration grammar.
pub fn matches(input: &str) -> bool {
    parse(input).is_ok()
}

#[cfg(test)]
#[path = "duration_test.rs"]
mod duration_test;
