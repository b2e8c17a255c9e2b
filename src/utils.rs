//! Utility functions for the matchmaking director

use crate::error::{MatchmakingError, Result};
use chrono::Utc;
use std::time::Duration;

/// Nanoseconds since the Unix epoch, used to keep generated ids unique across runs
pub fn unix_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Parse a duration string such as `5s`, `250ms`, `1m30s` or `1.5h`.
///
/// Units: `ns`, `us`, `µs`, `ms`, `s`, `m`, `h`. A bare `0` is accepted.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let invalid = |reason: &str| -> anyhow::Error {
        MatchmakingError::InvalidInterval {
            value: value.to_string(),
            reason: reason.to_string(),
        }
        .into()
    };

    let input = value.trim();
    if input.is_empty() {
        return Err(invalid("empty duration"));
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.starts_with('-') {
        return Err(invalid("negative durations are not allowed"));
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = input.strip_prefix('+').unwrap_or(input);

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid("expected a number"));
        }
        let number: f64 = rest[..number_len]
            .parse()
            .map_err(|_| invalid("malformed number"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" => 1_000_000_000.0,
            "m" => 60.0 * 1_000_000_000.0,
            "h" => 3_600.0 * 1_000_000_000.0,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit")),
        };
        rest = &rest[unit_len..];

        total_nanos += number * unit_nanos;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid("duration overflows"));
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Render a duration the way it would be written in configuration
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}ms", millis)
    }
}
