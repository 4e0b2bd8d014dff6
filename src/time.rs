//! Timestamp and duration support.
//!
//! Timestamps parse from RFC 3339 (a missing offset is taken as UTC) and
//! are kept in UTC with nanosecond precision. Durations parse from the
//! `1h30m`/`-2.5s`/`250ms` segment notation and format back in the
//! shortest form that round-trips.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike, Utc};

use crate::error::EvalError;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Parses an RFC 3339 timestamp. `2023-01-01T00:00:00` without an offset
/// is accepted and read as UTC; invalid dates are rejected.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, EvalError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    Err(EvalError::InvalidTimestamp { input: input.to_string() })
}

/// Parses a duration written as a sequence of `<number><unit>` segments,
/// with units `ns`, `us`, `ms`, `s`, `m`, `h` and an optional leading
/// sign. Fractional numbers are allowed (`1.5h`). `0` needs no unit.
pub fn parse_duration(input: &str) -> Result<Duration, EvalError> {
    let err = || EvalError::InvalidDuration { input: input.to_string() };

    let mut rest = input;
    let negative = if let Some(stripped) = rest.strip_prefix('-') {
        rest = stripped;
        true
    } else {
        false
    };

    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(err());
    }

    let mut total: i128 = 0;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(err());
        }
        let number: f64 = rest[..digits].parse().map_err(|_| err())?;
        rest = &rest[digits..];

        let (unit_nanos, unit_len) = if rest.starts_with("ns") {
            (1i128, 2)
        } else if rest.starts_with("us") {
            (1_000, 2)
        } else if rest.starts_with("ms") {
            (1_000_000, 2)
        } else if rest.starts_with('s') {
            (NANOS_PER_SEC, 1)
        } else if rest.starts_with('m') {
            (60 * NANOS_PER_SEC, 1)
        } else if rest.starts_with('h') {
            (3600 * NANOS_PER_SEC, 1)
        } else {
            return Err(err());
        };
        rest = &rest[unit_len..];

        let nanos = (number * unit_nanos as f64).round();
        if !nanos.is_finite() {
            return Err(err());
        }
        total = total.checked_add(nanos as i128).ok_or_else(err)?;
    }

    if negative {
        total = -total;
    }
    duration_from_nanos(total).ok_or_else(err)
}

/// Total length in nanoseconds. The i128 result cannot overflow for any
/// representable chrono duration.
pub fn total_nanos(d: Duration) -> i128 {
    d.num_seconds() as i128 * NANOS_PER_SEC + d.subsec_nanos() as i128
}

pub fn duration_from_nanos(nanos: i128) -> Option<Duration> {
    let secs = nanos.div_euclid(NANOS_PER_SEC);
    let subsec = nanos.rem_euclid(NANOS_PER_SEC) as u32;
    Duration::new(i64::try_from(secs).ok()?, subsec)
}

/// Shortest-form rendering in the style of Go's `time.Duration`:
/// `1h30m0.5s`, `90m` formats as `1h30m0s`, sub-second values use the
/// largest fitting unit (`500ms`, `1.5us`, `20ns`), zero is `0s`.
pub fn format_duration(d: Duration) -> String {
    let total = total_nanos(d);
    if total == 0 {
        return "0s".to_string();
    }
    if total < 0 {
        return format!("-{}", format_nanos(total.unsigned_abs()));
    }
    format_nanos(total.unsigned_abs())
}

fn format_nanos(nanos: u128) -> String {
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}us", with_fraction(nanos, 1_000));
    }
    if nanos < NANOS_PER_SEC as u128 {
        return format!("{}ms", with_fraction(nanos, 1_000_000));
    }

    let seconds = nanos / NANOS_PER_SEC as u128;
    let secs_str = with_fraction(nanos, NANOS_PER_SEC as u128);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    // the seconds position, fraction included
    let sec_pos = strip_whole(&secs_str, seconds % 60);

    if hours > 0 {
        format!("{hours}h{minutes}m{sec_pos}s")
    } else if minutes > 0 {
        format!("{minutes}m{sec_pos}s")
    } else {
        format!("{secs_str}s")
    }
}

/// `value/scale` with the fraction trimmed of trailing zeros: 1500/1000
/// renders "1.5", 1000/1000 renders "1".
fn with_fraction(value: u128, scale: u128) -> String {
    let whole = value / scale;
    let frac = value % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let width = scale.ilog10() as usize;
    let frac_str = format!("{frac:0width$}");
    format!("{whole}.{}", frac_str.trim_end_matches('0'))
}

/// Replaces the whole-seconds part of `secs_str` with the in-minute
/// remainder, keeping any fraction.
fn strip_whole(secs_str: &str, remainder: u128) -> String {
    match secs_str.split_once('.') {
        Some((_, frac)) => format!("{remainder}.{frac}"),
        None => remainder.to_string(),
    }
}

/// Timestamp accessor dispatch for `ts.getFullYear()` and friends.
/// All results are UTC civil-time components.
pub fn timestamp_accessor(name: &str, ts: DateTime<Utc>) -> Option<i64> {
    let value = match name {
        "getFullYear" => ts.year() as i64,
        // 0-based, per the CEL standard library
        "getMonth" => ts.month0() as i64,
        "getDate" => ts.day() as i64,
        "getDayOfMonth" => ts.day0() as i64,
        "getDayOfWeek" => ts.weekday().num_days_from_sunday() as i64,
        "getDayOfYear" => (ts.ordinal0()) as i64,
        "getHours" => ts.hour() as i64,
        "getMinutes" => ts.minute() as i64,
        "getSeconds" => ts.second() as i64,
        "getMilliseconds" => (ts.nanosecond() / 1_000_000) as i64,
        _ => return None,
    };
    Some(value)
}

/// Duration accessor dispatch: whole units of the total duration.
pub fn duration_accessor(name: &str, d: Duration) -> Option<i64> {
    let value = match name {
        "getHours" => d.num_hours(),
        "getMinutes" => d.num_minutes(),
        "getSeconds" => d.num_seconds(),
        "getMilliseconds" => d.num_milliseconds(),
        _ => return None,
    };
    Some(value)
}
