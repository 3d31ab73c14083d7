use chrono::{DateTime, Duration, Utc};

use crate::error::{AppError, Result};

/// Parses a relative duration such as `15m`, `1s`, `2 hours` or `500ms`.
pub fn parse_duration(expr: &str) -> Result<Duration> {
    let expr = expr.trim();
    let split = expr
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(expr.len());

    let (amount, unit) = expr.split_at(split);
    let amount: f64 = amount
        .parse()
        .map_err(|_| AppError::InvalidArgument(format!("Invalid relative time '{}'", expr)))?;

    let millis_per_unit: f64 = match unit.trim().to_ascii_lowercase().as_str() {
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        "w" | "week" | "weeks" => 604_800_000.0,
        "y" | "yr" | "yrs" | "year" | "years" => 31_557_600_000.0,
        other => {
            return Err(AppError::InvalidArgument(format!(
                "Unknown time unit '{}' in '{}'",
                other, expr
            )));
        }
    };

    let millis = amount * millis_per_unit;
    if !millis.is_finite() || millis > i64::MAX as f64 {
        return Err(AppError::InvalidArgument(format!("Relative time '{}' is out of range", expr)));
    }

    Ok(Duration::milliseconds(millis.round() as i64))
}

/// Resolves a relative expression to an absolute instant from now.
pub fn parse_relative_time(expr: &str) -> Result<DateTime<Utc>> {
    Utc::now()
        .checked_add_signed(parse_duration(expr)?)
        .ok_or_else(|| AppError::InvalidArgument(format!("Relative time '{}' is out of range", expr)))
}

/// Parses an absolute date string (RFC 3339 or RFC 2822).
pub fn parse_absolute_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .or_else(|_| DateTime::parse_from_rfc2822(value.trim()))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_long_units() {
        assert_eq!(parse_duration("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_duration("15 minutes").unwrap(), Duration::minutes(15));
        assert_eq!(parse_duration("1s").unwrap(), Duration::seconds(1));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::milliseconds(250));
        assert_eq!(parse_duration("2d").unwrap(), Duration::days(2));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration("1w").unwrap(), Duration::weeks(1));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("10 fortnights").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn relative_time_is_in_the_future() {
        assert!(parse_relative_time("1m").unwrap() > Utc::now());
    }

    #[test]
    fn absolute_formats() {
        assert!(parse_absolute_time("2030-01-01T00:00:00Z").is_some());
        assert!(parse_absolute_time("Tue, 1 Jul 2031 10:52:37 GMT").is_some());
        assert!(parse_absolute_time("15m").is_none());
    }
}
