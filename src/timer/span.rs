//! Time spans and instants in their persisted and configured forms.
//!
//! Spans persist as `H:MM:SS` (hours unbounded, sub-seconds truncated).
//! Instants persist as RFC 3339 with an explicit `+00:00` offset. Absent
//! values persist as the literal [`NONE_MARKER`].

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use thiserror::Error;

/// Persisted spelling of an absent value.
pub const NONE_MARKER: &str = "none";

/// Legacy timestamp layouts accepted on load, tried after RFC 3339.
const LEGACY_INSTANT_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"];

/// Why a span string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpanError {
    /// The value denotes a negative span.
    #[error("span cannot be negative: '{0}'")]
    Negative(String),

    /// The value is not a recognised span format.
    #[error("invalid span '{0}': expected seconds, H:MM, H:MM:SS, or a duration like '1h 30m'")]
    Malformed(String),
}

/// Formats a span as `H:MM:SS`, truncating sub-second precision.
#[must_use]
pub fn format_span(span: Duration) -> String {
    let total = span.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}

/// Parses a persisted `H:MM:SS` span.
///
/// # Errors
///
/// Returns [`SpanError::Negative`] for a leading minus sign and
/// [`SpanError::Malformed`] for anything not made of exactly three
/// colon-separated integers.
pub fn parse_span(s: &str) -> Result<Duration, SpanError> {
    let trimmed = s.trim();
    if trimmed.starts_with('-') {
        return Err(SpanError::Negative(s.to_string()));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let [h, m, sec] = parts.as_slice() else {
        return Err(SpanError::Malformed(s.to_string()));
    };

    let malformed = || SpanError::Malformed(s.to_string());
    let field = |v: &str| v.trim().parse::<u64>().map_err(|_| malformed());
    let (hours, minutes, seconds) = (field(h)?, field(m)?, field(sec)?);

    hours
        .checked_mul(3600)
        .and_then(|t| t.checked_add(minutes.checked_mul(60)?))
        .and_then(|t| t.checked_add(seconds))
        .map(Duration::from_secs)
        .ok_or_else(malformed)
}

/// Parses a configured duration.
///
/// Accepts plain seconds (`"90"`), `H:MM`, `H:MM:SS`, and humantime
/// expressions (`"1h 30m"`, `"45s"`). Fractions of a second are dropped,
/// so `"1500ms"` is one second.
///
/// # Errors
///
/// Returns [`SpanError::Negative`] for negative values and
/// [`SpanError::Malformed`] when no accepted form matches.
pub fn parse_config_span(s: &str) -> Result<Duration, SpanError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(SpanError::Malformed(s.to_string()));
    }
    if trimmed.starts_with('-') {
        return Err(SpanError::Negative(s.to_string()));
    }

    if trimmed.contains(':') {
        return match trimmed.split(':').count() {
            2 => parse_span(&format!("{trimmed}:00")),
            _ => parse_span(trimmed),
        }
        .map_err(|_| SpanError::Malformed(s.to_string()));
    }

    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(trimmed)
        .map(whole_span)
        .map_err(|_| SpanError::Malformed(s.to_string()))
}

/// Truncates a span to whole seconds.
#[must_use]
pub const fn whole_span(span: Duration) -> Duration {
    Duration::from_secs(span.as_secs())
}

/// Formats an instant as RFC 3339 with whole seconds and a `+00:00` offset.
#[must_use]
pub fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Parses a persisted instant, accepting RFC 3339 and the legacy
/// `YYYY-MM-DD HH:MM:SS+HH:MM` layout. Returns `None` when nothing matches.
#[must_use]
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(at.with_timezone(&Utc));
    }
    LEGACY_INSTANT_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(trimmed, fmt).ok())
        .map(|at| at.with_timezone(&Utc))
}

/// Returns `true` if the value is the persisted absent marker.
#[must_use]
pub fn is_none_marker(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case(NONE_MARKER)
}

/// Converts a span to a signed delta, saturating on overflow.
#[must_use]
pub fn to_delta(span: Duration) -> TimeDelta {
    TimeDelta::from_std(span).unwrap_or(TimeDelta::MAX)
}

/// Converts a signed delta to a span, clamping negatives to zero.
#[must_use]
pub fn to_span(delta: TimeDelta) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}

/// Truncates an instant to whole seconds.
#[must_use]
pub fn whole_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_span() {
        assert_eq!(format_span(Duration::ZERO), "0:00:00");
        assert_eq!(format_span(Duration::from_secs(7)), "0:00:07");
        assert_eq!(format_span(Duration::from_secs(3661)), "1:01:01");
        assert_eq!(format_span(Duration::from_secs(30 * 3600)), "30:00:00");
    }

    #[test]
    fn test_format_span_truncates_subseconds() {
        assert_eq!(format_span(Duration::from_millis(6999)), "0:00:06");
    }

    #[test]
    fn test_parse_span() {
        assert_eq!(parse_span("0:00:07"), Ok(Duration::from_secs(7)));
        assert_eq!(parse_span("1:01:01"), Ok(Duration::from_secs(3661)));
        assert_eq!(parse_span("48:00:00"), Ok(Duration::from_secs(48 * 3600)));
    }

    #[test]
    fn test_parse_span_rejects_malformed() {
        assert!(matches!(parse_span("none"), Err(SpanError::Malformed(_))));
        assert!(matches!(parse_span("1:00"), Err(SpanError::Malformed(_))));
        assert!(matches!(parse_span("a:b:c"), Err(SpanError::Malformed(_))));
        assert!(matches!(parse_span(""), Err(SpanError::Malformed(_))));
        assert!(matches!(parse_span("1:2:3:4"), Err(SpanError::Malformed(_))));
    }

    #[test]
    fn test_parse_span_rejects_negative() {
        assert!(matches!(parse_span("-0:00:05"), Err(SpanError::Negative(_))));
    }

    #[test]
    fn test_parse_config_span_forms() {
        assert_eq!(parse_config_span("90"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_config_span("0:05"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_config_span("1:00:30"), Ok(Duration::from_secs(3630)));
        assert_eq!(parse_config_span("1h 30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_config_span("45s"), Ok(Duration::from_secs(45)));
    }

    #[test]
    fn test_parse_config_span_drops_subseconds() {
        assert_eq!(parse_config_span("1500ms"), Ok(Duration::from_secs(1)));
        assert_eq!(parse_config_span("2s 999ms"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_config_span("250ms"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_parse_config_span_errors() {
        assert!(matches!(
            parse_config_span("-10"),
            Err(SpanError::Negative(_))
        ));
        assert!(matches!(
            parse_config_span("-1:00:00"),
            Err(SpanError::Negative(_))
        ));
        assert!(matches!(
            parse_config_span("soon"),
            Err(SpanError::Malformed(_))
        ));
        assert!(matches!(parse_config_span("  "), Err(SpanError::Malformed(_))));
    }

    #[test]
    fn test_format_instant_uses_offset_not_z() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert_eq!(format_instant(at), "2026-10-18T09:30:00+00:00");
    }

    #[test]
    fn test_parse_instant_rfc3339_with_foreign_offset() {
        let at = parse_instant("2026-10-18T11:30:00+02:00").unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_instant_legacy_layouts() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert_eq!(parse_instant("2026-10-18 09:30:00+00:00"), Some(expected));
        assert_eq!(parse_instant("2026-10-18 10:30:00+0100"), Some(expected));
    }

    #[test]
    fn test_parse_instant_garbage() {
        assert_eq!(parse_instant("none"), None);
        assert_eq!(parse_instant("yesterday"), None);
        assert_eq!(parse_instant("2026-10-18"), None);
    }

    #[test]
    fn test_none_marker() {
        assert!(is_none_marker("none"));
        assert!(is_none_marker("None"));
        assert!(!is_none_marker("0:00:00"));
    }

    #[test]
    fn test_to_span_clamps_negative() {
        assert_eq!(to_span(TimeDelta::seconds(-5)), Duration::ZERO);
        assert_eq!(to_span(TimeDelta::seconds(5)), Duration::from_secs(5));
    }

    #[test]
    fn test_whole_seconds() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
            + TimeDelta::milliseconds(750);
        assert_eq!(
            whole_seconds(at),
            Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
        );
    }
}
