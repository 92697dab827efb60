//! Configuration schema
//!
//! Raw, serde-facing shapes of the timer configuration file and of
//! dynamic create/update requests, plus the validated [`TimerSettings`]
//! the timer core consumes.
//!
//! ```yaml
//! timer:
//!   kitchen:
//!     name: Kitchen
//!     icon: mdi:stove
//!     duration: "0:10:00"
//!     restore: true
//!     restore_grace_period: 30s
//!   laundry:            # empty entry, all defaults
//! ```

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::timer::TimerId;
use crate::timer::span::{SpanError, format_span, parse_config_span};

/// Default nominal duration.
pub const DEFAULT_DURATION: Duration = Duration::ZERO;

/// Restore is enabled unless configured otherwise.
pub const DEFAULT_RESTORE: bool = true;

/// Default tolerated overrun on restore.
pub const DEFAULT_RESTORE_GRACE_PERIOD: Duration = Duration::ZERO;

/// Root of a timer configuration file.
///
/// Unknown top-level keys are ignored so the timer section can live in a
/// larger file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimersFile {
    /// Timer id → definition. `null` entries take all defaults.
    #[serde(default)]
    pub timer: IndexMap<String, Option<TimerConfig>>,
}

/// A span as written by a user: plain seconds or text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpanValue {
    /// Whole seconds (may be negative, which validation rejects).
    Seconds(i64),
    /// `H:MM`, `H:MM:SS`, or a humantime expression.
    Text(String),
}

impl SpanValue {
    /// Parses the value into a non-negative span.
    ///
    /// # Errors
    ///
    /// Returns [`SpanError::Negative`] or [`SpanError::Malformed`].
    pub fn parse(&self) -> Result<Duration, SpanError> {
        match self {
            Self::Seconds(n) => u64::try_from(*n)
                .map(Duration::from_secs)
                .map_err(|_| SpanError::Negative(n.to_string())),
            Self::Text(s) => parse_config_span(s),
        }
    }
}

impl std::fmt::Display for SpanValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seconds(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<Duration> for SpanValue {
    fn from(span: Duration) -> Self {
        Self::Text(format_span(span))
    }
}

/// Timer definition as configured, or a partial update to one.
///
/// Every field is optional: a definition fills gaps with defaults, an
/// update leaves absent fields unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimerConfig {
    /// Display name; defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Display icon, `prefix:name` (e.g. `mdi:timer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Nominal countdown length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<SpanValue>,

    /// Whether in-flight state survives a restart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore: Option<bool>,

    /// Maximum tolerated overrun when restoring an active timer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_grace_period: Option<SpanValue>,
}

/// Validated timer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSettings {
    /// Display name (never empty).
    pub name: String,
    /// Display icon.
    pub icon: Option<String>,
    /// Nominal countdown length.
    pub duration: Duration,
    /// Whether restore is enabled.
    pub restore: bool,
    /// Tolerated overrun on restore.
    pub restore_grace_period: Duration,
}

impl TimerSettings {
    /// Settings with every default applied and the id as name.
    #[must_use]
    pub fn with_defaults(id: &TimerId) -> Self {
        Self {
            name: id.to_string(),
            icon: None,
            duration: DEFAULT_DURATION,
            restore: DEFAULT_RESTORE,
            restore_grace_period: DEFAULT_RESTORE_GRACE_PERIOD,
        }
    }
}

/// A validated timer definition from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerDefinition {
    /// Timer id (the key in the `timer:` map).
    pub id: TimerId,
    /// Validated settings.
    pub settings: TimerSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_with_null_entry() {
        let yaml = r#"
timer:
  kitchen:
    name: Kitchen
    duration: "0:10:00"
    restore_grace_period: 30
  laundry:
other_domain:
  anything: goes
"#;
        let file: TimersFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.timer.len(), 2);
        let kitchen = file.timer["kitchen"].as_ref().unwrap();
        assert_eq!(kitchen.name.as_deref(), Some("Kitchen"));
        assert_eq!(
            kitchen.duration,
            Some(SpanValue::Text("0:10:00".to_string()))
        );
        assert_eq!(kitchen.restore_grace_period, Some(SpanValue::Seconds(30)));
        assert!(file.timer["laundry"].is_none());
    }

    #[test]
    fn test_file_preserves_order() {
        let yaml = "timer:\n  zeta: {}\n  alpha: {}\n  mid: {}\n";
        let file: TimersFile = serde_yaml::from_str(yaml).unwrap();
        let ids: Vec<&str> = file.timer.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_unknown_timer_field_rejected() {
        let yaml = "timer:\n  a:\n    durration: 10\n";
        assert!(serde_yaml::from_str::<TimersFile>(yaml).is_err());
    }

    #[test]
    fn test_span_value_parse() {
        assert_eq!(SpanValue::Seconds(90).parse(), Ok(Duration::from_secs(90)));
        assert!(matches!(
            SpanValue::Seconds(-1).parse(),
            Err(SpanError::Negative(_))
        ));
        assert_eq!(
            SpanValue::Text("2m".to_string()).parse(),
            Ok(Duration::from_secs(120))
        );
    }

    #[test]
    fn test_span_value_from_duration() {
        assert_eq!(
            SpanValue::from(Duration::from_secs(61)),
            SpanValue::Text("0:01:01".to_string())
        );
    }

    #[test]
    fn test_defaults() {
        let s = TimerSettings::with_defaults(&TimerId::new("egg"));
        assert_eq!(s.name, "egg");
        assert_eq!(s.duration, Duration::ZERO);
        assert!(s.restore);
        assert_eq!(s.restore_grace_period, Duration::ZERO);
    }
}
