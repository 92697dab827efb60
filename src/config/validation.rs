//! Configuration validation
//!
//! Turns raw [`TimerConfig`] entries into [`TimerSettings`], collecting
//! every issue instead of stopping at the first one. The same rules apply
//! to the configuration file, to dynamic creation, and to partial updates.

use crate::config::loader::ConfigLimits;
use crate::config::schema::{SpanValue, TimerConfig, TimerDefinition, TimerSettings, TimersFile};
use crate::error::{ConfigError, Severity, ValidationIssue};
use crate::timer::TimerId;
use crate::timer::span::SpanError;

use std::time::Duration;

/// Names longer than this draw a warning.
const NAME_WARN_LENGTH: usize = 100;

// ============================================================================
// Public API
// ============================================================================

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,

    /// Definitions that validated cleanly, in file order.
    pub timers: Vec<TimerDefinition>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a whole configuration file.
    pub fn validate(&mut self, file: &TimersFile, limits: &ConfigLimits) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        if file.timer.len() > limits.max_timers {
            self.add_error(
                "timer",
                &format!(
                    "{} timers defined, at most {} allowed",
                    file.timer.len(),
                    limits.max_timers
                ),
            );
        }

        let mut timers = Vec::with_capacity(file.timer.len());
        for (id, entry) in &file.timer {
            let path = format!("timer.{id}");
            self.validate_id(id, &path);

            let id = TimerId::new(id.as_str());
            let base = TimerSettings::with_defaults(&id);
            let config = entry.clone().unwrap_or_default();
            if let Some(settings) = self.apply(&path, base, &config) {
                timers.push(TimerDefinition { id, settings });
            }
        }

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
            timers,
        }
    }

    /// Applies `update` on top of `base`, validating each present field.
    ///
    /// Returns `None` if any error was recorded for this entry.
    fn apply(
        &mut self,
        path: &str,
        base: TimerSettings,
        update: &TimerConfig,
    ) -> Option<TimerSettings> {
        let before = self.errors.len();
        let mut settings = base;

        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                self.add_error(&format!("{path}.name"), "name cannot be empty");
            } else {
                if name.chars().count() > NAME_WARN_LENGTH {
                    self.add_warning(
                        &format!("{path}.name"),
                        &format!("name is longer than {NAME_WARN_LENGTH} characters"),
                    );
                }
                settings.name.clone_from(name);
            }
        }

        if let Some(icon) = &update.icon {
            if is_valid_icon(icon) {
                settings.icon = Some(icon.clone());
            } else {
                self.add_error(
                    &format!("{path}.icon"),
                    &format!("invalid icon '{icon}', expected 'prefix:name'"),
                );
            }
        }

        if let Some(value) = &update.duration
            && let Some(span) = self.span(value, &format!("{path}.duration"))
        {
            settings.duration = span;
        }

        if let Some(restore) = update.restore {
            settings.restore = restore;
        }

        if let Some(value) = &update.restore_grace_period
            && let Some(span) = self.span(value, &format!("{path}.restore_grace_period"))
        {
            settings.restore_grace_period = span;
        }

        if !settings.restore && settings.restore_grace_period > Duration::ZERO {
            self.add_warning(
                &format!("{path}.restore_grace_period"),
                "grace period has no effect while restore is disabled",
            );
        }

        (self.errors.len() == before).then_some(settings)
    }

    fn span(&mut self, value: &SpanValue, path: &str) -> Option<Duration> {
        match value.parse() {
            Ok(span) => Some(span),
            Err(SpanError::Negative(v)) => {
                self.add_error(path, &format!("span cannot be negative (got '{v}')"));
                None
            }
            Err(SpanError::Malformed(v)) => {
                self.add_error(
                    path,
                    &format!(
                        "invalid span '{v}', expected seconds, H:MM, H:MM:SS, or e.g. '1h 30m'"
                    ),
                );
                None
            }
        }
    }

    fn validate_id(&mut self, id: &str, path: &str) {
        if !is_slug(id) {
            self.add_error(
                path,
                &format!(
                    "invalid timer id '{id}': use lowercase letters, digits, and single underscores"
                ),
            );
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Adds an error to the collection.
    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    /// Adds a warning to the collection.
    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}

// ============================================================================
// Single-timer helpers
// ============================================================================

/// Validates `update` against `base` for one timer.
///
/// Used for dynamic creation (with defaults as `base`) and for partial
/// updates (with the current settings as `base`). Warnings are returned
/// alongside the settings.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] listing every problem found.
pub fn merge(
    id: &TimerId,
    base: &TimerSettings,
    update: &TimerConfig,
) -> Result<(TimerSettings, Vec<ValidationIssue>), ConfigError> {
    let mut validator = Validator::new();
    validator.validate_id(id.as_str(), id.as_str());
    let merged = validator.apply(id.as_str(), base.clone(), update);
    match merged {
        Some(settings) if validator.errors.is_empty() => Ok((settings, validator.warnings)),
        _ => Err(ConfigError::ValidationError {
            path: id.to_string(),
            errors: validator.errors,
        }),
    }
}

/// Returns `true` if `s` is a valid timer id.
///
/// Ids are non-empty, use `[a-z0-9_]`, and neither start nor end with an
/// underscore nor contain two in a row.
#[must_use]
pub fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        && !s.starts_with('_')
        && !s.ends_with('_')
        && !s.contains("__")
}

/// Converts arbitrary text into a timer id candidate.
///
/// Runs of characters outside `[a-z0-9]` collapse into one underscore.
/// Returns an empty string if nothing usable remains.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

fn is_valid_icon(icon: &str) -> bool {
    icon.split_once(':')
        .is_some_and(|(prefix, name)| !prefix.is_empty() && !name.is_empty() && !icon.contains(' '))
}

// ============================================================================
// Tests
// ============================================================================
