//! Line-oriented control protocol.
//!
//! Each input line is one command, split shell-style and parsed with clap:
//!
//! ```text
//! start <id> [duration]
//! pause <id> | cancel <id> | finish <id>
//! status [id]
//! create <name> [duration] [--icon I] [--no-restore] [--grace D]
//! update <id> key=value...
//! delete <id>
//! reload
//! ```
//!
//! Every command gets exactly one JSON reply line: `{"ok":true,...}` or
//! `{"ok":false,"error":"..."}`. Blank lines and `#` comments get none.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{ConfigLoader, SpanValue, TimerConfig};
use crate::error::{ControlError, CountdownError, RegistryError};
use crate::registry::TimerRegistry;
use crate::timer::TimerId;
use crate::timer::span::parse_config_span;

/// Command words, in help order.
pub const COMMANDS: [&str; 9] = [
    "start", "pause", "cancel", "finish", "status", "create", "update", "delete", "reload",
];

/// Keys accepted by `update`.
const UPDATE_KEYS: [&str; 6] = [
    "name",
    "icon",
    "duration",
    "restore",
    "restore_grace_period",
    "grace",
];

/// Maximum edit distance for a "did you mean" hint.
const MAX_SUGGESTION_DISTANCE: usize = 3;

// ============================================================================
// Parsing
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "countdown",
    no_binary_name = true,
    disable_help_flag = true,
    disable_help_subcommand = true,
    disable_version_flag = true
)]
struct ControlLine {
    #[command(subcommand)]
    command: Command,
}

/// A parsed control command.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start or restart a timer, optionally with a new duration.
    Start {
        /// Timer id.
        id: String,
        /// Seconds, H:MM, H:MM:SS, or e.g. `90s`.
        #[arg(allow_hyphen_values = true)]
        duration: Option<String>,
    },

    /// Pause an active timer.
    Pause {
        /// Timer id.
        id: String,
    },

    /// Reset a timer to idle.
    Cancel {
        /// Timer id.
        id: String,
    },

    /// Complete an active timer now.
    Finish {
        /// Timer id.
        id: String,
    },

    /// Show one timer, or all of them.
    Status {
        /// Timer id.
        id: Option<String>,
    },

    /// Create an editable timer.
    Create {
        /// Display name; the id is derived from it.
        name: String,
        /// Nominal duration.
        #[arg(allow_hyphen_values = true)]
        duration: Option<String>,
        /// Display icon (`prefix:name`).
        #[arg(long)]
        icon: Option<String>,
        /// Do not restore state across restarts.
        #[arg(long)]
        no_restore: bool,
        /// Restore grace period.
        #[arg(long, allow_hyphen_values = true)]
        grace: Option<String>,
    },

    /// Change settings of an editable timer.
    Update {
        /// Timer id.
        id: String,
        /// `key=value` pairs.
        #[arg(required = true)]
        settings: Vec<String>,
    },

    /// Remove an editable timer.
    Delete {
        /// Timer id.
        id: String,
    },

    /// Re-read the configuration file.
    Reload,
}

/// Parses one input line. Returns `Ok(None)` for blank and comment lines.
///
/// # Errors
///
/// Returns [`ControlError`] for unbalanced quotes, unknown command words
/// (with a suggestion when one is close), or bad arguments.
pub fn parse(line: &str) -> Result<Option<Command>, ControlError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let args = shlex::split(trimmed)
        .ok_or_else(|| ControlError::Malformed("unbalanced quotes".to_string()))?;
    let Some(word) = args.first() else {
        return Ok(None);
    };
    if !COMMANDS.contains(&word.as_str()) {
        return Err(ControlError::UnknownCommand {
            command: word.clone(),
            suggestion: suggest(word, &COMMANDS),
        });
    }

    ControlLine::try_parse_from(args)
        .map(|parsed| Some(parsed.command))
        .map_err(|e| ControlError::Usage(first_line(&e.to_string())))
}

/// Returns the closest candidate within [`MAX_SUGGESTION_DISTANCE`].
fn suggest(input: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(|c| (*c, strsim::damerau_levenshtein(input, c)))
        .filter(|(_, dist)| *dist <= MAX_SUGGESTION_DISTANCE)
        .min_by_key(|(_, dist)| *dist)
        .map(|(c, _)| c.to_string())
}

fn first_line(text: &str) -> String {
    text.lines()
        .next()
        .unwrap_or_default()
        .trim_start_matches("error: ")
        .to_string()
}

/// Turns `key=value` pairs into a partial configuration.
fn parse_settings(pairs: &[String]) -> Result<TimerConfig, ControlError> {
    let mut config = TimerConfig::default();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(ControlError::Usage(format!(
                "expected key=value, got '{pair}'"
            )));
        };
        match key {
            "name" => config.name = Some(value.to_string()),
            "icon" => config.icon = Some(value.to_string()),
            "duration" => config.duration = Some(SpanValue::Text(value.to_string())),
            "restore" => config.restore = Some(parse_bool(value)?),
            "restore_grace_period" | "grace" => {
                config.restore_grace_period = Some(SpanValue::Text(value.to_string()));
            }
            _ => {
                let hint = suggest(key, &UPDATE_KEYS)
                    .map(|s| format!(" (did you mean '{s}'?)"))
                    .unwrap_or_default();
                return Err(ControlError::Usage(format!(
                    "unknown setting '{key}'{hint}"
                )));
            }
        }
    }
    Ok(config)
}

fn parse_bool(value: &str) -> Result<bool, ControlError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ControlError::Usage(format!(
            "expected true or false, got '{value}'"
        ))),
    }
}

fn parse_duration(value: &str) -> Result<Duration, ControlError> {
    parse_config_span(value).map_err(|e| ControlError::Usage(format!("bad duration: {e}")))
}

// ============================================================================
// Execution
// ============================================================================

/// Executes control commands against a registry.
#[derive(Debug)]
pub struct Controller {
    registry: Arc<TimerRegistry>,
    config_path: Option<PathBuf>,
    loader: ConfigLoader,
}

impl Controller {
    /// Creates a controller. `config_path` is re-read on `reload`.
    #[must_use]
    pub fn new(registry: Arc<TimerRegistry>, config_path: Option<PathBuf>) -> Self {
        Self {
            registry,
            config_path,
            loader: ConfigLoader::with_defaults(),
        }
    }

    /// Parses and executes one line, returning its reply.
    #[must_use]
    pub fn handle_line(&self, line: &str) -> Option<Value> {
        let reply = match parse(line) {
            Ok(None) => return None,
            Ok(Some(command)) => {
                debug!(?command, "control command");
                self.execute(command)
            }
            Err(err) => Err(err.into()),
        };
        Some(reply.unwrap_or_else(|err| json!({ "ok": false, "error": err.to_string() })))
    }

    /// Executes one parsed command.
    ///
    /// # Errors
    ///
    /// Returns the registry, validation, or configuration error the command
    /// ran into.
    pub fn execute(&self, command: Command) -> Result<Value, CountdownError> {
        let registry = &self.registry;
        match command {
            Command::Start { id, duration } => {
                let requested = duration.as_deref().map(parse_duration).transpose()?;
                let id = TimerId::new(id);
                registry.start(&id, requested)?;
                self.timer_reply(&id)
            }
            Command::Pause { id } => {
                let id = TimerId::new(id);
                registry.pause(&id)?;
                self.timer_reply(&id)
            }
            Command::Cancel { id } => {
                let id = TimerId::new(id);
                registry.cancel(&id)?;
                self.timer_reply(&id)
            }
            Command::Finish { id } => {
                let id = TimerId::new(id);
                registry.finish(&id)?;
                self.timer_reply(&id)
            }
            Command::Status { id: Some(id) } => self.timer_reply(&TimerId::new(id)),
            Command::Status { id: None } => Ok(json!({ "ok": true, "timers": registry.views() })),
            Command::Create {
                name,
                duration,
                icon,
                no_restore,
                grace,
            } => {
                let config = TimerConfig {
                    name: Some(name),
                    icon,
                    duration: duration.map(SpanValue::Text),
                    restore: no_restore.then_some(false),
                    restore_grace_period: grace.map(SpanValue::Text),
                };
                let timer = registry.create(&config)?;
                Ok(json!({ "ok": true, "timer": timer.view() }))
            }
            Command::Update { id, settings } => {
                let update = parse_settings(&settings)?;
                let view = registry.update(&TimerId::new(id), &update)?;
                Ok(json!({ "ok": true, "timer": view }))
            }
            Command::Delete { id } => {
                let id = TimerId::new(id);
                registry.delete(&id)?;
                Ok(json!({ "ok": true, "deleted": id }))
            }
            Command::Reload => {
                let Some(path) = &self.config_path else {
                    return Err(
                        ControlError::Usage("no configuration file to reload".to_string()).into(),
                    );
                };
                let loaded = self.loader.load(path)?;
                let warnings: Vec<String> =
                    loaded.warnings.iter().map(ToString::to_string).collect();
                let summary = registry.reload(&loaded.timers);
                Ok(json!({ "ok": true, "reload": summary, "warnings": warnings }))
            }
        }
    }

    fn timer_reply(&self, id: &TimerId) -> Result<Value, CountdownError> {
        let timer = self
            .registry
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        Ok(json!({ "ok": true, "timer": timer.view() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TimerDefinition, TimerSettings};
    use crate::ports::{ManualClock, ManualScheduler, MemoryStore, Ports, RecordingSink};
    use chrono::{TimeZone, Utc};

    fn controller(config_path: Option<PathBuf>) -> Controller {
        let ports = Ports {
            clock: Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2026, 10, 18, 7, 0, 0).unwrap(),
            )),
            scheduler: Arc::new(ManualScheduler::new()),
            events: Arc::new(RecordingSink::new()),
            store: Arc::new(MemoryStore::new()),
        };
        let registry = Arc::new(TimerRegistry::new(ports));
        let id = TimerId::new("oven");
        let mut settings = TimerSettings::with_defaults(&id);
        settings.duration = Duration::from_secs(600);
        registry.reload(&[TimerDefinition { id, settings }]);
        Controller::new(registry, config_path)
    }

    #[test]
    fn parse_skips_blank_and_comments() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(parse("# note").unwrap(), None);
    }

    #[test]
    fn parse_start_with_quoted_duration() {
        assert_eq!(
            parse("start oven '1h 30m'").unwrap(),
            Some(Command::Start {
                id: "oven".to_string(),
                duration: Some("1h 30m".to_string()),
            })
        );
    }

    #[test]
    fn parse_create_flags() {
        assert_eq!(
            parse("create \"Soft egg\" 0:06:00 --icon mdi:egg --no-restore --grace 30").unwrap(),
            Some(Command::Create {
                name: "Soft egg".to_string(),
                duration: Some("0:06:00".to_string()),
                icon: Some("mdi:egg".to_string()),
                no_restore: true,
                grace: Some("30".to_string()),
            })
        );
    }

    #[test]
    fn parse_unknown_command_suggests() {
        match parse("strat oven") {
            Err(ControlError::UnknownCommand {
                command,
                suggestion,
            }) => {
                assert_eq!(command, "strat");
                assert_eq!(suggestion.as_deref(), Some("start"));
            }
            other => panic!("expected unknown command, got {other:?}"),
        }
        assert!(matches!(
            parse("frobnicate"),
            Err(ControlError::UnknownCommand {
                suggestion: None,
                ..
            })
        ));
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(parse("start 'oven"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse("pause"), Err(ControlError::Usage(_))));
        assert!(matches!(parse("update oven"), Err(ControlError::Usage(_))));
    }

    #[test]
    fn parse_settings_pairs() {
        let config = parse_settings(&[
            "name=Big oven".to_string(),
            "restore=off".to_string(),
            "grace=10s".to_string(),
        ])
        .unwrap();
        assert_eq!(config.name.as_deref(), Some("Big oven"));
        assert_eq!(config.restore, Some(false));
        assert_eq!(
            config.restore_grace_period,
            Some(SpanValue::Text("10s".to_string()))
        );

        match parse_settings(&["duraton=5".to_string()]) {
            Err(ControlError::Usage(msg)) => assert!(msg.contains("did you mean 'duration'")),
            other => panic!("expected usage error, got {other:?}"),
        }
        assert!(parse_settings(&["name".to_string()]).is_err());
        assert!(parse_settings(&["restore=maybe".to_string()]).is_err());
    }

    #[test]
    fn start_and_status_replies() {
        let ctl = controller(None);
        let reply = ctl.handle_line("start oven").unwrap();
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["timer"]["state"], "active");
        assert_eq!(reply["timer"]["finishes_at"], "2026-10-18T07:10:00+00:00");

        let reply = ctl.handle_line("status").unwrap();
        assert_eq!(reply["timers"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn start_with_bad_duration_fails() {
        let ctl = controller(None);
        let reply = ctl.handle_line("start oven -5").unwrap();
        assert_eq!(reply["ok"], false);
        assert!(reply["error"].as_str().unwrap().contains("duration"));
    }

    #[test]
    fn unknown_timer_reply() {
        let ctl = controller(None);
        let reply = ctl.handle_line("pause ghost").unwrap();
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"], "timer not found: ghost");
    }

    #[test]
    fn create_update_delete_cycle() {
        let ctl = controller(None);
        let reply = ctl.handle_line("create 'Tea' 180").unwrap();
        assert_eq!(reply["timer"]["id"], "tea");
        assert_eq!(reply["timer"]["duration"], "0:03:00");

        let reply = ctl.handle_line("update tea duration=0:04:00 icon=mdi:cup").unwrap();
        assert_eq!(reply["ok"], true, "{reply}");
        assert_eq!(reply["timer"]["duration"], "0:04:00");
        assert_eq!(reply["timer"]["icon"], "mdi:cup");

        let reply = ctl.handle_line("delete tea").unwrap();
        assert_eq!(reply["deleted"], "tea");
        assert_eq!(ctl.handle_line("status tea").unwrap()["ok"], false);
    }

    #[test]
    fn configured_timers_are_read_only() {
        let ctl = controller(None);
        let reply = ctl.handle_line("delete oven").unwrap();
        assert_eq!(reply["ok"], false);
        assert!(reply["error"].as_str().unwrap().contains("read-only"));
    }

    #[test]
    fn reload_without_config_fails() {
        let ctl = controller(None);
        assert_eq!(ctl.handle_line("reload").unwrap()["ok"], false);
    }

    #[test]
    fn reload_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timers.yaml");
        std::fs::write(&path, "timer:\n  bread:\n    duration: 45m\n").unwrap();
        let ctl = controller(Some(path));

        let reply = ctl.handle_line("reload").unwrap();
        assert_eq!(reply["ok"], true, "{reply}");
        assert_eq!(reply["reload"]["added"][0], "bread");
        assert_eq!(reply["reload"]["removed"][0], "oven");
    }
}
