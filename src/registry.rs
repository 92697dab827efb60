//! Timer registry.
//!
//! Owns every [`Timer`] by id. Timers come from two places: the
//! configuration file (read-only, replaced wholesale by [`reload`]) and
//! dynamic creation (editable, untouched by reloads).
//!
//! [`reload`]: TimerRegistry::reload

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{TimerConfig, TimerDefinition, TimerSettings, merge, slugify};
use crate::error::{ConfigError, RegistryError, Severity, ValidationIssue};
use crate::observability::metrics;
use crate::ports::Ports;
use crate::timer::{Timer, TimerId, TimerView};

/// Id used when a name slugifies to nothing.
const FALLBACK_ID: &str = "timer";

/// What a [`reload`](TimerRegistry::reload) changed.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    /// Configured timers that did not exist before.
    pub added: Vec<TimerId>,
    /// Configured timers whose settings changed.
    pub updated: Vec<TimerId>,
    /// Configured timers no longer listed.
    pub removed: Vec<TimerId>,
    /// Listed ids already taken by a dynamic timer.
    pub skipped: Vec<TimerId>,
}

/// Registry of live timers.
pub struct TimerRegistry {
    ports: Ports,
    timers: DashMap<TimerId, Arc<Timer>>,
}

impl std::fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerRegistry")
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

impl TimerRegistry {
    /// Creates an empty registry whose timers use `ports`.
    #[must_use]
    pub fn new(ports: Ports) -> Self {
        Self {
            ports,
            timers: DashMap::new(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Looks up a timer.
    #[must_use]
    pub fn get(&self, id: &TimerId) -> Option<Arc<Timer>> {
        self.timers.get(id).map(|t| Arc::clone(t.value()))
    }

    /// Returns all timer ids, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<TimerId> {
        let mut ids: Vec<TimerId> = self.timers.iter().map(|t| t.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Returns views of all timers, sorted by id.
    #[must_use]
    pub fn views(&self) -> Vec<TimerView> {
        let mut views: Vec<TimerView> = self.timers.iter().map(|t| t.value().view()).collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }

    /// Number of registered timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Returns `true` if no timers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Derives an unused id from a display name.
    ///
    /// `"Kitchen Timer"` becomes `kitchen_timer`, or `kitchen_timer_2`,
    /// `kitchen_timer_3`, ... if taken.
    #[must_use]
    pub fn suggest_id(&self, name: &str) -> TimerId {
        let mut base = slugify(name);
        if base.is_empty() {
            base = FALLBACK_ID.to_string();
        }
        let mut candidate = TimerId::new(base.as_str());
        let mut n = 2u32;
        while self.timers.contains_key(&candidate) {
            candidate = TimerId::new(format!("{base}_{n}"));
            n += 1;
        }
        candidate
    }

    // ========================================================================
    // Dynamic timers
    // ========================================================================

    /// Creates an editable timer from a partial configuration. `name` is
    /// required and determines the id.
    ///
    /// If restoring or persisting the new timer fails, it stays registered
    /// and the store error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] for invalid input,
    /// [`RegistryError::DuplicateId`] if the derived id was taken
    /// concurrently, or [`RegistryError::Store`].
    pub fn create(&self, config: &TimerConfig) -> Result<Arc<Timer>, RegistryError> {
        let Some(name) = config.name.as_deref().filter(|n| !n.trim().is_empty()) else {
            return Err(ConfigError::ValidationError {
                path: "create".to_string(),
                errors: vec![ValidationIssue {
                    path: "name".to_string(),
                    message: "name is required".to_string(),
                    severity: Severity::Error,
                }],
            }
            .into());
        };

        let id = self.suggest_id(name);
        let (settings, warnings) = merge(&id, &TimerSettings::with_defaults(&id), config)?;
        log_warnings(&id, &warnings);
        self.register(id, settings, true)
    }

    /// Applies a partial update to an editable timer.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`], [`RegistryError::ReadOnly`],
    /// [`RegistryError::Validation`], or [`RegistryError::Store`] (after the
    /// update has taken effect).
    pub fn update(&self, id: &TimerId, update: &TimerConfig) -> Result<TimerView, RegistryError> {
        let timer = self.editable(id)?;
        let (settings, warnings) = merge(id, &timer.settings(), update)?;
        log_warnings(id, &warnings);
        timer.update_config(settings)?;
        info!(timer_id = %id, "timer updated");
        Ok(timer.view())
    }

    /// Removes an editable timer, cancelling its wake-up and forgetting its
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`], [`RegistryError::ReadOnly`], or
    /// [`RegistryError::Store`] (after the timer is gone).
    pub fn delete(&self, id: &TimerId) -> Result<(), RegistryError> {
        self.editable(id)?;
        self.remove(id)
    }

    // ========================================================================
    // Configured timers
    // ========================================================================

    /// Brings configured timers in line with `definitions`.
    ///
    /// New ids are created, changed ones updated in place, and configured
    /// timers that are no longer listed removed. Dynamic timers are left
    /// alone; a definition whose id belongs to one is skipped. Store
    /// failures are logged and do not stop the reload.
    pub fn reload(&self, definitions: &[TimerDefinition]) -> ReloadSummary {
        let mut summary = ReloadSummary::default();

        for def in definitions {
            match self.get(&def.id) {
                Some(timer) if timer.is_editable() => {
                    warn!(timer_id = %def.id, "configured id is taken by a dynamic timer; skipping");
                    summary.skipped.push(def.id.clone());
                }
                Some(timer) => {
                    if timer.settings() != def.settings {
                        if let Err(err) = timer.update_config(def.settings.clone()) {
                            warn!(timer_id = %def.id, %err, "reloaded settings not persisted");
                        }
                        summary.updated.push(def.id.clone());
                    }
                }
                None => match self.register(def.id.clone(), def.settings.clone(), false) {
                    Ok(_) => summary.added.push(def.id.clone()),
                    Err(RegistryError::Store(err)) => {
                        warn!(timer_id = %def.id, %err, "restored timer not persisted");
                        summary.added.push(def.id.clone());
                    }
                    Err(err) => warn!(timer_id = %def.id, %err, "failed to add configured timer"),
                },
            }
        }

        let stale: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|t| !t.value().is_editable())
            .map(|t| t.key().clone())
            .filter(|id| !definitions.iter().any(|d| &d.id == id))
            .collect();
        for id in stale {
            if let Err(err) = self.remove(&id) {
                warn!(timer_id = %id, %err, "failed to forget removed timer");
            }
            summary.removed.push(id);
        }

        info!(
            added = summary.added.len(),
            updated = summary.updated.len(),
            removed = summary.removed.len(),
            skipped = summary.skipped.len(),
            "configuration applied"
        );
        summary
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Starts a timer.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] or [`RegistryError::Store`].
    pub fn start(&self, id: &TimerId, requested: Option<Duration>) -> Result<(), RegistryError> {
        Ok(self.require(id)?.start(requested)?)
    }

    /// Pauses a timer.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] or [`RegistryError::Store`].
    pub fn pause(&self, id: &TimerId) -> Result<(), RegistryError> {
        Ok(self.require(id)?.pause()?)
    }

    /// Cancels a timer.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] or [`RegistryError::Store`].
    pub fn cancel(&self, id: &TimerId) -> Result<(), RegistryError> {
        Ok(self.require(id)?.cancel()?)
    }

    /// Finishes a timer.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] or [`RegistryError::Store`].
    pub fn finish(&self, id: &TimerId) -> Result<(), RegistryError> {
        Ok(self.require(id)?.finish()?)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn require(&self, id: &TimerId) -> Result<Arc<Timer>, RegistryError> {
        self.get(id).ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    fn editable(&self, id: &TimerId) -> Result<Arc<Timer>, RegistryError> {
        let timer = self.require(id)?;
        if timer.is_editable() {
            Ok(timer)
        } else {
            Err(RegistryError::ReadOnly(id.clone()))
        }
    }

    fn register(
        &self,
        id: TimerId,
        settings: TimerSettings,
        editable: bool,
    ) -> Result<Arc<Timer>, RegistryError> {
        let timer = match self.timers.entry(id.clone()) {
            Entry::Occupied(_) => return Err(RegistryError::DuplicateId(id)),
            Entry::Vacant(slot) => {
                let timer = Timer::new(id.clone(), settings, editable, self.ports.clone());
                slot.insert(Arc::clone(&timer));
                timer
            }
        };
        metrics::set_timer_count(self.timers.len());

        let outcome = timer.attach()?;
        debug!(timer_id = %id, editable, outcome = outcome.label(), "timer registered");
        Ok(timer)
    }

    fn remove(&self, id: &TimerId) -> Result<(), RegistryError> {
        let (_, timer) = self
            .timers
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        timer.detach();
        metrics::set_timer_count(self.timers.len());
        info!(timer_id = %id, "timer removed");

        self.ports.store.remove(id).map_err(|err| {
            metrics::record_store_failure("remove");
            RegistryError::Store(err)
        })
    }
}

fn log_warnings(id: &TimerId, warnings: &[ValidationIssue]) {
    for issue in warnings {
        warn!(timer_id = %id, path = %issue.path, "{}", issue.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpanValue;
    use crate::ports::{Clock, ManualClock, ManualScheduler, MemoryStore, RecordingSink};
    use crate::timer::{Snapshot, TimerEvent, TimerState};
    use chrono::{TimeZone, Utc};

    struct Fixture {
        clock: Arc<ManualClock>,
        scheduler: Arc<ManualScheduler>,
        sink: Arc<RecordingSink>,
        store: Arc<MemoryStore>,
        registry: TimerRegistry,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
        ));
        let scheduler = Arc::new(ManualScheduler::new());
        let sink = Arc::new(RecordingSink::new());
        let store = Arc::new(MemoryStore::new());
        let registry = TimerRegistry::new(Ports {
            clock: clock.clone(),
            scheduler: scheduler.clone(),
            events: sink.clone(),
            store: store.clone(),
        });
        Fixture {
            clock,
            scheduler,
            sink,
            store,
            registry,
        }
    }

    fn named(name: &str) -> TimerConfig {
        TimerConfig {
            name: Some(name.to_string()),
            ..TimerConfig::default()
        }
    }

    fn definition(id: &str, duration_secs: u64) -> TimerDefinition {
        let id = TimerId::new(id);
        let mut settings = TimerSettings::with_defaults(&id);
        settings.duration = Duration::from_secs(duration_secs);
        TimerDefinition { id, settings }
    }

    #[test]
    fn create_derives_unique_ids() {
        let fx = fixture();
        let a = fx.registry.create(&named("Kitchen Timer")).unwrap();
        let b = fx.registry.create(&named("Kitchen timer")).unwrap();
        let c = fx.registry.create(&named("!!!")).unwrap();
        assert_eq!(a.id().as_str(), "kitchen_timer");
        assert_eq!(b.id().as_str(), "kitchen_timer_2");
        assert_eq!(c.id().as_str(), "timer");
        assert!(a.is_editable());
        assert_eq!(fx.registry.len(), 3);
    }

    #[test]
    fn create_requires_name() {
        let fx = fixture();
        assert!(matches!(
            fx.registry.create(&TimerConfig::default()),
            Err(RegistryError::Validation(_))
        ));
        assert!(fx.registry.is_empty());
    }

    #[test]
    fn create_rejects_invalid_fields() {
        let fx = fixture();
        let config = TimerConfig {
            duration: Some(SpanValue::Seconds(-3)),
            ..named("Tea")
        };
        assert!(matches!(
            fx.registry.create(&config),
            Err(RegistryError::Validation(_))
        ));
        assert!(fx.registry.is_empty());
    }

    #[test]
    fn update_preserves_instance() {
        let fx = fixture();
        let timer = fx.registry.create(&named("Tea")).unwrap();
        let update = TimerConfig {
            duration: Some(SpanValue::Text("0:03:00".to_string())),
            ..TimerConfig::default()
        };
        let view = fx.registry.update(timer.id(), &update).unwrap();
        assert_eq!(view.duration, Duration::from_secs(180));
        assert_eq!(view.name, "Tea");
        assert!(Arc::ptr_eq(&timer, &fx.registry.get(timer.id()).unwrap()));
    }

    #[test]
    fn update_unknown_and_read_only() {
        let fx = fixture();
        fx.registry.reload(&[definition("oven", 60)]);
        assert!(matches!(
            fx.registry.update(&TimerId::new("nope"), &TimerConfig::default()),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            fx.registry.update(&TimerId::new("oven"), &TimerConfig::default()),
            Err(RegistryError::ReadOnly(_))
        ));
        assert!(matches!(
            fx.registry.delete(&TimerId::new("oven")),
            Err(RegistryError::ReadOnly(_))
        ));
    }

    #[test]
    fn delete_cancels_and_forgets() {
        let fx = fixture();
        let timer = fx.registry.create(&named("Tea")).unwrap();
        let id = timer.id().clone();
        fx.registry.start(&id, Some(Duration::from_secs(60))).unwrap();
        assert!(fx.store.get(&id).is_some());

        fx.registry.delete(&id).unwrap();
        assert!(fx.registry.get(&id).is_none());
        assert!(fx.store.get(&id).is_none());
        assert_eq!(fx.scheduler.pending_count(), 0);
        assert!(matches!(
            fx.registry.delete(&id),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn held_handle_cannot_resurrect_deleted_timer() {
        let fx = fixture();
        let held = fx.registry.create(&named("Tea")).unwrap();
        let id = held.id().clone();
        fx.registry.delete(&id).unwrap();

        held.start(Some(Duration::from_secs(60))).unwrap();
        assert!(fx.store.get(&id).is_none());
        assert_eq!(fx.scheduler.pending_count(), 0);

        let again = fx.registry.create(&named("Tea")).unwrap();
        assert_eq!(again.id(), &id);
        assert_eq!(again.state(), TimerState::Idle);
    }

    #[test]
    fn commands_on_unknown_id() {
        let fx = fixture();
        let id = TimerId::new("ghost");
        assert!(matches!(fx.registry.start(&id, None), Err(RegistryError::NotFound(_))));
        assert!(matches!(fx.registry.pause(&id), Err(RegistryError::NotFound(_))));
        assert!(matches!(fx.registry.cancel(&id), Err(RegistryError::NotFound(_))));
        assert!(matches!(fx.registry.finish(&id), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn reload_adds_updates_and_removes_configured_timers() {
        let fx = fixture();
        let first = fx.registry.reload(&[definition("oven", 60), definition("tea", 120)]);
        assert_eq!(first.added.len(), 2);

        let dynamic = fx.registry.create(&named("Laundry")).unwrap();
        let oven = fx.registry.get(&TimerId::new("oven")).unwrap();

        let second = fx
            .registry
            .reload(&[definition("oven", 90), definition("bread", 30)]);
        assert_eq!(second.added, vec![TimerId::new("bread")]);
        assert_eq!(second.updated, vec![TimerId::new("oven")]);
        assert_eq!(second.removed, vec![TimerId::new("tea")]);

        assert!(Arc::ptr_eq(
            &oven,
            &fx.registry.get(&TimerId::new("oven")).unwrap()
        ));
        assert_eq!(oven.view().duration, Duration::from_secs(90));
        assert!(fx.registry.get(dynamic.id()).is_some());
        assert_eq!(
            fx.registry.list(),
            vec![
                TimerId::new("bread"),
                TimerId::new("laundry"),
                TimerId::new("oven")
            ]
        );
    }

    #[test]
    fn reload_skips_ids_owned_by_dynamic_timers() {
        let fx = fixture();
        fx.registry.create(&named("Oven")).unwrap();
        let summary = fx.registry.reload(&[definition("oven", 60)]);
        assert_eq!(summary.skipped, vec![TimerId::new("oven")]);
        assert!(fx.registry.get(&TimerId::new("oven")).unwrap().is_editable());
    }

    #[test]
    fn reload_unchanged_is_quiet() {
        let fx = fixture();
        fx.registry.reload(&[definition("oven", 60)]);
        let summary = fx.registry.reload(&[definition("oven", 60)]);
        assert_eq!(summary, ReloadSummary::default());
    }

    #[test]
    fn registration_restores_snapshot() {
        let fx = fixture();
        let end = fx.clock.now() + chrono::TimeDelta::seconds(45);
        fx.store.insert(
            TimerId::new("oven"),
            Snapshot::capture(
                TimerState::Active,
                Duration::from_secs(60),
                Duration::from_secs(60),
                Some(end),
            ),
        );
        fx.registry.reload(&[definition("oven", 60)]);

        let view = fx.registry.get(&TimerId::new("oven")).unwrap().view();
        assert_eq!(view.state, TimerState::Active);
        assert_eq!(view.finishes_at, Some(end));
        assert_eq!(fx.sink.count(TimerEvent::Restarted), 1);
    }

    #[test]
    fn commands_delegate_to_timer() {
        let fx = fixture();
        fx.registry.reload(&[definition("oven", 60)]);
        let id = TimerId::new("oven");
        fx.registry.start(&id, None).unwrap();
        fx.registry.pause(&id).unwrap();
        fx.registry.start(&id, None).unwrap();
        fx.registry.finish(&id).unwrap();
        fx.registry.cancel(&id).unwrap();
        assert_eq!(
            fx.sink.events_for(&id),
            vec![
                TimerEvent::Started,
                TimerEvent::Paused,
                TimerEvent::Restarted,
                TimerEvent::Finished,
                TimerEvent::Cancelled
            ]
        );
        assert_eq!(fx.registry.views().len(), 1);
    }
}
