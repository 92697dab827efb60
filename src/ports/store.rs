//! Snapshot store adapters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SnapshotStore;
use crate::error::StoreError;
use crate::timer::{Snapshot, TimerId};

/// Version written into state files.
pub const STATE_FILE_VERSION: u32 = 1;

// ============================================================================
// Memory
// ============================================================================

/// In-memory store. Writes can be made to fail for testing error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: DashMap<TimerId, Snapshot>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a snapshot directly, as if a previous process had saved it.
    pub fn insert(&self, timer_id: TimerId, snapshot: Snapshot) {
        self.snapshots.insert(timer_id, snapshot);
    }

    /// Returns the stored snapshot without going through the port.
    #[must_use]
    pub fn get(&self, timer_id: &TimerId) -> Option<Snapshot> {
        self.snapshots.get(timer_id).map(|s| s.value().clone())
    }

    /// Makes subsequent `save`/`remove` calls fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl SnapshotStore for MemoryStore {
    fn save(&self, timer_id: &TimerId, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.check_writable()?;
        self.snapshots.insert(timer_id.clone(), snapshot.clone());
        Ok(())
    }

    fn load(&self, timer_id: &TimerId) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.get(timer_id))
    }

    fn remove(&self, timer_id: &TimerId) -> Result<(), StoreError> {
        self.check_writable()?;
        self.snapshots.remove(timer_id);
        Ok(())
    }
}

// ============================================================================
// JSON file
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    #[serde(default)]
    timers: BTreeMap<TimerId, Snapshot>,
}

/// Store persisting all snapshots in one JSON file.
///
/// The whole file is rewritten on every change through a temporary
/// sibling and a rename, so a crash mid-write leaves the previous
/// contents intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    snapshots: Mutex<BTreeMap<TimerId, Snapshot>>,
}

impl JsonFileStore {
    /// Opens the state file at `path`, starting empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be read, or
    /// [`StoreError::Encoding`] if its contents are not a valid state file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let snapshots = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => {
                let file: StateFile = serde_json::from_str(&raw)?;
                if file.version != STATE_FILE_VERSION {
                    return Err(StoreError::Unavailable(format!(
                        "unsupported state file version {} in {}",
                        file.version,
                        path.display()
                    )));
                }
                file.timers
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), timers = snapshots.len(), "opened state file");
        Ok(Self {
            path,
            snapshots: Mutex::new(snapshots),
        })
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, snapshots: &BTreeMap<TimerId, Snapshot>) -> Result<(), StoreError> {
        let file = StateFileRef {
            version: STATE_FILE_VERSION,
            timers: snapshots,
        };
        let json = serde_json::to_string_pretty(&file)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn mutate(
        &self,
        f: impl FnOnce(&mut BTreeMap<TimerId, Snapshot>),
    ) -> Result<(), StoreError> {
        let mut snapshots = self
            .snapshots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut snapshots);
        self.write(&snapshots)
    }
}

#[derive(Serialize)]
struct StateFileRef<'a> {
    version: u32,
    timers: &'a BTreeMap<TimerId, Snapshot>,
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, timer_id: &TimerId, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.mutate(|m| {
            m.insert(timer_id.clone(), snapshot.clone());
        })
    }

    fn load(&self, timer_id: &TimerId) -> Result<Option<Snapshot>, StoreError> {
        Ok(self
            .snapshots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(timer_id)
            .cloned())
    }

    fn remove(&self, timer_id: &TimerId) -> Result<(), StoreError> {
        self.mutate(|m| {
            m.remove(timer_id);
        })
    }
}
