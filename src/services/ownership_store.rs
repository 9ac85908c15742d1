use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::errors::{LauncherError, Result};
use crate::models::{OwnershipMap, OwnershipPatch, OwnershipRecord};
use crate::utils::file::write_atomic;

/// Whole-file JSON store of per-item ownership.
///
/// Every write re-reads the file, merges one record and writes the full map back while
/// holding `write_lock`, so the worker and the claim path never lose each other's update.
/// Nothing guards against a second process writing the same file, and a crash between
/// the read and the rename drops that one update.
#[derive(Clone)]
pub struct OwnershipStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
    snapshot: Arc<RwLock<OwnershipMap>>,
}

impl OwnershipStore {
    pub fn open(path: PathBuf) -> Self {
        let store = Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
            snapshot: Arc::new(RwLock::new(OwnershipMap::new())),
        };
        let loaded = store.load();
        tracing::info!(
            "loaded ownership store {} ({} items)",
            store.path.display(),
            loaded.len()
        );
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file; a missing or unreadable file counts as empty.
    ///
    /// Holds the write lock so a concurrent save cannot be overwritten in the snapshot by an
    /// older read.
    pub fn load(&self) -> OwnershipMap {
        let _guard = self.lock_writes();
        let map = match self.read_file() {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!("treating ownership store as empty: {}", err);
                OwnershipMap::new()
            }
        };
        self.replace_snapshot(map.clone());
        map
    }

    pub fn merge_and_save(&self, item_id: &str, patch: &OwnershipPatch) -> Result<OwnershipRecord> {
        let _guard = self.lock_writes();

        let mut map = match self.read_file() {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!("overwriting unreadable ownership store: {}", err);
                OwnershipMap::new()
            }
        };
        let mut record = map.get(item_id).cloned().unwrap_or_default();
        record.apply(patch);
        record.validate()?;
        map.insert(item_id.to_string(), record.clone());

        let payload = serde_json::to_vec_pretty(&map)?;
        write_atomic(&self.path, &payload).map_err(|err| {
            LauncherError::Persistence(format!("failed to save {}: {}", self.path.display(), err))
        })?;
        self.replace_snapshot(map);

        tracing::info!(
            "saved ownership item={} owned={} downloaded={}",
            item_id,
            record.owned,
            record.downloaded
        );
        Ok(record)
    }

    /// Runs `merge_and_save` off the async executor.
    pub async fn merge_and_save_blocking(
        &self,
        item_id: &str,
        patch: OwnershipPatch,
    ) -> Result<OwnershipRecord> {
        let store = self.clone();
        let item_id = item_id.to_string();
        tokio::task::spawn_blocking(move || store.merge_and_save(&item_id, &patch))
            .await
            .map_err(|err| LauncherError::Persistence(err.to_string()))?
    }

    /// Last loaded or saved state; never touches the disk.
    pub fn get(&self, item_id: &str) -> Option<OwnershipRecord> {
        self.read_snapshot().get(item_id).cloned()
    }

    pub fn snapshot(&self) -> OwnershipMap {
        self.read_snapshot().clone()
    }

    fn read_file(&self) -> Result<OwnershipMap> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(OwnershipMap::new()),
            Err(err) => {
                return Err(LauncherError::Persistence(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    err
                )))
            }
        };
        if data.trim().is_empty() {
            return Ok(OwnershipMap::new());
        }
        serde_json::from_str(&data).map_err(|err| {
            LauncherError::Persistence(format!("failed to parse {}: {}", self.path.display(), err))
        })
    }

    fn replace_snapshot(&self, map: OwnershipMap) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = map,
            Err(poisoned) => *poisoned.into_inner() = map,
        }
    }

    fn read_snapshot(&self) -> std::sync::RwLockReadGuard<'_, OwnershipMap> {
        match self.snapshot.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
