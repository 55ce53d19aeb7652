//! Durable enrollment store
//!
//! The whole identity → embedding map is persisted as one JSON snapshot.
//! Writers are serialized through a mutex and replace the snapshot with a
//! temp-file-then-rename, so readers (which take no lock) always observe
//! either the previous or the next complete snapshot.
//!
//! The mutex only orders writers sharing one handle. Every read-modify-write
//! also holds an exclusive advisory lock on `<snapshot>.lock`, which covers
//! other handles on the same path and other processes.

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::VoiceEmbedding;
use crate::error::{Result, VoxgateError};

type Snapshot = BTreeMap<String, VoiceEmbedding>;

/// Store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Snapshot location (defaults to `<data>/embeddings.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

/// What was found on disk
enum LoadedSnapshot {
    Absent,
    Corrupt,
    Valid(Snapshot),
}

impl LoadedSnapshot {
    fn into_map(self) -> Snapshot {
        match self {
            LoadedSnapshot::Valid(map) => map,
            LoadedSnapshot::Absent | LoadedSnapshot::Corrupt => Snapshot::new(),
        }
    }
}

/// Held for the whole load → persist span of a write
struct WriteLock<'a> {
    _guard: MutexGuard<'a, ()>,
    // Closing the descriptor releases the advisory lock
    _file: File,
}

pub struct EnrollmentStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl EnrollmentStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        log::info!("Enrollment store at {}", path.display());
        Self {
            path,
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetch the signature for `uid` (`None` when not enrolled)
    pub fn get(&self, uid: &str) -> Result<Option<VoiceEmbedding>> {
        let mut map = self.load()?.into_map();
        Ok(map.remove(uid))
    }

    pub fn contains(&self, uid: &str) -> Result<bool> {
        Ok(self.load()?.into_map().contains_key(uid))
    }

    /// All enrolled identities, sorted
    pub fn identities(&self) -> Result<Vec<String>> {
        Ok(self.load()?.into_map().into_keys().collect())
    }

    /// Insert or overwrite the signature for `uid`
    pub fn put(&self, uid: &str, embedding: VoiceEmbedding) -> Result<()> {
        let _lock = self.lock_writer()?;

        let mut map = self.load_for_write()?;
        let replaced = map.insert(uid.to_string(), embedding).is_some();
        self.persist(&map)?;

        log::info!(
            "{} signature for '{}' ({} identities stored)",
            if replaced { "Replaced" } else { "Stored" },
            uid,
            map.len()
        );
        Ok(())
    }

    /// Delete the signature for `uid`; returns whether one existed
    pub fn remove(&self, uid: &str) -> Result<bool> {
        let _lock = self.lock_writer()?;

        let mut map = match self.load()? {
            LoadedSnapshot::Valid(map) => map,
            LoadedSnapshot::Absent | LoadedSnapshot::Corrupt => return Ok(false),
        };

        if map.remove(uid).is_none() {
            return Ok(false);
        }

        self.persist(&map)?;
        log::info!("Removed signature for '{}'", uid);
        Ok(true)
    }

    fn lock_writer(&self) -> Result<WriteLock<'_>> {
        // The guarded state lives on disk; a panicked writer cannot leave it half-written.
        let guard = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        fs::create_dir_all(self.dir())
            .map_err(|e| VoxgateError::io("Failed to create snapshot directory", e))?;

        let lock_path = self.sibling(".lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| VoxgateError::io("Failed to open snapshot lock file", e))?;
        FileExt::lock_exclusive(&file)
            .map_err(|e| VoxgateError::io("Failed to lock enrollment snapshot", e))?;

        Ok(WriteLock {
            _guard: guard,
            _file: file,
        })
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// `<snapshot><suffix>` next to the snapshot
    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "embeddings.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn load(&self) -> Result<LoadedSnapshot> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LoadedSnapshot::Absent),
            Err(e) => return Err(VoxgateError::io("Failed to read enrollment snapshot", e)),
        };

        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(map) => Ok(LoadedSnapshot::Valid(map)),
            Err(e) => {
                log::warn!(
                    "Enrollment snapshot {} is malformed, treating as empty: {}",
                    self.path.display(),
                    e
                );
                Ok(LoadedSnapshot::Corrupt)
            }
        }
    }

    /// Load under the writer lock, moving a corrupt snapshot aside first
    fn load_for_write(&self) -> Result<Snapshot> {
        match self.load()? {
            LoadedSnapshot::Corrupt => {
                self.quarantine()?;
                Ok(Snapshot::new())
            }
            loaded => Ok(loaded.into_map()),
        }
    }

    fn quarantine(&self) -> Result<()> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let target = self.sibling(&format!(".corrupt-{}", stamp));

        fs::rename(&self.path, &target)
            .map_err(|e| VoxgateError::io("Failed to quarantine corrupt snapshot", e))?;

        log::error!(
            "Corrupt enrollment snapshot moved to {}",
            target.display()
        );
        Ok(())
    }

    fn persist(&self, map: &Snapshot) -> Result<()> {
        let json = serde_json::to_vec(map)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".embeddings-")
            .suffix(".tmp")
            .tempfile_in(self.dir())
            .map_err(|e| VoxgateError::io("Failed to create snapshot temp file", e))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.flush())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| VoxgateError::io("Failed to write snapshot temp file", e))?;

        tmp.persist(&self.path)
            .map_err(|e| VoxgateError::io("Failed to replace enrollment snapshot", e.error))?;

        log::debug!(
            "Snapshot written: {} ({} bytes)",
            self.path.display(),
            json.len()
        );
        Ok(())
    }
}
