//! Resume snapshot storage
//!
//! A single key/value slot holding the [`ResumeSnapshot`] an upgrade or login
//! flow reads back to continue an interrupted preview.

use crate::session::ResumeSnapshot;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Storage key for the pending resume payload
pub const RESUME_KEY: &str = "pendingResume";

/// Key/value persistence for the resume snapshot
pub trait SessionStore: Send + Sync {
    fn save_snapshot(&self, snapshot: &ResumeSnapshot) -> Result<()>;
    fn load_snapshot(&self) -> Result<Option<ResumeSnapshot>>;
    fn clear_snapshot(&self) -> Result<()>;
}

/// File-backed store: one JSON document per key under a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    directory: PathBuf,
}

impl JsonFileStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", key))
    }
}

impl SessionStore for JsonFileStore {
    fn save_snapshot(&self, snapshot: &ResumeSnapshot) -> Result<()> {
        std::fs::create_dir_all(&self.directory)?;
        let path = self.key_path(RESUME_KEY);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        debug!("Saved resume snapshot to {}", path.display());
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<ResumeSnapshot>> {
        let path = self.key_path(RESUME_KEY);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn clear_snapshot(&self) -> Result<()> {
        let path = self.key_path(RESUME_KEY);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, used when no storage directory is configured and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<ResumeSnapshot>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail with a storage error
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    /// Number of save attempts (successful or not)
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<ResumeSnapshot>>> {
        self.slot
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }
}

impl SessionStore for MemoryStore {
    fn save_snapshot(&self, snapshot: &ResumeSnapshot) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal("storage unavailable".to_string()));
        }
        *self.lock()? = Some(snapshot.clone());
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<ResumeSnapshot>> {
        Ok(self.lock()?.clone())
    }

    fn clear_snapshot(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}
