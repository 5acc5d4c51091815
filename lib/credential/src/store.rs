//! Credential persistence.
//!
//! The store holds exactly one record. Writes go to a sibling temp file
//! that is flushed and renamed over the target, so a concurrent reader
//! (in this process or another) sees either the old record or the new
//! one, never a mix.

use crate::error::StoreError;
use crate::record::CredentialRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Trait for credential storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the persisted record.
    ///
    /// Returns `Ok(None)` on first run, when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if a record exists but cannot be
    /// parsed, or [`StoreError::Io`] if it cannot be read.
    async fn load(&self) -> Result<Option<CredentialRecord>, StoreError>;

    /// Replaces the persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the record cannot be written.
    async fn save(&self, record: &CredentialRecord) -> Result<(), StoreError>;
}

/// JSON file-backed credential store.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(path: &Path, err: &std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Temp files live next to the target so the rename stays on one
    /// filesystem. The ULID suffix keeps concurrent writers apart.
    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "credential".to_string());
        self.path
            .with_file_name(format!(".{file_name}.{}.tmp", ulid::Ulid::new()))
    }

    async fn write_temp(&self, temp_path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(temp_path)
            .await
            .map_err(|e| Self::io_error(temp_path, &e))?;
        file.write_all(contents)
            .await
            .map_err(|e| Self::io_error(temp_path, &e))?;
        file.sync_all()
            .await
            .map_err(|e| Self::io_error(temp_path, &e))?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored credential");
                return Ok(None);
            }
            Err(e) => return Err(Self::io_error(&self.path, &e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }

    async fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(parent, &e))?;
        }

        let contents = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Io {
            path: self.path.display().to_string(),
            reason: format!("serialize: {e}"),
        })?;

        let temp_path = self.temp_path();
        if let Err(err) = self.write_temp(&temp_path, &contents).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err);
        }

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Self::io_error(&self.path, &e));
        }

        debug!(path = %self.path.display(), "credential persisted");
        Ok(())
    }
}

/// In-memory store that counts its calls.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    slot: Mutex<Slot>,
    loads: AtomicUsize,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    Record(CredentialRecord),
    Corrupt,
}

impl InMemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `record`.
    #[must_use]
    pub fn with_record(record: CredentialRecord) -> Self {
        let store = Self::default();
        *store.lock() = Slot::Record(record);
        store
    }

    /// Creates a store whose contents fail to parse.
    #[must_use]
    pub fn corrupt() -> Self {
        let store = Self::default();
        *store.lock() = Slot::Corrupt;
        store
    }

    /// Makes every subsequent `save` fail with an I/O error.
    #[must_use]
    pub fn with_failing_saves(self) -> Self {
        self.fail_saves.store(true, Ordering::SeqCst);
        self
    }

    /// Returns the currently stored record.
    #[must_use]
    pub fn current(&self) -> Option<CredentialRecord> {
        match &*self.lock() {
            Slot::Record(record) => Some(record.clone()),
            Slot::Empty | Slot::Corrupt => None,
        }
    }

    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match &*self.lock() {
            Slot::Empty => Ok(None),
            Slot::Record(record) => Ok(Some(record.clone())),
            Slot::Corrupt => Err(StoreError::Corrupt {
                path: "memory".to_string(),
                reason: "injected corruption".to_string(),
            }),
        }
    }

    async fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: "memory".to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        *self.lock() = Slot::Record(record.clone());
        Ok(())
    }
}
