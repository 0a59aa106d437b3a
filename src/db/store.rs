use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, error, info, warn};

use super::models::DataStore;
use super::schema::StoredSchema;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on store file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to replace store file {path:?}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Store file {path:?} is unreadable and could not be preserved: {source}")]
    Quarantine {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Store I/O task failed: {0}")]
    Task(#[from] task::JoinError),
}

/// JSON file holding the whole [`DataStore`].
///
/// Every access goes through one async mutex, and [`FileStore::mutate`] runs
/// load, change and save inside a single critical section so concurrent
/// writers never lose each other's updates. File I/O runs on the blocking
/// pool.
pub struct FileStore {
    file: StoreFile,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, min_interval_seconds: u64) -> Self {
        Self {
            file: StoreFile {
                path: path.into(),
                min_interval_seconds,
            },
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub async fn load(&self) -> Result<DataStore, StoreError> {
        let _guard = self.lock.lock().await;
        self.load_locked().await
    }

    pub async fn save(&self, ds: &DataStore) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.save_locked(ds.clone()).await
    }

    /// Loads the store and hands it to `f` without writing anything back.
    pub async fn read<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&DataStore) -> R,
    {
        let _guard = self.lock.lock().await;
        let ds = self.load_locked().await?;
        Ok(f(&ds))
    }

    /// Applies `f` to the current state and persists the result, all under
    /// the store lock. Nothing is written when `f` leaves the state unchanged.
    pub async fn mutate<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut DataStore) -> R,
    {
        let _guard = self.lock.lock().await;
        let mut ds = self.load_locked().await?;
        let before = ds.clone();
        let result = f(&mut ds);
        if ds != before {
            self.save_locked(ds).await?;
        }
        Ok(result)
    }

    async fn load_locked(&self) -> Result<DataStore, StoreError> {
        let file = self.file.clone();
        task::spawn_blocking(move || file.load()).await?
    }

    async fn save_locked(&self, ds: DataStore) -> Result<(), StoreError> {
        let file = self.file.clone();
        task::spawn_blocking(move || file.save(&ds)).await?
    }
}

/// The synchronous side of [`FileStore`]; only ever called from
/// `spawn_blocking` with the store lock held.
#[derive(Debug, Clone)]
struct StoreFile {
    path: PathBuf,
    min_interval_seconds: u64,
}

impl StoreFile {
    fn load(&self) -> Result<DataStore, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "Store file does not exist yet, starting empty.");
                return Ok(DataStore::default());
            }
            Err(e) => return Err(e.into()),
        };

        match StoredSchema::parse(&bytes) {
            Ok(StoredSchema::Current(ds)) => Ok(ds),
            Ok(legacy @ StoredSchema::Legacy(_)) => {
                let ds = legacy.into_current(self.min_interval_seconds);
                info!(
                    path = ?self.path,
                    owners = ds.owners.len(),
                    entries = ds.total_entries(),
                    "Migrated legacy store file to the current schema."
                );
                self.save(&ds)?;
                Ok(ds)
            }
            Err(e) => {
                let backup = self.quarantine()?;
                error!(
                    path = ?self.path,
                    backup = ?backup,
                    error = %e,
                    "Store file matches no known schema. Continuing with an EMPTY store; the unreadable file was preserved."
                );
                // Replace the live file so later loads do not quarantine it again.
                let ds = DataStore::default();
                self.save(&ds)?;
                Ok(ds)
            }
        }
    }

    /// Copies an unreadable store file aside so the next save cannot destroy it.
    fn quarantine(&self) -> Result<PathBuf, StoreError> {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "store".into());
        name.push(format!(".corrupt-{}", chrono::Utc::now().timestamp()));
        let backup = self.path.with_file_name(name);

        fs::copy(&self.path, &backup).map_err(|source| StoreError::Quarantine {
            path: self.path.clone(),
            source,
        })?;
        Ok(backup)
    }

    fn save(&self, ds: &DataStore) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, ds)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;

        tmp.persist(&self.path).map_err(|e| {
            warn!(path = ?self.path, error = %e.error, "Atomic rename of store file failed.");
            StoreError::Persist {
                path: self.path.clone(),
                source: e.error,
            }
        })?;
        debug!(path = ?self.path, entries = ds.total_entries(), "Store saved.");
        Ok(())
    }
}
