//! Storage backends and the workspace document store.
//!
//! A [`StorageBackend`] is a string key/value store. [`WorkspaceStore`] sits
//! on top of one and owns the JSON encoding, schema migration and
//! validation of the [`WorkspaceSnapshot`] kept under a single key.
//!
//! # Atomic Writes
//!
//! [`FileStorage`] writes to a temp file and renames it into place so a
//! crash never leaves a half-written document behind.

use std::collections::BTreeMap;
#[cfg(feature = "file-storage")]
use std::path::{Path, PathBuf};

use fw_layout::workspace::{
    WorkspaceMigrationError, WorkspaceSnapshot, WorkspaceValidationError, migrate_workspace,
};
use thiserror::Error;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid workspace snapshot: {0}")]
    Validation(#[from] WorkspaceValidationError),

    #[error("workspace migration failed: {0}")]
    Migration(#[from] WorkspaceMigrationError),

    #[error("invalid storage key: {key:?}")]
    InvalidKey { key: String },

    #[error("storage backend {backend} unavailable: {message}")]
    Unavailable { backend: String, message: String },
}

/// String key/value store used for workspace persistence.
pub trait StorageBackend {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// `Ok(None)` when nothing is stored under `key`.
    fn load(&self, key: &str) -> StorageResult<Option<String>>;

    fn save(&mut self, key: &str, value: &str) -> StorageResult<()>;

    /// Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> StorageResult<()>;
}

/// In-memory backend for tests and ephemeral sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> StorageResult<()> {
        let _ = self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<()> {
        let _ = self.entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key under a root directory.
#[cfg(feature = "file-storage")]
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

#[cfg(feature = "file-storage")]
impl FileStorage {
    /// The directory is created on first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document stored under `key`.
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\'])
            && !key.chars().any(char::is_control);
        if !valid {
            return Err(StorageError::InvalidKey {
                key: key.to_owned(),
            });
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[cfg(feature = "file-storage")]
impl StorageBackend for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    fn load(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&mut self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.root)?;
        let temp = path.with_extension("json.tmp");
        let written = std::fs::write(&temp, value).and_then(|()| std::fs::rename(&temp, &path));
        if let Err(err) = written {
            // Never leave a half-written temp file next to the document.
            let _ = std::fs::remove_file(&temp);
            return Err(err.into());
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// The workspace document under one storage key.
#[derive(Debug)]
pub struct WorkspaceStore<B> {
    backend: B,
    key: String,
}

impl<B: StorageBackend> WorkspaceStore<B> {
    pub fn new(backend: B, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Read, migrate and validate the stored document.
    pub fn load(&self) -> StorageResult<Option<WorkspaceSnapshot>> {
        let Some(raw) = self.backend.load(&self.key)? else {
            return Ok(None);
        };
        let snapshot: WorkspaceSnapshot = serde_json::from_str(&raw)?;
        let migrated = migrate_workspace(snapshot)?;
        for warning in &migrated.warnings {
            tracing::warn!(
                key = %self.key,
                from_version = migrated.from_version,
                to_version = migrated.to_version,
                warning = %warning,
                "workspace migration warning"
            );
        }
        migrated.snapshot.validate()?;
        Ok(Some(migrated.snapshot))
    }

    pub fn save(&mut self, snapshot: &WorkspaceSnapshot) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(snapshot)?;
        self.backend.save(&self.key, &json)
    }

    pub fn clear(&mut self) -> StorageResult<()> {
        self.backend.remove(&self.key)
    }
}
