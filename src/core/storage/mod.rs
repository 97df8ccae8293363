//! Local key-value persistence.
//!
//! Values are whole named blobs (`agents`, `settings`, `theme`, cached
//! responses). Every write replaces the entire blob; there are no partial
//! updates or transactions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Blob name is empty or escapes the storage root.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage result type.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Get/set of named blobs.
///
/// Names may contain `/` to group related blobs (`cache/<tag>/<entry>`).
pub trait BlobStore: Send + Sync {
    /// Read a blob, `None` if it was never written.
    fn get(&self, name: &str) -> Result<Option<String>>;

    /// Replace a blob.
    fn set(&self, name: &str, blob: &str) -> Result<()>;

    /// Delete a blob. Missing blobs are not an error.
    fn remove(&self, name: &str) -> Result<()>;

    /// Names of the blobs directly under `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Names of the groups directly under `prefix`, sorted.
    fn groups(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete a group and every blob in it. Missing groups are not an error.
    fn remove_group(&self, prefix: &str) -> Result<()>;
}

/// Read and deserialize a blob.
///
/// # Errors
///
/// Returns error if the blob cannot be read or parsed.
pub fn read_json<T>(store: &dyn BlobStore, name: &str) -> Result<Option<T>>
where
    T: for<'de> Deserialize<'de>,
{
    store
        .get(name)?
        .map(|blob| serde_json::from_str(&blob))
        .transpose()
        .map_err(Into::into)
}

/// Serialize and write a blob.
///
/// # Errors
///
/// Returns error if serialization or the write fails.
pub fn write_json<T>(store: &dyn BlobStore, name: &str, value: &T) -> Result<()>
where
    T: Serialize,
{
    let json = serde_json::to_string_pretty(value)?;
    store.set(name, &json)
}

fn segments(name: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = name.split('/').collect();
    if parts
        .iter()
        .any(|p| p.is_empty() || *p == "." || *p == "..")
    {
        return Err(StorageError::InvalidKey(name.to_string()));
    }
    Ok(parts)
}

/// Filesystem storage, one JSON file per blob.
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create a new storage instance at the default location.
    ///
    /// # Errors
    ///
    /// Returns error if data directory cannot be determined.
    pub fn new() -> anyhow::Result<Self> {
        let root = Config::data_dir()?.join("storage");
        Ok(Self { root })
    }

    /// Create a storage instance at a custom location.
    #[must_use]
    pub const fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the storage root path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build a path from a blob name.
    fn path(&self, name: &str) -> Result<PathBuf> {
        let parts = segments(name)?;
        let mut path = self.root.clone();
        if let Some((last, dirs)) = parts.split_last() {
            for dir in dirs {
                path.push(dir);
            }
            // Generation tags contain dots, so set_extension would truncate them.
            path.push(format!("{last}.json"));
        }
        Ok(path)
    }

    fn dir(&self, prefix: &str) -> Result<PathBuf> {
        let mut dir = self.root.clone();
        for segment in segments(prefix)? {
            dir.push(segment);
        }
        Ok(dir)
    }
}

impl BlobStore for Storage {
    fn get(&self, name: &str) -> Result<Option<String>> {
        let path = self.path(name)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&path)?))
    }

    fn set(&self, name: &str, blob: &str) -> Result<()> {
        let path = self.path(name)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write to a sibling file first so readers never see a torn blob.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, blob)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.path(name)?;
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.dir(prefix)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
            {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn groups(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.dir(prefix)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn remove_group(&self, prefix: &str) -> Result<()> {
        let dir = self.dir(prefix)?;
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// In-memory storage for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    blobs: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStorage {
    fn get(&self, name: &str) -> Result<Option<String>> {
        segments(name)?;
        Ok(self.blobs.lock().get(name).cloned())
    }

    fn set(&self, name: &str, blob: &str) -> Result<()> {
        segments(name)?;
        self.blobs.lock().insert(name.to_string(), blob.to_string());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.blobs.lock().remove(name);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        segments(prefix)?;
        let dir = format!("{prefix}/");
        Ok(self
            .blobs
            .lock()
            .keys()
            .filter_map(|k| k.strip_prefix(&dir))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    fn groups(&self, prefix: &str) -> Result<Vec<String>> {
        segments(prefix)?;
        let dir = format!("{prefix}/");
        let mut names: Vec<String> = self
            .blobs
            .lock()
            .keys()
            .filter_map(|k| k.strip_prefix(&dir))
            .filter_map(|rest| rest.split_once('/'))
            .map(|(group, _)| group.to_string())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn remove_group(&self, prefix: &str) -> Result<()> {
        segments(prefix)?;
        let dir = format!("{prefix}/");
        self.blobs.lock().retain(|k, _| !k.starts_with(&dir));
        Ok(())
    }
}
