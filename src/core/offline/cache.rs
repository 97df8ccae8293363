//! Versioned response cache.
//!
//! Responses live inside named generations. When backed by a [`BlobStore`],
//! each response is its own blob under `cache/<tag>/`, so a put rewrites
//! one entry and deleting a generation removes the whole group.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::request::Response;
use crate::core::storage::{BlobStore, read_json, write_json};

const CACHE_PREFIX: &str = "cache";

/// A cached response and the blob it is persisted in.
struct Entry {
    blob: String,
    response: Response,
}

type Generation = BTreeMap<String, Entry>;

/// On-disk form of one entry.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    response: Response,
}

fn group_name(tag: &str) -> String {
    format!("{CACHE_PREFIX}/{tag}")
}

fn blob_name(tag: &str, blob: &str) -> String {
    format!("{CACHE_PREFIX}/{tag}/{blob}")
}

/// Responses grouped by generation tag.
#[derive(Default)]
pub struct CacheStorage {
    generations: RwLock<BTreeMap<String, Generation>>,
    store: Option<Arc<dyn BlobStore>>,
    /// Serializes blob writes in the order the map was updated.
    writes: Mutex<()>,
}

fn load_generation(store: &dyn BlobStore, tag: &str) -> Generation {
    let names = match store.list(&group_name(tag)) {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(generation = %tag, error = %e, "cannot list cached entries");
            return Generation::new();
        }
    };

    let mut entries = Generation::new();
    for blob in names {
        match read_json::<StoredEntry>(store, &blob_name(tag, &blob)) {
            Ok(Some(stored)) => {
                entries.insert(
                    stored.key,
                    Entry {
                        blob,
                        response: stored.response,
                    },
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(generation = %tag, blob = %blob, error = %e, "dropping unreadable entry");
            }
        }
    }
    entries
}

impl CacheStorage {
    /// A cache that lives only as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A cache persisted through `store`, loading any generations already there.
    ///
    /// Entries that cannot be read are dropped.
    #[must_use]
    pub fn persistent(store: Arc<dyn BlobStore>) -> Self {
        let mut generations = BTreeMap::new();
        match store.groups(CACHE_PREFIX) {
            Ok(tags) => {
                for tag in tags {
                    let entries = load_generation(&*store, &tag);
                    if !entries.is_empty() {
                        generations.insert(tag, entries);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "cannot list cached generations"),
        }
        tracing::debug!(count = generations.len(), "cache loaded");

        Self {
            generations: RwLock::new(generations),
            store: Some(store),
            writes: Mutex::new(()),
        }
    }

    /// Store a response, replacing any previous entry for the key.
    pub fn put(&self, generation: &str, key: &str, response: Response) {
        let stored = self.store.as_ref().map(|_| StoredEntry {
            key: key.to_string(),
            response: response.clone(),
        });

        let mut generations = self.generations.write();
        let entries = generations.entry(generation.to_string()).or_default();
        let blob = entries
            .get(key)
            .map_or_else(|| Ulid::new().to_string(), |e| e.blob.clone());
        entries.insert(
            key.to_string(),
            Entry {
                blob: blob.clone(),
                response,
            },
        );

        let (Some(store), Some(stored)) = (&self.store, stored) else {
            return;
        };
        // Take the write lock before releasing the map so blobs land in map order.
        let _write = self.writes.lock();
        drop(generations);
        if let Err(e) = write_json(&**store, &blob_name(generation, &blob), &stored) {
            tracing::warn!(generation, key, error = %e, "cannot persist cache entry");
        }
    }

    /// Look up a response.
    #[must_use]
    pub fn get(&self, generation: &str, key: &str) -> Option<Response> {
        self.generations
            .read()
            .get(generation)
            .and_then(|entries| entries.get(key))
            .map(|entry| entry.response.clone())
    }

    /// Delete a generation and every response in it. Returns whether it existed.
    pub fn delete(&self, generation: &str) -> bool {
        let mut generations = self.generations.write();
        let existed = generations.remove(generation).is_some();
        if let Some(store) = &self.store {
            let _write = self.writes.lock();
            drop(generations);
            if let Err(e) = store.remove_group(&group_name(generation)) {
                tracing::warn!(generation, error = %e, "cannot remove persisted generation");
            }
        }
        existed
    }

    /// Tags of every stored generation, sorted.
    #[must_use]
    pub fn generations(&self) -> Vec<String> {
        self.generations.read().keys().cloned().collect()
    }

    /// Keys stored in a generation, sorted.
    #[must_use]
    pub fn keys(&self, generation: &str) -> Vec<String> {
        self.generations
            .read()
            .get(generation)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}
