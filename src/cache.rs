//! A small on-disk cache of the list summary used to paint the list
//! picker instantly, before a pull has had a chance to run.
//!
//! It holds no task bodies and nothing a sync conflict could ever depend
//! on: if it's missing, stale, or scoped to a different provider it is
//! silently discarded and rebuilt from [`crate::store::TaskStore`], never
//! treated as an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::TaskStore;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CachedList {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub color: String,
    pub task_count: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct CacheFile {
    created_at: DateTime<Utc>,
    provider_id: String,
    lists: Vec<CachedList>,
}

/// Tunables for [`ListCache`], handed to a caller that holds the concrete
/// path (XDG cache dir for the CLI, a tempdir for tests).
#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

/// Reads and writes the list summary cache at a fixed path, discarding
/// anything that doesn't look like it still applies.
pub struct ListCache {
    path: PathBuf,
    ttl: Duration,
}

impl ListCache {
    pub fn new(path: PathBuf, ttl: Duration) -> Self {
        Self { path, ttl }
    }

    /// Returns the cached lists if the file exists, parses, hasn't expired,
    /// and was written for this same `provider_id`. Any other outcome
    /// (missing file, corrupt JSON, expired, wrong scope) is logged at
    /// debug level and returns `None` rather than an error.
    pub fn load(&self, provider_id: &str) -> Option<Vec<CachedList>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                log::debug!("list cache not readable at {:?}: {}", self.path, err);
                return None;
            }
        };
        let cached: CacheFile = match serde_json::from_str(&contents) {
            Ok(cached) => cached,
            Err(err) => {
                log::debug!("list cache at {:?} did not parse: {}", self.path, err);
                return None;
            }
        };
        if cached.provider_id != provider_id {
            log::debug!(
                "list cache at {:?} scoped to a different provider, discarding",
                self.path
            );
            return None;
        }
        let age = Utc::now().signed_duration_since(cached.created_at);
        let age = age.to_std().unwrap_or(Duration::MAX);
        if age >= self.ttl {
            log::debug!("list cache at {:?} is stale ({:?} old), discarding", self.path, age);
            return None;
        }
        Some(cached.lists)
    }

    /// Rebuilds the cache contents from the store and writes it to disk.
    pub fn refresh(&self, store: &TaskStore) -> Result<Vec<CachedList>> {
        let lists = store.list_lists()?;
        let mut cached = Vec::with_capacity(lists.len());
        for list in &lists {
            let task_count = store.get_tasks(list.id())?.len() as u64;
            cached.push(CachedList {
                id: list.id(),
                name: list.name().to_string(),
                description: list.description().to_string(),
                color: list.color().to_string(),
                task_count,
                modified: list.modified(),
            });
        }
        self.write(store.provider_id(), &cached)?;
        Ok(cached)
    }

    fn write(&self, provider_id: &str, lists: &[CachedList]) -> Result<()> {
        let file = CacheFile {
            created_at: Utc::now(),
            provider_id: provider_id.to_string(),
            lists: lists.to_vec(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::StorageIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let bytes = serde_json::to_vec(&file)?;
        std::fs::write(&self.path, bytes).map_err(|source| Error::StorageIo {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Drops the cache file entirely. Called on any list mutation, since a
    /// stale `task_count` or name is worse than no cache at all.
    pub fn invalidate(&self) {
        if self.path.exists() {
            if let Err(err) = std::fs::remove_file(&self.path) {
                log::warn!("could not remove list cache at {:?}: {}", self.path, err);
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_with_one_list() -> TaskStore {
        let store = TaskStore::open_in_memory("mock").unwrap();
        store.create_list("Home").unwrap();
        store
    }

    #[test]
    fn refresh_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let cache = ListCache::new(dir.path().join("lists.json"), Duration::from_secs(60));
        let store = store_with_one_list();

        let written = cache.refresh(&store).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].name, "Home");
        assert_eq!(written[0].task_count, 0);

        let loaded = cache.load(store.provider_id()).unwrap();
        assert_eq!(loaded, written);
    }

    #[test]
    fn load_rejects_wrong_provider() {
        let dir = tempdir().unwrap();
        let cache = ListCache::new(dir.path().join("lists.json"), Duration::from_secs(60));
        let store = store_with_one_list();
        cache.refresh(&store).unwrap();

        assert!(cache.load("some-other-provider").is_none());
    }

    #[test]
    fn load_rejects_expired_entry() {
        let dir = tempdir().unwrap();
        let cache = ListCache::new(dir.path().join("lists.json"), Duration::from_millis(1));
        let store = store_with_one_list();
        cache.refresh(&store).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.load(store.provider_id()).is_none());
    }

    #[test]
    fn load_missing_file_returns_none() {
        let dir = tempdir().unwrap();
        let cache = ListCache::new(dir.path().join("nonexistent.json"), Duration::from_secs(60));
        assert!(cache.load("mock").is_none());
    }

    #[test]
    fn invalidate_removes_file() {
        let dir = tempdir().unwrap();
        let cache = ListCache::new(dir.path().join("lists.json"), Duration::from_secs(60));
        let store = store_with_one_list();
        cache.refresh(&store).unwrap();
        assert!(cache.path().exists());

        cache.invalidate();
        assert!(!cache.path().exists());
    }
}
