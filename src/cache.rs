// File: src/cache.rs
// Local durable key-value cache for view preferences. Not a system of record
// for tasks: those always come from the remote tree.
use crate::paths::AppPaths;
use anyhow::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;

pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// JSON file of string pairs (`view.json` in the cache dir).
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(AppPaths::get_view_cache_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Helper to get a sidecar lock file path (e.g., "view.json.lock")
    fn get_lock_path(&self) -> PathBuf {
        let mut lock_path = self.path.clone();
        if let Some(ext) = lock_path.extension() {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".lock");
            lock_path.set_extension(new_ext);
        } else {
            lock_path.set_extension("lock");
        }
        lock_path
    }

    /// Execute a closure while holding an exclusive lock on the sidecar file.
    fn with_lock<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.get_lock_path())?;

        file.lock_exclusive()?;
        let result = f();
        file.unlock()?;
        result
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let json = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Atomic write: Write to .tmp file then rename
    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(map)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        self.with_lock(|| {
            // A corrupt file is replaced rather than blocking every later write.
            let mut map = self.read_map().unwrap_or_default();
            f(&mut map);
            self.write_map(&map)
        })
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        match self.with_lock(|| self.read_map()) {
            Ok(mut map) => map.remove(key),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "unreadable view cache");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|map| {
            map.remove(key);
        })
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|map| map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Ok(mut map) = self.entries.lock() {
            map.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if let Ok(mut map) = self.entries.lock() {
            map.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_cache_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("view.json");

        let cache = FileCache::new(path.clone());
        assert_eq!(cache.get("activeButton"), None);
        cache.set("activeButton", "Filter").expect("set");
        cache.set("other", "1").expect("set");
        cache.remove("other").expect("remove");

        let reopened = FileCache::new(path);
        assert_eq!(reopened.get("activeButton").as_deref(), Some("Filter"));
        assert_eq!(reopened.get("other"), None);
    }

    #[test]
    fn test_corrupt_file_reads_as_empty_and_is_rewritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("view.json");
        fs::write(&path, "{not json").expect("write");

        let cache = FileCache::new(path);
        assert_eq!(cache.get("activeButton"), None);
        cache.set("activeButton", "Today").expect("set");
        assert_eq!(cache.get("activeButton").as_deref(), Some("Today"));
    }
}
