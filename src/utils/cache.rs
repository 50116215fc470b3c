use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Segment cache with per-entry TTL, shared by all segment tasks of a process.
///
/// Expiry is checked lazily on read. When opened from a file the store can be
/// written back with [`CacheStore::persist`]; concurrent writers of the same
/// key resolve as last-writer-wins.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    data: Arc<DashMap<String, CacheEntry>>,
    path: Option<PathBuf>,
    dirty: Arc<AtomicBool>,
}

impl CacheStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// `<cache dir>/shell-powerline/cache.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("shell-powerline").join("cache.json"))
    }

    /// Load the store from `path`. A missing or corrupt file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = DashMap::new();

        if path.exists() {
            match load_entries(&path) {
                Ok(entries) => {
                    let now = Utc::now();
                    for (key, entry) in entries {
                        if !entry.is_expired(now) {
                            data.insert(key, entry);
                        }
                    }
                    debug!(path = %path.display(), entries = data.len(), "loaded segment cache");
                }
                Err(err) => warn!(path = %path.display(), error = %err, "ignoring corrupt segment cache"),
            }
        }

        Self {
            data: Arc::new(data),
            path: Some(path),
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Utc::now();

        {
            let entry = self.data.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }

        self.data.remove_if(key, |_, entry| entry.is_expired(now));
        self.dirty.store(true, Ordering::Relaxed);
        None
    }

    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.data.insert(key.into(), CacheEntry { value, expires_at });
        self.dirty.store(true, Ordering::Relaxed);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.data.remove(key).map(|(_, entry)| entry.value);
        if removed.is_some() {
            self.dirty.store(true, Ordering::Relaxed);
        }
        removed
    }

    pub fn clear(&self) {
        self.data.clear();
        self.dirty.store(true, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the store back to its file (temp file + rename). No-op for
    /// in-memory stores or when nothing changed.
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if !self.dirty.swap(false, Ordering::Relaxed) {
            return Ok(());
        }

        let now = Utc::now();
        let entries: HashMap<String, CacheEntry> = self
            .data
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
        }

        let content = serde_json::to_vec(&entries).context("Failed to serialize segment cache")?;
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write cache file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace cache file: {}", path.display()))?;

        debug!(path = %path.display(), entries = entries.len(), "persisted segment cache");
        Ok(())
    }
}

fn load_entries(path: &Path) -> Result<HashMap<String, CacheEntry>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open cache file: {}", path.display()))?;

    if file.metadata()?.len() == 0 {
        return Ok(HashMap::new());
    }

    let mmap = unsafe {
        Mmap::map(&file).with_context(|| format!("Failed to mmap cache file: {}", path.display()))?
    };

    // simd-json parses in place, so it needs its own mutable copy.
    let mut bytes = mmap.to_vec();
    match simd_json::serde::from_slice::<HashMap<String, CacheEntry>>(&mut bytes) {
        Ok(entries) => Ok(entries),
        Err(_) => serde_json::from_slice(&mmap)
            .with_context(|| format!("Failed to parse cache file: {}", path.display())),
    }
}
