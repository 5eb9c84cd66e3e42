//! String key-value storage used for settings, schedule metadata and the
//! prayer-time cache.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result, anyhow};

pub const SETTINGS_KEY: &str = "@prayer_settings";
pub const SCHEDULE_META_KEY: &str = "@prayer_scheduled_meta_v3";
pub const CACHED_TIMES_KEY: &str = "@cached_prayer_data";
pub const SELECTED_LOCATION_KEY: &str = "@selected_location";

/// Minimal get/set/remove string store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

// ==================== JSON File Store ====================

/// Store backed by a single JSON object file (`{"key": "value", ...}`).
///
/// A missing file reads as empty. A corrupt file is logged and read as
/// empty; the next write replaces it.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store file {}", self.path.display()))?;

        match serde_json::from_str(&raw) {
            Ok(map) => Ok(map),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Store file is corrupt, treating as empty: {}",
                    e
                );
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(map).context("Failed to serialize store")?;

        // Sibling tmp file, then rename over the store.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock.lock().map_err(|_| anyhow!("store lock poisoned"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock()?;
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock()?;
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock()?;
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

// ==================== Memory Store ====================

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    failing_writes: HashSet<String>,
    fail_reads: bool,
}

/// In-memory store for tests. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `set`/`remove` on `key` fail until cleared.
    pub fn fail_writes_for(&self, key: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing_writes
            .insert(key.to_string());
    }

    /// Stop injecting write failures.
    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failing_writes.clear();
        inner.fail_reads = false;
    }

    /// Make every `get` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reads = fail;
    }

    /// Raw value, bypassing failure injection.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().values.get(key).cloned()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_reads {
            return Err(anyhow!("injected read failure for {}", key));
        }
        Ok(inner.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_writes.contains(key) {
            return Err(anyhow!("injected write failure for {}", key));
        }
        inner.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_writes.contains(key) {
            return Err(anyhow!("injected write failure for {}", key));
        }
        inner.values.remove(key);
        Ok(())
    }
}
