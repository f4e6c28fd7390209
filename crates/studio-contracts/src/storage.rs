use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde_json::{Map, Value};

/// Durable string slots addressed by key.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        (**self).remove(key)
    }
}

/// Key-value slots kept in a single JSON object file.
///
/// Every call re-reads the file and writes only the touched key back, so two
/// handles on the same path do not clobber each other's keys. A file that is
/// not a JSON object is treated as empty and replaced by the next write.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> anyhow::Result<Map<String, Value>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed reading {}", self.path.display()))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "state file does not hold a JSON object; starting from empty state"
                );
                Ok(Map::new())
            }
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "state file is not valid JSON; starting from empty state"
                );
                Ok(Map::new())
            }
        }
    }

    fn write(&self, payload: &Map<String, Value>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            &self.path,
            serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
        )
        .with_context(|| format!("failed writing {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .read()?
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut on_disk = self.read()?;
        on_disk.insert(key.to_string(), Value::String(value.to_string()));
        self.write(&on_disk)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut on_disk = self.read()?;
        if on_disk.remove(key).is_some() {
            self.write(&on_disk)?;
        }
        Ok(())
    }
}

/// In-memory slots; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    slots: BTreeMap<String, String>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `set`/`remove` fail, as a full or revoked medium would.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_writes = fail;
        }
    }

    fn with_inner<T>(
        &self,
        op: impl FnOnce(&mut MemoryStoreInner) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        op(&mut inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.with_inner(|inner| Ok(inner.slots.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.with_inner(|inner| {
            if inner.fail_writes {
                anyhow::bail!("storage quota exceeded writing '{key}'");
            }
            inner.slots.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.with_inner(|inner| {
            if inner.fail_writes {
                anyhow::bail!("storage unavailable removing '{key}'");
            }
            inner.slots.remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonFileStore, KeyValueStore, MemoryStore};

    #[test]
    fn file_store_round_trips_values() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonFileStore::new(temp.path().join("nested").join("state.json"));
        assert_eq!(store.get("key")?, None);
        store.set("key", "[1,2]")?;
        assert_eq!(store.get("key")?.as_deref(), Some("[1,2]"));
        store.remove("key")?;
        assert_eq!(store.get("key")?, None);
        Ok(())
    }

    #[test]
    fn file_store_handles_do_not_clobber_each_other() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("state.json");
        let a = JsonFileStore::new(&path);
        let b = JsonFileStore::new(&path);

        a.set("a", "1")?;
        b.set("b", "2")?;
        a.set("c", "3")?;

        let reloaded = JsonFileStore::new(path);
        assert_eq!(reloaded.get("a")?.as_deref(), Some("1"));
        assert_eq!(reloaded.get("b")?.as_deref(), Some("2"));
        assert_eq!(reloaded.get("c")?.as_deref(), Some("3"));
        Ok(())
    }

    #[test]
    fn file_store_replaces_corrupt_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("state.json");
        std::fs::write(&path, "{truncated")?;
        let store = JsonFileStore::new(&path);
        assert_eq!(store.get("key")?, None);

        store.set("key", "1")?;
        store.set("other", "2")?;
        store.remove("other")?;
        let reloaded = JsonFileStore::new(&path);
        assert_eq!(reloaded.get("key")?.as_deref(), Some("1"));
        let on_disk: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert!(on_disk.is_object());

        std::fs::write(&path, "[1, 2, 3]")?;
        assert_eq!(store.get("key")?, None);
        store.remove("key")?;
        store.set("key", "3")?;
        assert_eq!(store.get("key")?.as_deref(), Some("3"));
        Ok(())
    }

    #[test]
    fn file_store_reports_unreadable_path() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = JsonFileStore::new(temp.path());
        assert!(store.get("key").is_err());
        assert!(store.set("key", "1").is_err());
        Ok(())
    }

    #[test]
    fn memory_store_clones_share_slots() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("key", "value")?;
        assert_eq!(other.get("key")?.as_deref(), Some("value"));

        other.set_fail_writes(true);
        assert!(store.set("key", "next").is_err());
        assert!(store.remove("key").is_err());
        assert_eq!(store.get("key")?.as_deref(), Some("value"));
        Ok(())
    }
}
