//! Bounded, newest-first image history mirrored to a key-value slot.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::models::{NewImage, StoredImage, HISTORY_CAPACITY};
use crate::storage::KeyValueStore;

pub const HISTORY_STORAGE_KEY: &str = "image-studio-history";
pub const DISCLAIMER_STORAGE_KEY: &str = "image-studio-disclaimer-acknowledged";

/// The session's image history.
///
/// In-memory state always reflects the latest mutation. Each mutation is
/// followed by a write of the same sequence; a failed write is logged and
/// remembered in [`HistoryStore::persistence_warning`] but never rolled back,
/// so memory and storage can drift apart until the next successful write.
#[derive(Debug)]
pub struct HistoryStore<S: KeyValueStore> {
    storage: S,
    entries: Vec<StoredImage>,
    persistence_warning: Option<String>,
}

impl<S: KeyValueStore> HistoryStore<S> {
    /// Reads the persisted history. A slot that does not parse is treated as
    /// corrupted: it is deleted and the store starts empty. A slot holding
    /// repeated ids or more than [`HISTORY_CAPACITY`] entries keeps the first
    /// occurrence of each id, is cut to capacity, and is written back.
    pub fn load(storage: S) -> Self {
        let mut repaired = false;
        let entries = match storage.get(HISTORY_STORAGE_KEY) {
            Ok(None) => Vec::new(),
            Ok(Some(raw)) => match serde_json::from_str::<Vec<StoredImage>>(&raw) {
                Ok(loaded) => {
                    let loaded_len = loaded.len();
                    let entries = dedupe_and_bound(loaded);
                    if entries.len() != loaded_len {
                        tracing::warn!(
                            loaded = loaded_len,
                            kept = entries.len(),
                            "dropping repeated or excess image history entries"
                        );
                        repaired = true;
                    }
                    entries
                }
                Err(err) => {
                    tracing::warn!(error = %err, "discarding corrupted image history");
                    if let Err(err) = storage.remove(HISTORY_STORAGE_KEY) {
                        tracing::warn!(error = %err, "failed to remove corrupted image history");
                    }
                    Vec::new()
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "failed to read image history; starting empty");
                Vec::new()
            }
        };
        let mut store = Self {
            storage,
            entries: Vec::new(),
            persistence_warning: None,
        };
        if repaired {
            store.save(entries);
        } else {
            store.entries = entries;
        }
        store
    }

    pub fn entries(&self) -> &[StoredImage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&StoredImage> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Entries whose id is in `ids`, in history order.
    pub fn select(&self, ids: &[String]) -> Vec<StoredImage> {
        self.entries
            .iter()
            .filter(|entry| ids.iter().any(|id| id == &entry.id))
            .cloned()
            .collect()
    }

    /// Last persistence failure, cleared by the next successful write.
    pub fn persistence_warning(&self) -> Option<&str> {
        self.persistence_warning.as_deref()
    }

    pub fn add(&mut self, image: NewImage) -> StoredImage {
        let newest = self.entries.first().map(|entry| entry.timestamp);
        let timestamp = now_millis().max(newest.unwrap_or(i64::MIN));
        let mut id = new_image_id(timestamp);
        while self.get(&id).is_some() {
            id = new_image_id(timestamp);
        }
        let stored = image.into_stored(id, timestamp);

        let mut updated = Vec::with_capacity(self.entries.len() + 1);
        updated.push(stored.clone());
        updated.extend(self.entries.iter().cloned());
        self.save(updated);
        stored
    }

    /// Removes the entry with `id`; an unknown id leaves the history as it was.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        let updated: Vec<StoredImage> = self
            .entries
            .iter()
            .filter(|entry| entry.id != id)
            .cloned()
            .collect();
        let removed = updated.len() != before;
        self.save(updated);
        removed
    }

    pub fn clear(&mut self) {
        self.save(Vec::new());
    }

    fn save(&mut self, mut updated: Vec<StoredImage>) {
        updated.truncate(HISTORY_CAPACITY);
        let write = serde_json::to_string(&updated)
            .map_err(anyhow::Error::from)
            .and_then(|payload| self.storage.set(HISTORY_STORAGE_KEY, &payload));
        match write {
            Ok(()) => self.persistence_warning = None,
            Err(err) => {
                let message = format!("{err:#}");
                tracing::warn!(error = %message, "failed to persist image history");
                self.persistence_warning = Some(format!("History was not saved: {message}"));
            }
        }
        self.entries = updated;
    }
}

/// One-time usage disclaimer acknowledgement.
#[derive(Debug)]
pub struct DisclaimerGate<S: KeyValueStore> {
    storage: S,
}

impl<S: KeyValueStore> DisclaimerGate<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn is_acknowledged(&self) -> bool {
        match self.storage.get(DISCLAIMER_STORAGE_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<bool>(&raw).unwrap_or(false),
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read disclaimer acknowledgement");
                false
            }
        }
    }

    pub fn acknowledge(&self) -> anyhow::Result<()> {
        self.storage.set(DISCLAIMER_STORAGE_KEY, "true")
    }
}

fn dedupe_and_bound(entries: Vec<StoredImage>) -> Vec<StoredImage> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.id.clone()))
        .take(HISTORY_CAPACITY)
        .collect()
}

fn new_image_id(timestamp: i64) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!("img-{timestamp}-{}", &nonce[..8])
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}
