//! In-process remote store
//!
//! Holds typed entries keyed by absolute path, delivers listener
//! notifications on the writing thread, and can snapshot its persistent
//! entries to a JSON file so a restarted store comes back with them.

use super::{
    EntryHandle, EntryListener, EntryNotification, ListenerFlags, ListenerId, RemoteStore,
    TableHandle, PATH_SEPARATOR,
};
use crate::error::StoreError;
use crate::models::WireValue;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct StoredEntry {
    value: WireValue,
    persistent: bool,
    /// Commit order of the current value
    sequence: u64,
}

struct Registration {
    key: String,
    flags: ListenerFlags,
    listener: EntryListener,
}

#[derive(Default)]
struct StoreInner {
    entries: BTreeMap<String, StoredEntry>,
    listeners: Vec<Registration>,
    next_listener_id: u64,
    last_sequence: u64,
}

impl StoreInner {
    fn next_sequence(&mut self) -> u64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    fn listeners_for(&self, key: &str, event: ListenerFlags) -> Vec<EntryListener> {
        self.listeners
            .iter()
            .filter(|r| r.key == key && r.flags.intersects(event))
            .map(|r| r.listener.clone())
            .collect()
    }
}

/// Point-in-time view of one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub key: String,
    pub value: WireValue,
    pub persistent: bool,
}

/// Thread-safe in-memory implementation of [`RemoteStore`]
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore the persistent entries saved by [`InMemoryStore::save_persistent`].
    ///
    /// A missing file yields an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        let store = Self::new();
        if !path.exists() {
            debug!(path = %path.display(), "No store snapshot found, starting empty");
            return Ok(store);
        }

        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read store snapshot {:?}", path))?;
        let saved: BTreeMap<String, WireValue> =
            serde_json::from_slice(&data).context("Failed to deserialize store snapshot")?;

        {
            let mut inner = store.inner.lock();
            for (key, value) in saved {
                let sequence = inner.next_sequence();
                inner.entries.insert(
                    key,
                    StoredEntry {
                        value,
                        persistent: true,
                        sequence,
                    },
                );
            }
            info!(path = %path.display(), entries = inner.entries.len(), "Loaded store snapshot");
        }

        Ok(store)
    }

    /// Write all persistent entries to `path`
    pub fn save_persistent(&self, path: &Path) -> Result<usize> {
        let saved: BTreeMap<String, WireValue> = {
            let inner = self.inner.lock();
            inner
                .entries
                .iter()
                .filter(|(_, e)| e.persistent)
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect()
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let json = serde_json::to_vec_pretty(&saved).context("Failed to serialize store snapshot")?;

        // Write atomically using temp file
        let temp_path = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;

        file.write_all(&json).context("Failed to write store snapshot")?;
        file.sync_all().context("Failed to sync store snapshot")?;

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

        debug!(path = %path.display(), entries = saved.len(), "Store snapshot saved");
        Ok(saved.len())
    }

    /// All entries whose key starts with `prefix`, in key order
    pub fn entries(&self, prefix: Option<&str>) -> Vec<EntrySnapshot> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|(k, _)| prefix.map_or(true, |p| k.starts_with(p)))
            .map(|(k, e)| EntrySnapshot {
                key: k.clone(),
                value: e.value.clone(),
                persistent: e.persistent,
            })
            .collect()
    }

    pub fn snapshot(&self, key: &str) -> Option<EntrySnapshot> {
        let inner = self.inner.lock();
        inner.entries.get(key).map(|e| EntrySnapshot {
            key: key.to_string(),
            value: e.value.clone(),
            persistent: e.persistent,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if !key.starts_with(PATH_SEPARATOR) || key.len() < 2 || key.ends_with(PATH_SEPARATOR) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn dispatch(listeners: Vec<EntryListener>, notification: &EntryNotification) {
    for listener in listeners {
        listener(notification);
    }
}

impl RemoteStore for InMemoryStore {
    fn contains_key(&self, table: &TableHandle, key: &str) -> bool {
        self.inner.lock().entries.contains_key(&table.key_path(key))
    }

    fn set_value(&self, entry: &EntryHandle, value: WireValue) -> Result<(), StoreError> {
        let key = entry.key();
        validate_key(key)?;

        let (event, sequence, listeners) = {
            let mut inner = self.inner.lock();
            let sequence = inner.next_sequence();
            let event = match inner.entries.get_mut(key) {
                Some(existing) => {
                    if !existing.value.same_type(&value) {
                        return Err(StoreError::TypeMismatch {
                            key: key.to_string(),
                            existing: existing.value.type_name(),
                            attempted: value.type_name(),
                        });
                    }
                    if existing.value == value {
                        return Ok(());
                    }
                    existing.value = value.clone();
                    existing.sequence = sequence;
                    ListenerFlags::UPDATE
                }
                None => {
                    inner.entries.insert(
                        key.to_string(),
                        StoredEntry {
                            value: value.clone(),
                            persistent: false,
                            sequence,
                        },
                    );
                    ListenerFlags::NEW
                }
            };
            (event, sequence, inner.listeners_for(key, event))
        };

        // Listeners run outside the store lock so they may call back into it.
        // Concurrent writers can therefore deliver out of commit order; the
        // sequence lets receivers discard the older value.
        let notification = EntryNotification {
            key: key.to_string(),
            value,
            flags: event,
            sequence,
        };
        dispatch(listeners, &notification);
        Ok(())
    }

    fn get_value(&self, entry: &EntryHandle) -> Option<WireValue> {
        self.inner
            .lock()
            .entries
            .get(entry.key())
            .map(|e| e.value.clone())
    }

    /// No-op for keys that hold no value yet
    fn set_persistent(&self, entry: &EntryHandle) {
        if let Some(existing) = self.inner.lock().entries.get_mut(entry.key()) {
            existing.persistent = true;
        }
    }

    fn is_persistent(&self, entry: &EntryHandle) -> bool {
        self.inner
            .lock()
            .entries
            .get(entry.key())
            .map_or(false, |e| e.persistent)
    }

    fn add_listener(
        &self,
        entry: &EntryHandle,
        listener: EntryListener,
        flags: ListenerFlags,
    ) -> ListenerId {
        let (id, immediate) = {
            let mut inner = self.inner.lock();
            inner.next_listener_id += 1;
            let id = ListenerId(inner.next_listener_id);

            let immediate = if flags.contains(ListenerFlags::IMMEDIATE) {
                inner.entries.get(entry.key()).map(|e| EntryNotification {
                    key: entry.key().to_string(),
                    value: e.value.clone(),
                    flags: ListenerFlags::IMMEDIATE,
                    sequence: e.sequence,
                })
            } else {
                None
            };

            inner.listeners.push(Registration {
                key: entry.key().to_string(),
                flags,
                listener: listener.clone(),
            });
            (id, immediate)
        };

        if let Some(notification) = immediate {
            listener(&notification);
        }

        debug!(key = %entry.key(), listener_id = id.0, "Listener registered");
        id
    }
}
