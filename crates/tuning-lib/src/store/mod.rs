//! Remote key-value store capability
//!
//! The engine talks to the store only through [`RemoteStore`], which is
//! passed in at construction. Keys are absolute `/`-separated paths
//! (`/Drivetrain/Pid/kP`); a table is the set of keys sharing a path prefix.

mod memory;

pub use memory::{EntrySnapshot, InMemoryStore};

use crate::error::StoreError;
use crate::models::WireValue;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Path separator for tables and keys
pub const PATH_SEPARATOR: char = '/';

/// Handle to a table (a key prefix) in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableHandle {
    path: String,
}

impl TableHandle {
    /// Normalizes `path` to an absolute path without a trailing separator
    pub fn new(path: &str) -> Self {
        let trimmed = path.trim_matches(PATH_SEPARATOR);
        Self {
            path: format!("{}{}", PATH_SEPARATOR, trimmed),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn sub_table(&self, name: &str) -> TableHandle {
        TableHandle::new(&self.key_path(name))
    }

    /// Full key path of `name` inside this table
    pub fn key_path(&self, name: &str) -> String {
        if self.path.len() == 1 {
            format!("{}{}", PATH_SEPARATOR, name)
        } else {
            format!("{}{}{}", self.path, PATH_SEPARATOR, name)
        }
    }
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Handle to a single entry in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryHandle {
    key: String,
}

impl EntryHandle {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for EntryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Which events a listener subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerFlags(u8);

impl ListenerFlags {
    /// Deliver the current value right away when the listener is added
    pub const IMMEDIATE: ListenerFlags = ListenerFlags(0x01);
    /// Fire when the key is created
    pub const NEW: ListenerFlags = ListenerFlags(0x02);
    /// Fire when an existing key changes value
    pub const UPDATE: ListenerFlags = ListenerFlags(0x04);

    pub const fn empty() -> Self {
        ListenerFlags(0)
    }

    pub const fn contains(self, other: ListenerFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: ListenerFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ListenerFlags {
    type Output = ListenerFlags;

    fn bitor(self, rhs: ListenerFlags) -> ListenerFlags {
        ListenerFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ListenerFlags {
    fn bitor_assign(&mut self, rhs: ListenerFlags) {
        self.0 |= rhs.0;
    }
}

/// Event delivered to an entry listener
#[derive(Debug, Clone, PartialEq)]
pub struct EntryNotification {
    pub key: String,
    pub value: WireValue,
    /// The single event that triggered this delivery
    pub flags: ListenerFlags,
    /// Commit order of `value` in the store, increasing per key.
    ///
    /// Deliveries may arrive out of this order when writers race.
    pub sequence: u64,
}

/// Callback invoked by the store, possibly on a thread the host does not own
pub type EntryListener = Arc<dyn Fn(&EntryNotification) + Send + Sync>;

/// Identifier of a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Capability required from the remote key-value store
pub trait RemoteStore: Send + Sync {
    /// Get (or lazily create) the table rooted at `path`
    fn table(&self, path: &str) -> TableHandle {
        TableHandle::new(path)
    }

    fn sub_table(&self, table: &TableHandle, name: &str) -> TableHandle {
        table.sub_table(name)
    }

    fn entry(&self, table: &TableHandle, key: &str) -> EntryHandle {
        EntryHandle::new(table.key_path(key))
    }

    fn contains_key(&self, table: &TableHandle, key: &str) -> bool;

    fn set_value(&self, entry: &EntryHandle, value: WireValue) -> Result<(), StoreError>;

    fn get_value(&self, entry: &EntryHandle) -> Option<WireValue>;

    /// Keep the entry across restarts of the store
    fn set_persistent(&self, entry: &EntryHandle);

    fn is_persistent(&self, entry: &EntryHandle) -> bool;

    fn add_listener(
        &self,
        entry: &EntryHandle,
        listener: EntryListener,
        flags: ListenerFlags,
    ) -> ListenerId;

    /// Force outstanding writes out to peers
    fn flush(&self) {}

    fn set_double(&self, entry: &EntryHandle, value: f64) -> Result<(), StoreError> {
        self.set_value(entry, WireValue::Double(value))
    }

    /// Integers are carried as doubles
    fn set_int(&self, entry: &EntryHandle, value: i32) -> Result<(), StoreError> {
        self.set_value(entry, WireValue::Double(f64::from(value)))
    }

    fn set_boolean(&self, entry: &EntryHandle, value: bool) -> Result<(), StoreError> {
        self.set_value(entry, WireValue::Boolean(value))
    }

    fn set_string(&self, entry: &EntryHandle, value: &str) -> Result<(), StoreError> {
        self.set_value(entry, WireValue::String(value.to_string()))
    }

    fn get_double(&self, entry: &EntryHandle) -> Option<f64> {
        match self.get_value(entry)? {
            WireValue::Double(v) => Some(v),
            _ => None,
        }
    }

    /// Truncates the stored double toward zero
    fn get_int(&self, entry: &EntryHandle) -> Option<i32> {
        self.get_double(entry).map(|v| v as i32)
    }

    fn get_boolean(&self, entry: &EntryHandle) -> Option<bool> {
        match self.get_value(entry)? {
            WireValue::Boolean(v) => Some(v),
            _ => None,
        }
    }
}
