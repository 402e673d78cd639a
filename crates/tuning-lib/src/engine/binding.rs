//! Persistent association between one local value and one remote entry

use super::queue::BindingId;
use crate::error::EngineError;
use crate::models::{PropertyValue, ValueKind, WireValue};
use crate::property::ValueSlot;
use crate::registry::{BindingSpec, ResolvedCallback};
use crate::store::{EntryHandle, TableHandle};
use tracing::debug;

/// A registered binding. Lives as long as its engine and is never rebound.
#[derive(Debug)]
pub struct Binding {
    id: BindingId,
    key: String,
    kind: ValueKind,
    slot: ValueSlot,
    callback: Option<ResolvedCallback>,
    table: TableHandle,
    entry: EntryHandle,
}

impl Binding {
    pub(crate) fn new(id: BindingId, spec: BindingSpec, entry: EntryHandle) -> Self {
        Self {
            id,
            key: entry.key().to_string(),
            kind: spec.kind,
            slot: spec.slot,
            callback: spec.callback,
            table: spec.table,
            entry,
        }
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn table(&self) -> &TableHandle {
        &self.table
    }

    pub fn entry(&self) -> &EntryHandle {
        &self.entry
    }

    pub fn callback_name(&self) -> Option<&str> {
        self.callback.as_ref().map(|c| c.name.as_str())
    }

    /// Write a remote payload into the local value, then run the callback.
    ///
    /// The callback is skipped when the write itself fails.
    pub(crate) fn apply(&self, raw: &WireValue) -> Result<PropertyValue, EngineError> {
        let value =
            PropertyValue::from_wire(self.kind, raw).ok_or_else(|| EngineError::WireTypeMismatch {
                key: self.key.clone(),
                expected: self.kind,
                found: raw.type_name(),
            })?;

        if !self.slot.write(value) {
            return Err(EngineError::InaccessibleValue {
                key: self.key.clone(),
            });
        }
        debug!(key = %self.key, value = %value, "Applied remote value");

        if let Some(callback) = &self.callback {
            (callback.procedure)().map_err(|source| EngineError::CallbackInvocationFailure {
                key: self.key.clone(),
                callback: callback.name.clone(),
                source,
            })?;
        }

        Ok(value)
    }
}
