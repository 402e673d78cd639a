//! Host-side storage for tunable values
//!
//! A [`Property`] is owned by the host program and read at will from its
//! control thread. The binding table only holds a [`ValueSlot`], a weak,
//! kind-tagged view of the same cell, so the engine never keeps host state
//! alive on its own.

use crate::models::{PropertyValue, ValueKind};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Scalar types that can back a [`Property`]
pub trait Scalar: Copy + Send + Sync + 'static {
    const KIND: ValueKind;

    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

impl Scalar for f64 {
    const KIND: ValueKind = ValueKind::Float64;

    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }

    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

impl Scalar for i32 {
    const KIND: ValueKind = ValueKind::Int32;

    fn to_bits(self) -> u64 {
        u64::from(self as u32)
    }

    fn from_bits(bits: u64) -> Self {
        bits as u32 as i32
    }
}

impl Scalar for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn to_bits(self) -> u64 {
        u64::from(self)
    }

    fn from_bits(bits: u64) -> Self {
        bits != 0
    }
}

/// A named tunable value owned by the host
///
/// Clones share the same storage.
pub struct Property<T: Scalar> {
    cell: Arc<AtomicU64>,
    _kind: PhantomData<T>,
}

impl<T: Scalar> Property<T> {
    pub fn new(initial: T) -> Self {
        Self {
            cell: Arc::new(AtomicU64::new(initial.to_bits())),
            _kind: PhantomData,
        }
    }

    pub fn get(&self) -> T {
        T::from_bits(self.cell.load(Ordering::Acquire))
    }

    pub fn set(&self, value: T) {
        self.cell.store(value.to_bits(), Ordering::Release);
    }

    /// Non-owning handle used by the binding table
    pub fn slot(&self) -> ValueSlot {
        ValueSlot {
            kind: T::KIND,
            cell: Arc::downgrade(&self.cell),
        }
    }
}

impl<T: Scalar> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            _kind: PhantomData,
        }
    }
}

impl<T: Scalar + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Scalar + fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.get()).finish()
    }
}

/// Kind-tagged weak reference to a property's storage
#[derive(Clone)]
pub struct ValueSlot {
    kind: ValueKind,
    cell: Weak<AtomicU64>,
}

impl ValueSlot {
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Current value, or `None` once the host dropped the property
    pub fn read(&self) -> Option<PropertyValue> {
        let cell = self.cell.upgrade()?;
        let bits = cell.load(Ordering::Acquire);
        Some(match self.kind {
            ValueKind::Float64 => PropertyValue::Float64(f64::from_bits(bits)),
            ValueKind::Int32 => PropertyValue::Int32(i32::from_bits(bits)),
            ValueKind::Bool => PropertyValue::Bool(bool::from_bits(bits)),
        })
    }

    /// Store a value of this slot's kind. Returns false when the property is
    /// gone or the value has another kind.
    pub fn write(&self, value: PropertyValue) -> bool {
        let bits = match (self.kind, value) {
            (ValueKind::Float64, PropertyValue::Float64(v)) => v.to_bits(),
            (ValueKind::Int32, PropertyValue::Int32(v)) => Scalar::to_bits(v),
            (ValueKind::Bool, PropertyValue::Bool(v)) => Scalar::to_bits(v),
            _ => return false,
        };

        match self.cell.upgrade() {
            Some(cell) => {
                cell.store(bits, Ordering::Release);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ValueSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSlot")
            .field("kind", &self.kind)
            .field("live", &(self.cell.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_clones_share_storage() {
        let speed = Property::new(10.0);
        let view = speed.clone();

        speed.set(25.5);
        assert_eq!(view.get(), 25.5);
    }

    #[test]
    fn test_negative_int_round_trips_through_cell() {
        let offset = Property::new(-42i32);
        assert_eq!(offset.get(), -42);
        assert_eq!(offset.slot().read(), Some(PropertyValue::Int32(-42)));
    }

    #[test]
    fn test_slot_writes_through_to_property() {
        let enabled = Property::new(false);
        let slot = enabled.slot();

        assert_eq!(slot.kind(), ValueKind::Bool);
        assert!(slot.write(PropertyValue::Bool(true)));
        assert!(enabled.get());
    }

    #[test]
    fn test_slot_rejects_other_kind() {
        let speed = Property::new(1.0);
        let slot = speed.slot();

        assert!(!slot.write(PropertyValue::Int32(3)));
        assert_eq!(speed.get(), 1.0);
    }

    #[test]
    fn test_slot_after_drop_is_inaccessible() {
        let speed = Property::new(1.0);
        let slot = speed.slot();
        drop(speed);

        assert!(slot.read().is_none());
        assert!(!slot.write(PropertyValue::Float64(2.0)));
    }
}
