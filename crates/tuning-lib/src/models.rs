//! Core value models shared by the registry, the engine and the remote store

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of scalar kinds a binding can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Float64,
    Int32,
    Bool,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Float64 => "float64",
            ValueKind::Int32 => "int32",
            ValueKind::Bool => "bool",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed local value of a binding
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    Float64(f64),
    Int32(i32),
    Bool(bool),
}

impl PropertyValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            PropertyValue::Float64(_) => ValueKind::Float64,
            PropertyValue::Int32(_) => ValueKind::Int32,
            PropertyValue::Bool(_) => ValueKind::Bool,
        }
    }

    /// Convert a payload delivered by the remote store into the given kind.
    ///
    /// The store has no 32-bit integer type, so `Int32` values travel as
    /// doubles and are truncated toward zero here (saturating, NaN -> 0).
    /// Returns `None` when the payload shape does not match the kind.
    pub fn from_wire(kind: ValueKind, wire: &WireValue) -> Option<Self> {
        match (kind, wire) {
            (ValueKind::Float64, WireValue::Double(v)) => Some(PropertyValue::Float64(*v)),
            (ValueKind::Int32, WireValue::Double(v)) => Some(PropertyValue::Int32(*v as i32)),
            (ValueKind::Bool, WireValue::Boolean(v)) => Some(PropertyValue::Bool(*v)),
            _ => None,
        }
    }

    /// Payload published to the remote store for this value
    pub fn to_wire(&self) -> WireValue {
        match *self {
            PropertyValue::Float64(v) => WireValue::Double(v),
            PropertyValue::Int32(v) => WireValue::Double(f64::from(v)),
            PropertyValue::Bool(v) => WireValue::Boolean(v),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Float64(v) => write!(f, "{}", v),
            PropertyValue::Int32(v) => write!(f, "{}", v),
            PropertyValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// Untyped payload as transported by the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    Boolean(bool),
    Double(f64),
    String(String),
}

impl WireValue {
    /// Name of the wire type, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::Boolean(_) => "boolean",
            WireValue::Double(_) => "double",
            WireValue::String(_) => "string",
        }
    }

    pub fn same_type(&self, other: &WireValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Boolean(v) => write!(f, "{}", v),
            WireValue::Double(v) => write!(f, "{}", v),
            WireValue::String(v) => f.write_str(v),
        }
    }
}
