//! Statically declared binding table
//!
//! The host describes which of its values are tunable as a tree of scopes.
//! Each scope maps to a remote sub-table named after it.

use crate::error::CallbackError;
use crate::property::{Property, Scalar, ValueSlot};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Zero-argument procedure run after a remote-driven update is applied
pub type Callback = Arc<dyn Fn() -> Result<(), CallbackError> + Send + Sync>;

/// What backs a declared value
#[derive(Debug, Clone)]
pub enum DeclaredValue {
    Supported(ValueSlot),
    /// The host declared a value of a type the engine cannot carry
    Unsupported { type_name: String },
}

/// One declared value of a scope
#[derive(Debug, Clone)]
pub struct ValueDescriptor {
    pub name: String,
    pub value: DeclaredValue,
    /// Read-only values are not eligible and are skipped
    pub read_only: bool,
    /// `None` means no callback; `Some("")` is a declaration error
    pub callback: Option<String>,
}

impl ValueDescriptor {
    pub fn new<T: Scalar>(name: impl Into<String>, property: &Property<T>) -> Self {
        Self {
            name: name.into(),
            value: DeclaredValue::Supported(property.slot()),
            read_only: false,
            callback: None,
        }
    }

    pub fn unsupported(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: DeclaredValue::Unsupported {
                type_name: type_name.into(),
            },
            read_only: false,
            callback: None,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn callback(mut self, name: impl Into<String>) -> Self {
        self.callback = Some(name.into());
        self
    }
}

/// A value set and its nested sub-scopes
#[derive(Clone, Default)]
pub struct ScopeDescriptor {
    pub name: String,
    pub values: Vec<ValueDescriptor>,
    pub callbacks: HashMap<String, Callback>,
    pub children: Vec<ScopeDescriptor>,
}

impl ScopeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn value(mut self, descriptor: ValueDescriptor) -> Self {
        self.values.push(descriptor);
        self
    }

    /// Declare a procedure values of this scope may name as their callback
    pub fn callback<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), Arc::new(f));
        self
    }

    pub fn child(mut self, scope: ScopeDescriptor) -> Self {
        self.children.push(scope);
        self
    }
}

impl fmt::Debug for ScopeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut callbacks: Vec<&String> = self.callbacks.keys().collect();
        callbacks.sort();
        f.debug_struct("ScopeDescriptor")
            .field("name", &self.name)
            .field("values", &self.values)
            .field("callbacks", &callbacks)
            .field("children", &self.children)
            .finish()
    }
}
