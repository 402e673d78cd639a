//! Binding discovery
//!
//! Flattens a [`ScopeDescriptor`] tree into one [`BindingSpec`] per eligible
//! value, in depth-first declaration order. Discovery is pure: it validates
//! names, kinds, callback references and key uniqueness across the whole
//! tree, and reads initial values, but never touches the remote store.

mod descriptor;

pub use descriptor::{Callback, DeclaredValue, ScopeDescriptor, ValueDescriptor};

use crate::error::{CallbackRefProblem, EngineError};
use crate::models::{PropertyValue, ValueKind};
use crate::property::ValueSlot;
use crate::store::{TableHandle, PATH_SEPARATOR};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Callback resolved against its declaring scope
#[derive(Clone)]
pub struct ResolvedCallback {
    pub name: String,
    pub procedure: Callback,
}

impl fmt::Debug for ResolvedCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResolvedCallback").field(&self.name).finish()
    }
}

/// A validated, not yet registered binding
#[derive(Debug, Clone)]
pub struct BindingSpec {
    /// Table of the owning scope
    pub table: TableHandle,
    pub name: String,
    pub kind: ValueKind,
    pub slot: ValueSlot,
    pub callback: Option<ResolvedCallback>,
    /// Local value read at discovery time
    pub initial: PropertyValue,
}

impl BindingSpec {
    pub fn key(&self) -> String {
        self.table.key_path(&self.name)
    }
}

/// Flat result of discovery over a root scope
#[derive(Debug, Clone, Default)]
pub struct Registry {
    /// Every scope's table, parents before children
    pub tables: Vec<TableHandle>,
    pub specs: Vec<BindingSpec>,
    /// Composed keys claimed so far, read-only values included
    keys: HashSet<String>,
}

impl Registry {
    /// Discover all eligible values under `root`.
    ///
    /// The root scope maps to the table `/<root.name>`.
    pub fn discover(root: &ScopeDescriptor) -> Result<Self, EngineError> {
        validate_name(&TableHandle::new(""), &root.name)?;

        let mut registry = Registry::default();
        registry.add_scope(root, TableHandle::new(&root.name))?;

        debug!(
            tables = registry.tables.len(),
            bindings = registry.specs.len(),
            "Discovery complete"
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    fn add_scope(&mut self, scope: &ScopeDescriptor, table: TableHandle) -> Result<(), EngineError> {
        for descriptor in &scope.values {
            validate_name(&table, &descriptor.name)?;

            let key = table.key_path(&descriptor.name);
            if !self.keys.insert(key.clone()) {
                return Err(EngineError::DuplicateKey { key });
            }

            if descriptor.read_only {
                debug!(key = %key, "Skipping read-only value");
                continue;
            }

            let slot = match &descriptor.value {
                DeclaredValue::Supported(slot) => slot.clone(),
                DeclaredValue::Unsupported { type_name } => {
                    return Err(EngineError::UnsupportedKind {
                        scope: table.path().to_string(),
                        name: descriptor.name.clone(),
                        type_name: type_name.clone(),
                    });
                }
            };

            let callback = resolve_callback(scope, descriptor, &key)?;
            let initial = slot
                .read()
                .ok_or_else(|| EngineError::InaccessibleValue { key: key.clone() })?;

            self.specs.push(BindingSpec {
                table: table.clone(),
                name: descriptor.name.clone(),
                kind: slot.kind(),
                slot,
                callback,
                initial,
            });
        }

        // Sibling scopes sharing a name share a table
        if !self.tables.contains(&table) {
            self.tables.push(table.clone());
        }

        for child in &scope.children {
            validate_name(&table, &child.name)?;
            self.add_scope(child, table.sub_table(&child.name))?;
        }

        Ok(())
    }
}

fn validate_name(table: &TableHandle, name: &str) -> Result<(), EngineError> {
    if name.is_empty() || name.contains(PATH_SEPARATOR) {
        return Err(EngineError::InvalidName {
            scope: table.path().to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

fn resolve_callback(
    scope: &ScopeDescriptor,
    descriptor: &ValueDescriptor,
    key: &str,
) -> Result<Option<ResolvedCallback>, EngineError> {
    let Some(name) = descriptor.callback.as_deref() else {
        return Ok(None);
    };

    if name.trim().is_empty() {
        return Err(EngineError::InvalidCallbackReference {
            key: key.to_string(),
            callback: name.to_string(),
            problem: CallbackRefProblem::Empty,
        });
    }

    match scope.callbacks.get(name) {
        Some(procedure) => Ok(Some(ResolvedCallback {
            name: name.to_string(),
            procedure: procedure.clone(),
        })),
        None => Err(EngineError::InvalidCallbackReference {
            key: key.to_string(),
            callback: name.to_string(),
            problem: CallbackRefProblem::NotDeclared,
        }),
    }
}
