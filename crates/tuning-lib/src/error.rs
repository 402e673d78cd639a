//! Error types for the tuning engine and remote store

use crate::models::ValueKind;
use thiserror::Error;

/// Error returned by a host callback
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by a remote store implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Entries are typed once created; a write of another type is refused
    #[error("entry {key} holds a {existing} value, cannot store a {attempted}")]
    TypeMismatch {
        key: String,
        existing: &'static str,
        attempted: &'static str,
    },

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Why a declared callback reference could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackRefProblem {
    Empty,
    NotDeclared,
}

/// Main error type for engine construction and apply cycles
#[derive(Error, Debug)]
pub enum EngineError {
    /// A writable value was declared with a type outside {float64, int32, bool}
    #[error("value \"{name}\" in scope \"{scope}\" has type {type_name}, which is not supported")]
    UnsupportedKind {
        scope: String,
        name: String,
        type_name: String,
    },

    /// The host storage behind a binding is gone
    #[error("value at {key} is not accessible")]
    InaccessibleValue { key: String },

    #[error("{}", describe_callback_ref(.key, .callback, .problem))]
    InvalidCallbackReference {
        key: String,
        callback: String,
        problem: CallbackRefProblem,
    },

    /// Two declarations, possibly in sibling scopes of the same name, compose the same key
    #[error("key {key} is declared more than once")]
    DuplicateKey { key: String },

    /// Value and scope names become single path segments
    #[error("name {name:?} in scope \"{scope}\" is empty or contains '/'")]
    InvalidName { scope: String, name: String },

    #[error("callback \"{callback}\" of {key} failed")]
    CallbackInvocationFailure {
        key: String,
        callback: String,
        #[source]
        source: CallbackError,
    },

    #[error("{key} expects a {expected} value but the store delivered a {found}")]
    WireTypeMismatch {
        key: String,
        expected: ValueKind,
        found: &'static str,
    },

    #[error("remote store error: {0}")]
    Store(#[from] StoreError),

    /// Every failure of one apply cycle; the remaining updates were still applied
    #[error("{} of {} pending updates failed to apply", .failures.len(), .applied + .failures.len())]
    ApplyBatch {
        applied: usize,
        failures: Vec<EngineError>,
    },
}

fn describe_callback_ref(key: &str, callback: &str, problem: &CallbackRefProblem) -> String {
    match problem {
        CallbackRefProblem::Empty => {
            format!("the callback reference of {} cannot be empty", key)
        }
        CallbackRefProblem::NotDeclared => format!(
            "the callback \"{}\" of {} is not declared in its scope",
            callback, key
        ),
    }
}

impl EngineError {
    /// Failures contained in this error, flattening an aggregate batch error
    pub fn failures(&self) -> Vec<&EngineError> {
        match self {
            EngineError::ApplyBatch { failures, .. } => failures.iter().collect(),
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_callback_failure_keeps_source() {
        let err = EngineError::CallbackInvocationFailure {
            key: "/Drive/kP".to_string(),
            callback: "reset".to_string(),
            source: "integrator saturated".into(),
        };

        assert_eq!(err.to_string(), "callback \"reset\" of /Drive/kP failed");
        assert_eq!(err.source().unwrap().to_string(), "integrator saturated");
    }

    #[test]
    fn test_batch_message_counts_failures() {
        let err = EngineError::ApplyBatch {
            applied: 3,
            failures: vec![EngineError::InaccessibleValue {
                key: "/Drive/speed".to_string(),
            }],
        };

        assert_eq!(err.to_string(), "1 of 4 pending updates failed to apply");
        assert_eq!(err.failures().len(), 1);
    }

    #[test]
    fn test_invalid_name_message() {
        let err = EngineError::InvalidName {
            scope: "/Arm".to_string(),
            name: "Pid/kP".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "name \"Pid/kP\" in scope \"/Arm\" is empty or contains '/'"
        );
    }

    #[test]
    fn test_callback_reference_messages() {
        let empty = EngineError::InvalidCallbackReference {
            key: "/Drive/speed".to_string(),
            callback: String::new(),
            problem: CallbackRefProblem::Empty,
        };
        assert!(empty.to_string().contains("cannot be empty"));

        let missing = EngineError::InvalidCallbackReference {
            key: "/Drive/speed".to_string(),
            callback: "onSpeed".to_string(),
            problem: CallbackRefProblem::NotDeclared,
        };
        assert!(missing.to_string().contains("\"onSpeed\""));
    }
}
