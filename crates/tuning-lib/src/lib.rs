//! Live tuning library
//!
//! This crate provides the core functionality for:
//! - Binding host values to a remote key-value store
//! - Queuing remote writes and applying them on the host's control thread
//! - Resuming persisted values after a restart
//! - Health checks and observability

pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod property;
pub mod registry;
pub mod store;
pub mod tick;

pub use engine::{EngineConfig, SyncEngine, SyncEngineBuilder};
pub use error::{CallbackError, EngineError, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use property::{Property, Scalar};
pub use registry::{ScopeDescriptor, ValueDescriptor};
pub use store::{InMemoryStore, RemoteStore};
pub use tick::{ControlLoop, ControlLoopBuilder, ControlLoopConfig};
