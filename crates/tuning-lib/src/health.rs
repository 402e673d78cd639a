//! Health of the tuning agent
//!
//! Three components report here: the engine (binding the value set), the
//! store (snapshot load and save) and the control loop (apply cycles). The
//! agent is ready once the value set is bound and nothing is unhealthy.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive failed apply cycles after which the control loop is unhealthy
pub const FAILED_CYCLES_UNHEALTHY: u32 = 50;

/// Component names for health tracking
pub mod components {
    pub const ENGINE: &str = "engine";
    pub const STORE: &str = "store";
    pub const CONTROL_LOOP: &str = "control_loop";
}

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Some updates or snapshot writes failed; tuning still works
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

/// Last report of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failed reports in a row; reset by a successful one
    #[serde(default, skip_serializing_if = "is_zero")]
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl ComponentHealth {
    fn report(status: ComponentStatus, message: Option<String>, consecutive_failures: u32) -> Self {
        Self {
            status,
            message,
            consecutive_failures,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    fn ok(message: Option<String>) -> Self {
        Self::report(ComponentStatus::Healthy, message, 0)
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    /// Values bound to the store, once the engine is up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bindings: Option<usize>,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct HealthState {
    components: BTreeMap<String, ComponentHealth>,
    bindings: Option<usize>,
}

impl HealthState {
    fn failures(&self, name: &str) -> u32 {
        self.components
            .get(name)
            .map_or(0, |c| c.consecutive_failures)
    }

    fn overall(&self) -> ComponentStatus {
        self.components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Shared health view of the agent's components
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `name` as healthy
    pub async fn register(&self, name: &str) {
        let mut state = self.state.write().await;
        state
            .components
            .insert(name.to_string(), ComponentHealth::ok(None));
    }

    /// The value set is bound; the agent becomes ready
    pub async fn record_engine_bound(&self, bindings: usize) {
        let mut state = self.state.write().await;
        state.bindings = Some(bindings);
        state.components.insert(
            components::ENGINE.to_string(),
            ComponentHealth::ok(Some(format!("{} bindings", bindings))),
        );
    }

    pub async fn record_engine_failed(&self, error: &EngineError) {
        let mut state = self.state.write().await;
        state.bindings = None;
        let failures = state.failures(components::ENGINE) + 1;
        state.components.insert(
            components::ENGINE.to_string(),
            ComponentHealth::report(ComponentStatus::Unhealthy, Some(error.to_string()), failures),
        );
    }

    /// Outcome of a snapshot `operation` ("load", "save") over `entries` entries
    pub async fn record_store<E: fmt::Display>(&self, operation: &str, outcome: Result<usize, E>) {
        let mut state = self.state.write().await;
        let health = match outcome {
            Ok(entries) => {
                ComponentHealth::ok(Some(format!("{}: {} persistent entries", operation, entries)))
            }
            Err(e) => ComponentHealth::report(
                ComponentStatus::Unhealthy,
                Some(format!("snapshot {} failed: {}", operation, e)),
                state.failures(components::STORE) + 1,
            ),
        };
        state.components.insert(components::STORE.to_string(), health);
    }

    /// Outcome of one apply cycle.
    ///
    /// A failed cycle degrades the control loop; a run of
    /// [`FAILED_CYCLES_UNHEALTHY`] failed cycles makes it unhealthy.
    pub async fn record_apply(&self, outcome: &Result<usize, EngineError>) {
        let mut state = self.state.write().await;
        let health = match outcome {
            Ok(_) => ComponentHealth::ok(None),
            Err(e) => {
                let failures = state.failures(components::CONTROL_LOOP) + 1;
                let status = if failures >= FAILED_CYCLES_UNHEALTHY {
                    ComponentStatus::Unhealthy
                } else {
                    ComponentStatus::Degraded
                };
                ComponentHealth::report(status, Some(e.to_string()), failures)
            }
        };
        state
            .components
            .insert(components::CONTROL_LOOP.to_string(), health);
    }

    /// The control loop stopped on `error`
    pub async fn record_halt(&self, error: &EngineError) {
        let mut state = self.state.write().await;
        let failures = state.failures(components::CONTROL_LOOP).max(1);
        state.components.insert(
            components::CONTROL_LOOP.to_string(),
            ComponentHealth::report(
                ComponentStatus::Unhealthy,
                Some(format!("halted: {}", error)),
                failures,
            ),
        );
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: state.overall(),
            bindings: state.bindings,
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        let reason = if state.bindings.is_none() {
            Some("Value set not yet bound".to_string())
        } else {
            state
                .components
                .iter()
                .find(|(_, c)| !c.status.is_operational())
                .map(|(name, _)| format!("Component {} unhealthy", name))
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_failure() -> EngineError {
        EngineError::ApplyBatch {
            applied: 2,
            failures: vec![EngineError::InaccessibleValue {
                key: "/Drivetrain/kP".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_not_ready_until_engine_bound() {
        let registry = HealthRegistry::new();
        registry.register(components::STORE).await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Value set not yet bound"));

        registry.record_engine_bound(4).await;

        assert!(registry.readiness().await.ready);
        let health = registry.health().await;
        assert_eq!(health.bindings, Some(4));
        assert_eq!(
            health.components[components::ENGINE].message.as_deref(),
            Some("4 bindings")
        );
    }

    #[tokio::test]
    async fn test_engine_failure_is_unhealthy() {
        let registry = HealthRegistry::new();
        let error = EngineError::DuplicateKey {
            key: "/Arm/Pid/kP".to_string(),
        };

        registry.record_engine_failed(&error).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(health.components[components::ENGINE]
            .message
            .as_deref()
            .unwrap()
            .contains("/Arm/Pid/kP"));
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_store_outcomes() {
        let registry = HealthRegistry::new();
        registry.record_engine_bound(1).await;

        registry.record_store("load", Ok::<_, String>(3)).await;
        let store = &registry.health().await.components[components::STORE];
        assert_eq!(store.status, ComponentStatus::Healthy);
        assert_eq!(store.message.as_deref(), Some("load: 3 persistent entries"));

        registry
            .record_store("save", Err::<usize, _>("disk full"))
            .await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Component store unhealthy"));
    }

    #[tokio::test]
    async fn test_failed_apply_degrades_then_recovers() {
        let registry = HealthRegistry::new();
        registry.record_engine_bound(4).await;

        registry.record_apply(&Err(batch_failure())).await;
        registry.record_apply(&Err(batch_failure())).await;

        let health = registry.health().await;
        let control = &health.components[components::CONTROL_LOOP];
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(control.consecutive_failures, 2);
        assert!(registry.readiness().await.ready);

        registry.record_apply(&Ok(1)).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components[components::CONTROL_LOOP].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_failing_cycles_become_unhealthy() {
        let registry = HealthRegistry::new();
        registry.record_engine_bound(4).await;

        for _ in 0..FAILED_CYCLES_UNHEALTHY {
            registry.record_apply(&Err(batch_failure())).await;
        }

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert_eq!(
            registry.readiness().await.reason.as_deref(),
            Some("Component control_loop unhealthy")
        );
    }

    #[tokio::test]
    async fn test_halt_is_unhealthy() {
        let registry = HealthRegistry::new();
        registry.record_halt(&batch_failure()).await;

        let health = registry.health().await;
        let control = &health.components[components::CONTROL_LOOP];
        assert_eq!(control.status, ComponentStatus::Unhealthy);
        assert!(control.message.as_deref().unwrap().starts_with("halted: "));
    }

    #[test]
    fn test_report_serialization_skips_empty_fields() {
        let json = serde_json::to_value(ComponentHealth::ok(None)).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json.get("message").is_none());
        assert!(json.get("consecutive_failures").is_none());
    }
}
