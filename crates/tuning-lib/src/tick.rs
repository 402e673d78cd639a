//! Host control loop
//!
//! Owns the sync engine and drives its apply cycle on a fixed period, then
//! hands control to the host's own step. One task owns the engine, so apply
//! cycles never overlap.

use crate::engine::SyncEngine;
use crate::error::EngineError;
use crate::health::{components, HealthRegistry};
use crate::observability::StructuredLogger;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Host work run after each apply cycle
pub type HostStep = Box<dyn FnMut() + Send>;

/// Configuration for the control loop
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    /// Period between apply cycles (default: 20 ms)
    pub interval: Duration,
    /// Stop the loop on the first failed apply cycle (default: false)
    pub halt_on_apply_error: bool,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(20),
            halt_on_apply_error: false,
        }
    }
}

/// Periodic apply cycle for a bound value set
pub struct ControlLoop {
    engine: SyncEngine,
    config: ControlLoopConfig,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    step: Option<HostStep>,
    cycles: u64,
}

impl ControlLoop {
    pub fn new(engine: SyncEngine, config: ControlLoopConfig) -> Self {
        Self {
            engine,
            config,
            health: None,
            logger: None,
            step: None,
            cycles: 0,
        }
    }

    /// Run until `shutdown` fires, or until an apply cycle fails when
    /// `halt_on_apply_error` is set. Hands the engine back on a clean stop.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<SyncEngine> {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            bindings = self.engine.binding_count(),
            "Starting control loop"
        );

        if let Some(health) = &self.health {
            health.register(components::CONTROL_LOOP).await;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.cycle().await {
                        if self.config.halt_on_apply_error {
                            error!(cycle = self.cycles, error = %e, "Halting control loop");
                            if let Some(health) = &self.health {
                                health.record_halt(&e).await;
                            }
                            return Err(e.into());
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!(cycles = self.cycles, "Shutting down control loop");
                    break;
                }
            }
        }

        Ok(self.engine)
    }

    /// One control cycle: apply pending remote updates, then run the host step.
    ///
    /// The host step runs even when some updates failed to apply.
    pub async fn cycle(&mut self) -> Result<usize, EngineError> {
        self.cycles += 1;
        let start = Instant::now();

        let result = self.engine.apply_pending_changes();

        match &result {
            Ok(applied) => {
                if *applied > 0 {
                    debug!(
                        cycle = self.cycles,
                        applied = applied,
                        elapsed_us = start.elapsed().as_micros() as u64,
                        "Applied remote updates"
                    );
                }
            }
            Err(e) => {
                let failures = e.failures().len();
                if let Some(logger) = &self.logger {
                    logger.log_apply_failure(self.cycles, failures, &e.to_string());
                }
            }
        }

        if let Some(health) = &self.health {
            health.record_apply(&result).await;
        }

        if let Some(step) = self.step.as_mut() {
            step();
        }

        result
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Completed cycles so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

/// Builder for creating a control loop
pub struct ControlLoopBuilder {
    engine: Option<SyncEngine>,
    config: ControlLoopConfig,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    step: Option<HostStep>,
}

impl ControlLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            engine: None,
            config: ControlLoopConfig::default(),
            health: None,
            logger: None,
            step: None,
        }
    }

    /// Set the engine the loop drives
    pub fn engine(mut self, engine: SyncEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the tick interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn halt_on_apply_error(mut self, halt: bool) -> Self {
        self.config.halt_on_apply_error = halt;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the host step run after every apply cycle
    pub fn step<F>(mut self, step: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.step = Some(Box::new(step));
        self
    }

    /// Build the control loop
    pub fn build(self) -> Result<ControlLoop> {
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("Engine is required"))?;

        let mut control = ControlLoop::new(engine, self.config);
        control.health = self.health;
        control.logger = self.logger;
        control.step = self.step;
        Ok(control)
    }
}

impl Default for ControlLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WireValue;
    use crate::property::Property;
    use crate::registry::{ScopeDescriptor, ValueDescriptor};
    use crate::store::{EntryHandle, InMemoryStore, RemoteStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn arm_engine(store: Arc<InMemoryStore>, speed: &Property<f64>) -> SyncEngine {
        let root = ScopeDescriptor::new("Arm").value(ValueDescriptor::new("speed", speed));
        SyncEngine::new(root, store, false).unwrap()
    }

    #[test]
    fn test_control_loop_config_default() {
        let config = ControlLoopConfig::default();
        assert_eq!(config.interval, Duration::from_millis(20));
        assert!(!config.halt_on_apply_error);
    }

    #[test]
    fn test_builder_requires_engine() {
        let result = ControlLoopBuilder::new()
            .interval(Duration::from_millis(5))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cycle_applies_then_runs_step() {
        let store = Arc::new(InMemoryStore::new());
        let speed = Property::new(1.0);
        let steps = Arc::new(AtomicUsize::new(0));

        let (seen, counter) = (speed.clone(), steps.clone());
        let mut control = ControlLoopBuilder::new()
            .engine(arm_engine(store.clone(), &speed))
            .step(move || {
                // The step sees the freshly applied value
                assert_eq!(seen.get(), 4.0);
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        store.set_double(&EntryHandle::new("/Arm/speed"), 4.0).unwrap();

        assert_eq!(control.cycle().await.unwrap(), 1);
        assert_eq!(steps.load(Ordering::SeqCst), 1);
        assert_eq!(control.cycles(), 1);
    }

    #[tokio::test]
    async fn test_failed_cycle_degrades_health() {
        let store = Arc::new(InMemoryStore::new());
        let speed = Property::new(1.0);
        let root = ScopeDescriptor::new("Arm")
            .value(ValueDescriptor::new("speed", &speed).callback("fail"))
            .callback("fail", || Err("encoder fault".into()));
        let engine = SyncEngine::new(root, store.clone(), false).unwrap();

        let health = HealthRegistry::new();
        let mut control = ControlLoopBuilder::new()
            .engine(engine)
            .health(health.clone())
            .logger(StructuredLogger::new("test-robot"))
            .build()
            .unwrap();

        store.set_double(&EntryHandle::new("/Arm/speed"), 2.0).unwrap();
        assert!(control.cycle().await.is_err());

        let report = health.health().await;
        assert_eq!(
            report.components[components::CONTROL_LOOP].status,
            crate::health::ComponentStatus::Degraded
        );

        // Nothing pending: the next cycle recovers
        assert_eq!(control.cycle().await.unwrap(), 0);
        let report = health.health().await;
        assert_eq!(
            report.components[components::CONTROL_LOOP].status,
            crate::health::ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_run_applies_until_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let speed = Property::new(1.0);
        let control = ControlLoopBuilder::new()
            .engine(arm_engine(store.clone(), &speed))
            .interval(Duration::from_millis(5))
            .build()
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(control.run(shutdown_rx));

        store
            .set_value(&EntryHandle::new("/Arm/speed"), WireValue::Double(8.5))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while speed.get() != 8.5 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(()).unwrap();
        let engine = handle.await.unwrap().unwrap();
        assert_eq!(engine.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_run_halts_on_apply_error() {
        let store = Arc::new(InMemoryStore::new());
        let speed = Property::new(1.0);
        let engine = arm_engine(store.clone(), &speed);
        drop(speed);

        let health = HealthRegistry::new();
        let control = ControlLoopBuilder::new()
            .engine(engine)
            .interval(Duration::from_millis(5))
            .halt_on_apply_error(true)
            .health(health.clone())
            .build()
            .unwrap();

        store.set_double(&EntryHandle::new("/Arm/speed"), 3.0).unwrap();

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let result = tokio::time::timeout(Duration::from_secs(2), control.run(shutdown_rx))
            .await
            .unwrap();

        assert!(result.is_err());
        let report = health.health().await;
        assert_eq!(
            report.components[components::CONTROL_LOOP].status,
            crate::health::ComponentStatus::Unhealthy
        );
    }
}
