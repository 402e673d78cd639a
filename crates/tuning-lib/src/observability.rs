//! Observability infrastructure for the tuning engine
//!
//! Provides:
//! - Prometheus metrics (bindings, notifications, applied updates, failures, apply latency)
//! - Structured JSON logging with tracing

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Default histogram buckets for apply-cycle latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

/// Global metrics instance (registered once, in the default registry)
static GLOBAL_METRICS: OnceLock<Arc<EngineMetricsInner>> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct EngineMetricsInner {
    apply_latency_seconds: Histogram,
    bindings_registered: IntGauge,
    pending_updates: IntGauge,
    notifications_received: IntCounter,
    updates_applied: IntCounter,
    apply_failures: IntCounter,
    callback_failures: IntCounter,
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn int_counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl EngineMetricsInner {
    fn register(registry: &Registry) -> prometheus::Result<Self> {
        let apply_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "tuning_apply_latency_seconds",
                "Time spent applying one batch of pending updates",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(apply_latency_seconds.clone()))?;

        Ok(Self {
            apply_latency_seconds,
            bindings_registered: int_gauge(
                registry,
                "tuning_bindings_registered",
                "Number of values bound to the remote store by live engines",
            )?,
            pending_updates: int_gauge(
                registry,
                "tuning_pending_updates",
                "Pending updates taken by the last apply cycle",
            )?,
            notifications_received: int_counter(
                registry,
                "tuning_notifications_received_total",
                "Remote-write notifications queued by listeners",
            )?,
            updates_applied: int_counter(
                registry,
                "tuning_updates_applied_total",
                "Pending updates written into local values",
            )?,
            apply_failures: int_counter(
                registry,
                "tuning_apply_failures_total",
                "Pending updates that failed to apply",
            )?,
            callback_failures: int_counter(
                registry,
                "tuning_callback_failures_total",
                "Callbacks that returned an error after an update",
            )?,
        })
    }
}

/// Engine metrics for Prometheus exposition
///
/// A lightweight handle; clones share the same underlying metrics.
/// [`EngineMetrics::new`] hands out the process-wide instance registered in
/// the default Prometheus registry.
#[derive(Clone)]
pub struct EngineMetrics {
    inner: Arc<EngineMetricsInner>,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Handle to the global metrics (initialized on first use)
    pub fn new() -> Self {
        let inner = GLOBAL_METRICS.get_or_init(|| {
            Arc::new(
                EngineMetricsInner::register(prometheus::default_registry())
                    .expect("Failed to register engine metrics"),
            )
        });
        Self {
            inner: inner.clone(),
        }
    }

    /// Metrics registered in `registry` instead of the global one
    pub fn with_registry(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            inner: Arc::new(EngineMetricsInner::register(registry)?),
        })
    }

    pub fn observe_apply_latency(&self, duration_secs: f64) {
        self.inner.apply_latency_seconds.observe(duration_secs);
    }

    pub fn add_bindings(&self, count: i64) {
        self.inner.bindings_registered.add(count);
    }

    pub fn remove_bindings(&self, count: i64) {
        self.inner.bindings_registered.sub(count);
    }

    pub fn bindings_registered(&self) -> i64 {
        self.inner.bindings_registered.get()
    }

    pub fn set_pending_updates(&self, count: i64) {
        self.inner.pending_updates.set(count);
    }

    pub fn pending_updates(&self) -> i64 {
        self.inner.pending_updates.get()
    }

    pub fn inc_notifications(&self) {
        self.inner.notifications_received.inc();
    }

    pub fn inc_updates_applied(&self, count: u64) {
        self.inner.updates_applied.inc_by(count);
    }

    pub fn inc_apply_failures(&self, count: u64) {
        self.inner.apply_failures.inc_by(count);
    }

    pub fn inc_callback_failures(&self) {
        self.inner.callback_failures.inc();
    }
}

/// Structured logger for tuning events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, bindings: usize, persistent: bool) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            bindings = bindings,
            persistent = persistent,
            "Tuning agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Tuning agent shutting down"
        );
    }

    /// Log a write received over the remote surface
    pub fn log_remote_write(&self, key: &str, value: &str, accepted: bool) {
        if accepted {
            info!(
                event = "remote_write",
                instance = %self.instance,
                key = %key,
                value = %value,
                "Remote write accepted"
            );
        } else {
            warn!(
                event = "remote_write_rejected",
                instance = %self.instance,
                key = %key,
                value = %value,
                "Remote write rejected"
            );
        }
    }

    /// Log a failed apply cycle
    pub fn log_apply_failure(&self, cycle: u64, failures: usize, error: &str) {
        warn!(
            event = "apply_failed",
            instance = %self.instance,
            cycle = cycle,
            failures = failures,
            error = %error,
            "Pending updates failed to apply"
        );
    }

    /// Log a persisted store snapshot
    pub fn log_snapshot(&self, path: &str, entries: usize) {
        info!(
            event = "store_snapshot",
            instance = %self.instance,
            path = %path,
            entries = entries,
            "Persistent entries saved"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_metrics_creation() {
        // The default registry is process-global; handles share it.
        let metrics = EngineMetrics::new();
        let other = EngineMetrics::new();

        metrics.observe_apply_latency(0.0001);
        metrics.inc_notifications();
        other.inc_updates_applied(2);
        other.inc_apply_failures(1);
        other.inc_callback_failures();
        assert!(Arc::ptr_eq(&metrics.inner, &other.inner));
    }

    #[test]
    fn test_private_registry_metrics() {
        let registry = Registry::new();
        let metrics = EngineMetrics::with_registry(&registry).unwrap();

        metrics.add_bindings(3);
        metrics.remove_bindings(1);
        metrics.set_pending_updates(2);

        assert_eq!(metrics.bindings_registered(), 2);
        assert_eq!(metrics.pending_updates(), 2);

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"tuning_bindings_registered".to_string()));

        // A second set in the same registry collides
        assert!(EngineMetrics::with_registry(&registry).is_err());
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-robot");
        assert_eq!(logger.instance, "test-robot");
    }
}
