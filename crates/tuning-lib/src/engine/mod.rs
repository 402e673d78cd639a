//! Synchronization between host values and the remote store
//!
//! Construction discovers the bindings, publishes (or, in persistence mode,
//! resumes) their values and subscribes a listener per binding. Listeners
//! only queue the delivered payload; [`SyncEngine::apply_pending_changes`]
//! later writes the queued values into the host's properties and runs their
//! callbacks on the caller's thread.

mod binding;
mod queue;


pub use binding::Binding;
pub use queue::{BindingId, ChangeQueue, PendingUpdate};

use crate::error::EngineError;
use crate::observability::EngineMetrics;
use crate::registry::{BindingSpec, Registry, ScopeDescriptor};
use crate::store::{EntryListener, EntryNotification, ListenerFlags, RemoteStore, TableHandle};
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Key of the per-table widget marker
pub const TYPE_MARKER_KEY: &str = ".type";

/// Marker value that makes dashboards render a table as editable preferences
pub const TYPE_MARKER_VALUE: &str = "RobotPreferences";

/// Configuration for the sync engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Keep entries across store restarts and let existing remote values win
    pub persistent: bool,
    /// Write the `.type` marker into every scope's table
    pub publish_type_marker: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persistent: false,
            publish_type_marker: true,
        }
    }
}

/// Bridges a host value set to a remote store
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    bindings: Vec<Binding>,
    queue: Arc<ChangeQueue>,
    config: EngineConfig,
    metrics: EngineMetrics,
}

impl SyncEngine {
    /// Bind every eligible value under `root` to `store`.
    ///
    /// Fails without registering anything if any value is unsupported,
    /// inaccessible, duplicated, or names a callback its scope does not declare.
    pub fn new(
        root: ScopeDescriptor,
        store: Arc<dyn RemoteStore>,
        persistent: bool,
    ) -> Result<Self, EngineError> {
        let config = EngineConfig {
            persistent,
            ..Default::default()
        };
        Self::with_config(&root, store, config)
    }

    pub fn with_config(
        root: &ScopeDescriptor,
        store: Arc<dyn RemoteStore>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        Self::with_metrics(root, store, config, EngineMetrics::new())
    }

    /// Like [`SyncEngine::with_config`], reporting into `metrics`
    pub fn with_metrics(
        root: &ScopeDescriptor,
        store: Arc<dyn RemoteStore>,
        config: EngineConfig,
        metrics: EngineMetrics,
    ) -> Result<Self, EngineError> {
        // Everything that can be validated is, before the store sees a write
        let registry = Registry::discover(root)?;

        let queue = Arc::new(ChangeQueue::new());

        if config.publish_type_marker {
            for table in &registry.tables {
                publish_type_marker(store.as_ref(), table, config.persistent)?;
            }
        }

        let mut bindings = Vec::with_capacity(registry.len());
        for (index, spec) in registry.specs.into_iter().enumerate() {
            let binding = register(store.as_ref(), &queue, &metrics, &config, BindingId(index), spec)?;
            bindings.push(binding);
        }

        store.flush();
        metrics.add_bindings(bindings.len() as i64);

        info!(
            root = %root.name,
            bindings = bindings.len(),
            pending = queue.len(),
            persistent = config.persistent,
            "Sync engine ready"
        );

        Ok(Self {
            store,
            bindings,
            queue,
            config,
            metrics,
        })
    }

    /// Apply every remote update received since the last call.
    ///
    /// Meant to be called once per control cycle from the host's control
    /// thread; the exclusive borrow keeps it to a single consumer. Only the
    /// latest value per binding is applied and each binding's callback runs
    /// at most once. A failing update does not stop the batch: the rest are
    /// still applied and all failures are returned together as
    /// [`EngineError::ApplyBatch`]. Returns the number of updates applied.
    pub fn apply_pending_changes(&mut self) -> Result<usize, EngineError> {
        let pending = self.queue.take_all();
        self.metrics.set_pending_updates(pending.len() as i64);
        if pending.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();

        let mut applied = 0;
        let mut failures = Vec::new();

        for update in &pending {
            let binding = &self.bindings[update.binding.0];
            match binding.apply(&update.raw) {
                Ok(_) => applied += 1,
                Err(err) => {
                    if matches!(err, EngineError::CallbackInvocationFailure { .. }) {
                        self.metrics.inc_callback_failures();
                    }
                    warn!(key = %binding.key(), error = %err, "Failed to apply pending update");
                    failures.push(err);
                }
            }
        }

        self.metrics.inc_updates_applied(applied as u64);
        self.metrics
            .observe_apply_latency(start.elapsed().as_secs_f64());
        debug!(applied = applied, failed = failures.len(), "Apply cycle complete");

        if failures.is_empty() {
            Ok(applied)
        } else {
            self.metrics.inc_apply_failures(failures.len() as u64);
            Err(EngineError::ApplyBatch { applied, failures })
        }
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Number of bindings with a queued remote value
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Remote keys of all bindings, in discovery order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.key())
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn is_persistent(&self) -> bool {
        self.config.persistent
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.metrics.remove_bindings(self.bindings.len() as i64);
    }
}

fn publish_type_marker(
    store: &dyn RemoteStore,
    table: &TableHandle,
    persistent: bool,
) -> Result<(), EngineError> {
    let marker = store.entry(table, TYPE_MARKER_KEY);
    store.set_string(&marker, TYPE_MARKER_VALUE)?;
    if persistent {
        store.set_persistent(&marker);
    }
    Ok(())
}

/// Publish or resume one binding and subscribe its listener
fn register(
    store: &dyn RemoteStore,
    queue: &Arc<ChangeQueue>,
    metrics: &EngineMetrics,
    config: &EngineConfig,
    id: BindingId,
    spec: BindingSpec,
) -> Result<Binding, EngineError> {
    let exists = store.contains_key(&spec.table, &spec.name);
    let entry = store.entry(&spec.table, &spec.name);

    let mut flags = ListenerFlags::UPDATE;
    if !config.persistent || !exists {
        store.set_value(&entry, spec.initial.to_wire())?;
    } else {
        // The remote value was tuned earlier: replay it into the queue so the
        // next apply pulls it into the local value.
        flags |= ListenerFlags::IMMEDIATE | ListenerFlags::NEW;
        debug!(key = %entry.key(), "Resuming persisted remote value");
    }

    if config.persistent {
        store.set_persistent(&entry);
    }

    store.add_listener(&entry, listener(queue.clone(), metrics.clone(), id), flags);

    Ok(Binding::new(id, spec, entry))
}

/// Producer side: runs on the store's delivery thread and only touches the queue
fn listener(queue: Arc<ChangeQueue>, metrics: EngineMetrics, id: BindingId) -> EntryListener {
    Arc::new(move |notification: &EntryNotification| {
        if queue.push(id, notification.sequence, notification.value.clone()) {
            metrics.inc_notifications();
        } else {
            debug!(key = %notification.key, sequence = notification.sequence, "Dropped stale notification");
        }
    })
}

/// Builder for creating a sync engine
pub struct SyncEngineBuilder {
    store: Option<Arc<dyn RemoteStore>>,
    root: Option<ScopeDescriptor>,
    config: EngineConfig,
    metrics: Option<EngineMetrics>,
}

impl SyncEngineBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            root: None,
            config: EngineConfig::default(),
            metrics: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the root value set
    pub fn root(mut self, root: ScopeDescriptor) -> Self {
        self.root = Some(root);
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.config.persistent = persistent;
        self
    }

    pub fn publish_type_marker(mut self, publish: bool) -> Self {
        self.config.publish_type_marker = publish;
        self
    }

    /// Report into `metrics` instead of the global metrics
    pub fn metrics(mut self, metrics: EngineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<SyncEngine> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Store is required"))?;
        let root = self
            .root
            .ok_or_else(|| anyhow::anyhow!("Root scope is required"))?;

        let metrics = self.metrics.unwrap_or_default();

        Ok(SyncEngine::with_metrics(&root, store, self.config, metrics)?)
    }
}

impl Default for SyncEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
