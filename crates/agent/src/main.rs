//! Tuning Agent - live tuning host process
//!
//! Owns a value set, binds it to the remote store, applies remote writes on
//! its control loop and serves the store over HTTP.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tuning_lib::{
    health::{components, HealthRegistry},
    observability::{EngineMetrics, StructuredLogger},
    ControlLoopBuilder, InMemoryStore, SyncEngine,
};

mod api;
mod config;
mod demo;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting tuning-agent");

    // Load configuration
    let config = config::AgentConfig::load()?;
    info!(
        instance = %config.instance_name,
        persistent = config.persistent,
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::STORE).await;
    health_registry.register(components::CONTROL_LOOP).await;

    // Initialize metrics and structured logger
    let _metrics = EngineMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    let store = match &config.store_path {
        Some(path) => {
            let opened = InMemoryStore::open(path);
            health_registry
                .record_store("load", opened.as_ref().map(|s| s.len()))
                .await;
            Arc::new(opened?)
        }
        None => Arc::new(InMemoryStore::new()),
    };

    // Bind the demo value set
    let drivetrain = demo::Drivetrain::new();
    let engine = match SyncEngine::new(drivetrain.scope(), store.clone(), config.persistent) {
        Ok(engine) => engine,
        Err(e) => {
            health_registry.record_engine_failed(&e).await;
            return Err(anyhow::Error::new(e).context("Failed to bind value set"));
        }
    };
    health_registry
        .record_engine_bound(engine.binding_count())
        .await;
    logger.log_startup(AGENT_VERSION, engine.binding_count(), config.persistent);

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        store.clone(),
        logger.clone(),
    ));

    // Start entries, health and metrics server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let dt = config.tick_interval().as_secs_f64();
    let plant = drivetrain.clone();
    let control = ControlLoopBuilder::new()
        .engine(engine)
        .interval(config.tick_interval())
        .health(health_registry.clone())
        .logger(logger.clone())
        .step(move || plant.step(dt))
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut control_handle = tokio::spawn(control.run(shutdown_rx));

    // Wait for shutdown signal or an early loop exit
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
            let _ = shutdown_tx.send(());
            match control_handle.await {
                Ok(Err(e)) => error!(error = %e, "Control loop failed"),
                Err(e) => error!(error = %e, "Control loop task panicked"),
                Ok(Ok(_)) => {}
            }
        }
        result = &mut control_handle => {
            let reason = match result {
                Ok(Ok(_)) => "control loop stopped".to_string(),
                Ok(Err(e)) => format!("control loop failed: {}", e),
                Err(e) => format!("control loop task panicked: {}", e),
            };
            logger.log_shutdown(&reason);
        }
    }

    api_handle.abort();

    if let Some(path) = &config.store_path {
        let saved = store.save_persistent(path);
        health_registry
            .record_store("save", saved.as_ref().map(|n| *n))
            .await;
        let saved = saved.context("Failed to save store snapshot")?;
        logger.log_snapshot(&path.display().to_string(), saved);
    }

    info!("Shutting down");

    Ok(())
}
