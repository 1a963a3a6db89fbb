/**
 * NAGIOS AUTOMATOR - process entry point
 *
 * Loads config, installs tracing, builds the daemon controller and runner,
 * starts the job queue and the intake surfaces (HTTP always, MQTT when
 * configured), then serves until killed.
 */

use anyhow::{Context, Result};
use automator_kernel::config::load_config;
use automator_kernel::health::HealthTracker;
use automator_kernel::http::{self, AppState};
use automator_kernel::logging::init_tracing;
use automator_kernel::mapping::MappingTable;
use automator_kernel::queue::JobQueue;
use automator_kernel::{mqtt, NagiosController, Runner};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = load_config().await.context("failed to load config")?;
    let _log_guard = init_tracing(&cfg.log_level, cfg.log_file.as_deref())?;
    info!(output_dir = %cfg.output_dir.display(), "nagios-automator starting");

    // surface a broken mapping at startup; jobs re-read it anyway
    if let Err(e) = MappingTable::load(&cfg.mapping_file) {
        warn!(path = %cfg.mapping_file.display(), error = %e, "mapping table not usable yet");
    }

    let cfg = Arc::new(cfg);
    let daemon = Arc::new(NagiosController::new(&cfg.daemon));
    let runner = Arc::new(Runner::new(cfg.clone(), daemon));

    let health_tracker = HealthTracker::new();
    let (queue, _workers) = JobQueue::start(runner, &cfg.queue, health_tracker.clone());

    if let Some(mqtt_conf) = cfg.mqtt.clone() {
        mqtt::spawn_mqtt_listener(mqtt_conf, queue.clone(), health_tracker.clone());
    }

    let app = http::build_router(AppState {
        queue,
        health_tracker,
        api_key: cfg.http.api_key.clone(),
    });

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.bind))?;
    info!("listening on http://{}", cfg.http.bind);
    axum::serve(listener, app).await.context("http server failed")?;
    Ok(())
}
