mod api;
mod bootstrap;
mod health;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use stageflow_core::config::{AppConfig, LoadOptions};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::health::{HealthState, SchedulerSlot};

fn init_logging(config: &AppConfig) {
    use stageflow_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let scheduler: SchedulerSlot = Arc::new(Mutex::new(None));
    if app.config.escalation.enabled {
        *scheduler.lock().await = Some(app.scheduler.clone().start());
    } else {
        warn!(
            event_name = "system.server.escalation_disabled",
            correlation_id = "bootstrap",
            "escalation scheduler disabled; overdue requests will not be escalated"
        );
    }

    let router = api::router(app.engine.clone()).merge(health::router(HealthState {
        db_pool: app.db_pool.clone(),
        escalation_enabled: app.config.escalation.enabled,
        scheduler: scheduler.clone(),
    }));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        sla_window_hours = app.config.workflow.sla_window_hours,
        "stageflow-server started"
    );

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "stageflow-server stopping"
    );

    let handle = scheduler.lock().await.take();
    if let Some(handle) = handle {
        let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
        if tokio::time::timeout(grace, handle.stop()).await.is_err() {
            warn!(
                event_name = "system.server.scheduler_stop_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "escalation scheduler did not stop within the grace period"
            );
        }
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signal; serving until killed"
        );
        std::future::pending::<()>().await;
    }
}
