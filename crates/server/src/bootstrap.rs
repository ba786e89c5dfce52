use std::sync::Arc;

use stageflow_core::config::{AppConfig, ConfigError, LoadOptions};
use stageflow_core::{
    ApprovalEngine, Clock, EscalationScheduler, RequestStore, SystemClock, WorkflowEngine,
};
use stageflow_db::{connect_with_config, migrations, DbPool, SqlRequestStore};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<ApprovalEngine>,
    pub scheduler: Arc<EscalationScheduler>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects, migrates and wires the engine and scheduler over one SQL store.
/// The scheduler is built but not started.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let store: Arc<dyn RequestStore> = Arc::new(SqlRequestStore::new(db_pool.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Arc::new(ApprovalEngine::new(
        store.clone(),
        clock.clone(),
        WorkflowEngine::new(config.workflow_policy()),
        config.retry_policy(),
    ));
    let scheduler = Arc::new(EscalationScheduler::new(
        store,
        clock,
        WorkflowEngine::new(config.workflow_policy()),
        config.escalation_settings(),
    ));

    Ok(Application { config, db_pool, engine, scheduler })
}
