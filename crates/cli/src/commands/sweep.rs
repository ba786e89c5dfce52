use std::sync::Arc;

use stageflow_core::{EscalationScheduler, SystemClock, WorkflowEngine};
use stageflow_db::{connect_with_config, migrations, SqlRequestStore};

use crate::commands::{
    current_thread_runtime, load_config, CommandResult, EXIT_DB_CONNECTIVITY, EXIT_MIGRATION,
    EXIT_SWEEP,
};

/// One pass of the escalation scheduler, for cron-driven deployments or for
/// catching up after the server was down. Pending migrations are applied
/// first so the sweep never runs against an older schema.
pub fn run() -> CommandResult {
    let config = match load_config("sweep") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match current_thread_runtime("sweep") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;
        if let Err(error) = migrations::run_pending(&pool).await {
            pool.close().await;
            return Err(("migration", error.to_string(), EXIT_MIGRATION));
        }

        let scheduler = EscalationScheduler::new(
            Arc::new(SqlRequestStore::new(pool.clone())),
            Arc::new(SystemClock),
            WorkflowEngine::new(config.workflow_policy()),
            config.escalation_settings(),
        );
        let stats = scheduler
            .sweep()
            .await
            .map_err(|error| ("sweep", error.to_string(), EXIT_SWEEP));
        pool.close().await;
        stats
    });

    match result {
        Ok(stats) => CommandResult::success_with_details(
            "sweep",
            format!(
                "escalated {} of {} overdue requests ({} skipped, {} failed)",
                stats.escalated, stats.scanned, stats.skipped, stats.failed
            ),
            serde_json::to_value(stats).ok(),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", error_class, message, exit_code)
        }
    }
}
