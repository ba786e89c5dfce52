use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use stageflow_core::SchedulerHandle;
use stageflow_db::{ping, DbPool};
use tokio::sync::Mutex;

/// Shared with `main`, which takes the handle out to stop the loop on shutdown.
pub type SchedulerSlot = Arc<Mutex<Option<SchedulerHandle>>>;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub escalation_enabled: bool,
    pub scheduler: SchedulerSlot,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub escalation: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let escalation = escalation_check(&state).await;
    let ready = database.status == "ready" && escalation.status != "degraded";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "stageflow-server runtime initialized".to_string(),
        },
        database,
        escalation,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match ping(pool).await {
        Ok(()) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn escalation_check(state: &HealthState) -> HealthCheck {
    if !state.escalation_enabled {
        return HealthCheck {
            status: "disabled",
            detail: "escalation scheduler disabled by configuration".to_string(),
        };
    }
    match state.scheduler.lock().await.as_ref() {
        Some(handle) if handle.is_running() => {
            HealthCheck { status: "ready", detail: "escalation scheduler running".to_string() }
        }
        Some(_) => HealthCheck {
            status: "degraded",
            detail: "escalation scheduler task has exited".to_string(),
        },
        None => {
            HealthCheck { status: "degraded", detail: "escalation scheduler not started".to_string() }
        }
    }
}
