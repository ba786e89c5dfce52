//! JSON API for approval requests.
//!
//! - `POST  /api/requests/submit`          submit a new request (201)
//! - `GET   /api/requests/my`              requests raised by the caller
//! - `GET   /api/requests/dashboard/stats` status counters (hr, admin)
//! - `GET   /api/requests/{id}`            a single request with its audit trail
//! - `GET   /api/requests`                 every request (approvers only)
//! - `PATCH /api/requests/{id}/action`     approve or reject at the caller's level
//!
//! Callers identify themselves with `x-actor-id` and `x-actor-role`. Which
//! level may act is decided by the engine, not by this layer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, FromRequestParts, Path, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stageflow_core::{
    ActionCommand, ApplicationError, ApprovalEngine, ApprovalRequest, ApproverRole,
    DashboardStats, InterfaceError, RequestId, SubmitCommand,
};
use tracing::{error, warn};
use uuid::Uuid;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<ApprovalEngine>,
}

pub fn router(engine: Arc<ApprovalEngine>) -> Router {
    Router::new()
        .route("/api/requests", get(list_all))
        .route("/api/requests/submit", post(submit))
        .route("/api/requests/my", get(list_mine))
        .route("/api/requests/dashboard/stats", get(dashboard_stats))
        .route("/api/requests/{id}", get(get_by_id))
        .route("/api/requests/{id}/action", patch(act))
        .with_state(ApiState { engine })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub request_type: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ActionBody {
    pub action: String,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

// ---------------------------------------------------------------------------
// Caller context
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: String,
}

/// Everything a handler needs to know about who is calling and from where.
/// Never rejects; a missing identity is reported by [`Caller::actor`].
#[derive(Clone, Debug)]
pub struct Caller {
    pub correlation_id: String,
    pub origin_address: String,
    actor: Option<Actor>,
}

impl Caller {
    pub fn actor(&self) -> Result<&Actor, ApiError> {
        self.actor.as_ref().ok_or_else(|| ApiError {
            status: StatusCode::UNAUTHORIZED,
            error: "Caller identity is required.".to_string(),
            detail: format!("missing `{ACTOR_ID_HEADER}` or `{ACTOR_ROLE_HEADER}` header"),
            correlation_id: self.correlation_id.clone(),
        })
    }

    fn require_role(&self, allowed: &[ApproverRole]) -> Result<&Actor, ApiError> {
        let actor = self.actor()?;
        let permitted =
            ApproverRole::parse(&actor.role).is_some_and(|role| allowed.contains(&role));
        if permitted {
            return Ok(actor);
        }
        Err(ApiError {
            status: StatusCode::FORBIDDEN,
            error: "You are not allowed to perform this action right now.".to_string(),
            detail: format!("role `{}` may not access this resource", actor.role),
            correlation_id: self.correlation_id.clone(),
        })
    }

    fn fail(&self, error: ApplicationError) -> ApiError {
        let interface = error.into_interface(self.correlation_id.clone());
        if matches!(
            interface,
            InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. }
        ) {
            error!(
                event_name = "request.api_failed",
                correlation_id = %self.correlation_id,
                error = %interface,
                "request handling failed"
            );
        } else {
            warn!(
                event_name = "request.api_rejected",
                correlation_id = %self.correlation_id,
                error = %interface,
                "request rejected"
            );
        }
        ApiError::from(interface)
    }

    fn bad_body(&self, rejection: JsonRejection) -> ApiError {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            error: "The request could not be processed. Check inputs and try again.".to_string(),
            detail: rejection.body_text(),
            correlation_id: self.correlation_id.clone(),
        }
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = header_value(&parts.headers, CORRELATION_ID_HEADER)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
        let origin_address = origin_address(&parts.headers, peer);

        let actor = match (
            header_value(&parts.headers, ACTOR_ID_HEADER),
            header_value(&parts.headers, ACTOR_ROLE_HEADER),
        ) {
            (Some(id), Some(role)) => Some(Actor { id, role }),
            _ => None,
        };

        Ok(Caller { correlation_id, origin_address, actor })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// First hop of `x-forwarded-for`, else the socket peer, else `unknown`.
fn origin_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    header_value(headers, FORWARDED_FOR_HEADER)
        .and_then(|chain| {
            chain.split(',').map(str::trim).find(|hop| !hop.is_empty()).map(str::to_string)
        })
        .or_else(|| peer.map(|address| address.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    detail: String,
    correlation_id: String,
}

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        let status = match value {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error: value.user_message().to_string(),
            detail: value.message().to_string(),
            correlation_id: value.correlation_id().to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            detail: self.detail,
            correlation_id: self.correlation_id,
        };
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn submit(
    State(state): State<ApiState>,
    caller: Caller,
    body: Result<Json<SubmitBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ApprovalRequest>), ApiError> {
    let actor = caller.actor()?;
    let Json(body) = body.map_err(|rejection| caller.bad_body(rejection))?;

    let command = SubmitCommand {
        title: body.title,
        description: body.description,
        request_type: body.request_type,
        requested_by: actor.id.clone(),
        start_date: body.start_date,
        end_date: body.end_date,
    };
    let created = state.engine.submit(command).await.map_err(|error| caller.fail(error))?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_mine(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<Vec<ApprovalRequest>>, ApiError> {
    let actor = caller.actor()?;
    let requests = state.engine.list_mine(&actor.id).await.map_err(|error| caller.fail(error))?;
    Ok(Json(requests))
}

async fn list_all(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<Vec<ApprovalRequest>>, ApiError> {
    caller.require_role(&ApproverRole::ALL)?;
    let requests = state.engine.list_all().await.map_err(|error| caller.fail(error))?;
    Ok(Json(requests))
}

async fn dashboard_stats(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<DashboardStats>, ApiError> {
    caller.require_role(&[ApproverRole::Hr, ApproverRole::Admin])?;
    let stats = state.engine.dashboard_stats().await.map_err(|error| caller.fail(error))?;
    Ok(Json(stats))
}

async fn get_by_id(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ApprovalRequest>, ApiError> {
    caller.actor()?;
    let request =
        state.engine.get_by_id(&RequestId(id)).await.map_err(|error| caller.fail(error))?;
    Ok(Json(request))
}

async fn act(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<ActionBody>, JsonRejection>,
) -> Result<Json<ApprovalRequest>, ApiError> {
    let actor = caller.actor()?;
    let Json(body) = body.map_err(|rejection| caller.bad_body(rejection))?;

    let command = ActionCommand {
        request_id: RequestId(id),
        actor_id: actor.id.clone(),
        actor_role: actor.role.clone(),
        action: body.action,
        comment: body.comment,
        origin_address: caller.origin_address.clone(),
    };
    let updated = state.engine.act(command).await.map_err(|error| caller.fail(error))?;
    Ok(Json(updated))
}
