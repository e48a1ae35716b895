use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

use super::error::{domain_err, ApiError, ApiResult};
use crate::middleware::auth::AgentAuth;
use crate::models::agent::{AgentEventReport, StatusReport};
use crate::models::command::Command;
use crate::models::event::SecurityEvent;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/commands", get(pending_commands))
        .route("/commands/{id}", put(report_status))
        .route("/heartbeat", post(heartbeat))
        .route("/events", post(report_event))
}

#[utoipa::path(
    get,
    path = "/api/agent/commands",
    responses(
        (status = 200, description = "Pending commands for this device, oldest first", body = Vec<Command>),
        (status = 403, description = "Token is not bound to a device", body = ApiError),
    ),
    security(("bearer" = [])),
    tag = "Agent"
)]
pub(crate) async fn pending_commands(
    State(state): State<AppState>,
    auth: AgentAuth,
) -> ApiResult<Vec<Command>> {
    let commands = state
        .executor
        .pending(&auth.principal, &auth.device_id)
        .await
        .map_err(domain_err)?;
    Ok(Json(commands))
}

#[utoipa::path(
    put,
    path = "/api/agent/commands/{id}",
    params(("id" = Uuid, Path, description = "Command id")),
    request_body = StatusReport,
    responses(
        (status = 200, description = "Status recorded", body = Command),
        (status = 404, description = "Unknown command", body = ApiError),
        (status = 409, description = "Transition not allowed", body = ApiError),
    ),
    security(("bearer" = [])),
    tag = "Agent"
)]
pub(crate) async fn report_status(
    State(state): State<AppState>,
    auth: AgentAuth,
    Path(id): Path<Uuid>,
    Json(report): Json<StatusReport>,
) -> ApiResult<Command> {
    let command = state
        .executor
        .report_status(&auth.principal, &auth.device_id, id, report)
        .await
        .map_err(domain_err)?;
    Ok(Json(command))
}

#[utoipa::path(
    post,
    path = "/api/agent/heartbeat",
    responses(
        (status = 200, description = "Last activity updated"),
    ),
    security(("bearer" = [])),
    tag = "Agent"
)]
pub(crate) async fn heartbeat(
    State(state): State<AppState>,
    auth: AgentAuth,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    state
        .executor
        .heartbeat(&auth.principal, &auth.device_id)
        .await
        .map_err(domain_err)?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/api/agent/events",
    request_body = AgentEventReport,
    responses(
        (status = 200, description = "Event recorded", body = SecurityEvent),
        (status = 403, description = "Event type is reserved for the console", body = ApiError),
    ),
    security(("bearer" = [])),
    tag = "Agent"
)]
pub(crate) async fn report_event(
    State(state): State<AppState>,
    auth: AgentAuth,
    Json(report): Json<AgentEventReport>,
) -> ApiResult<SecurityEvent> {
    let event = state
        .executor
        .record_event(&auth.principal, &auth.device_id, report)
        .await
        .map_err(domain_err)?;
    Ok(Json(event))
}
