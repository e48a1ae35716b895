use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use super::error::{domain_err, ApiError, ApiResult};
use crate::dispatch::history::{CommandHistoryEntry, SecurityEventEntry};
use crate::dispatch::resolver::{device_from_profile, profile_device_id};
use crate::dispatch::DispatchRequest;
use crate::middleware::auth::AuthUser;
use crate::models::console::{DispatchCommandRequest, DispatchResponse, HistoryQuery};
use crate::models::device::Device;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{id}", get(get_device))
        .route(
            "/api/devices/{id}/commands",
            get(command_history).post(dispatch_command),
        )
        .route("/api/devices/{id}/events", get(device_events))
}

#[utoipa::path(
    get,
    path = "/api/devices",
    responses(
        (status = 200, description = "Devices owned by the caller, most recently active first", body = Vec<Device>),
    ),
    security(("bearer" = [])),
    tag = "Devices"
)]
pub(crate) async fn list_devices(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Vec<Device>> {
    let mut devices = state
        .devices
        .list_for_owner(&auth.principal.id)
        .await
        .map_err(domain_err)?;

    let derived_id = profile_device_id(&auth.principal.id);
    if !devices.iter().any(|d| d.id == derived_id) {
        if let Some(profile) = state
            .profiles
            .get(&auth.principal.id)
            .await
            .map_err(domain_err)?
        {
            devices.push(device_from_profile(&derived_id, profile));
        }
    }
    devices.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));

    Ok(Json(devices))
}

#[utoipa::path(
    get,
    path = "/api/devices/{id}",
    params(("id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "Current device state", body = Device),
        (status = 404, description = "Unknown device", body = ApiError),
    ),
    security(("bearer" = [])),
    tag = "Devices"
)]
pub(crate) async fn get_device(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Device> {
    let resolved = state
        .resolver
        .resolve(&auth.principal, &id)
        .await
        .map_err(domain_err)?;
    Ok(Json(resolved.device))
}

#[utoipa::path(
    post,
    path = "/api/devices/{id}/commands",
    params(("id" = String, Path, description = "Device id")),
    request_body = DispatchCommandRequest,
    responses(
        (status = 200, description = "Command created", body = DispatchResponse),
        (status = 400, description = "Missing confirmation or bad security key", body = ApiError),
        (status = 404, description = "Unknown device", body = ApiError),
        (status = 409, description = "Lock state conflict or dispatch in flight", body = ApiError),
        (status = 500, description = "A write failed", body = ApiError),
    ),
    security(("bearer" = [])),
    tag = "Devices"
)]
pub(crate) async fn dispatch_command(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<DispatchCommandRequest>,
) -> ApiResult<DispatchResponse> {
    let outcome = state
        .dispatcher
        .dispatch(
            &auth.principal,
            DispatchRequest {
                device_id: id,
                command_type: req.command_type,
                security_key: req.params.security_key,
                confirmed: req.confirmed,
            },
        )
        .await
        .map_err(domain_err)?;

    Ok(Json(DispatchResponse {
        command_id: outcome.command.id,
        command: CommandHistoryEntry::from(&outcome.command),
        device: outcome.device,
    }))
}

#[utoipa::path(
    get,
    path = "/api/devices/{id}/commands",
    params(("id" = String, Path, description = "Device id"), HistoryQuery),
    responses(
        (status = 200, description = "Recent commands, newest first", body = Vec<CommandHistoryEntry>),
        (status = 404, description = "Unknown device", body = ApiError),
    ),
    security(("bearer" = [])),
    tag = "Devices"
)]
pub(crate) async fn command_history(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<CommandHistoryEntry>> {
    let entries = state
        .history
        .recent(&auth.principal, &id, query.view)
        .await
        .map_err(domain_err)?;
    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/api/devices/{id}/events",
    params(("id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "Security events for the device, newest first", body = Vec<SecurityEventEntry>),
        (status = 404, description = "Unknown device", body = ApiError),
    ),
    security(("bearer" = [])),
    tag = "Devices"
)]
pub(crate) async fn device_events(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Vec<SecurityEventEntry>> {
    let events = state
        .events
        .for_device(&auth.principal, &id)
        .await
        .map_err(domain_err)?;
    Ok(Json(events))
}
