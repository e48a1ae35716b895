use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use super::error::{domain_err, ApiResult};
use crate::dispatch::history::suspicious_count;
use crate::middleware::auth::AuthUser;
use crate::models::console::{RecentEventsQuery, RecentEventsResponse};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/recent", get(recent_events))
}

#[utoipa::path(
    get,
    path = "/api/events/recent",
    params(RecentEventsQuery),
    responses(
        (status = 200, description = "Latest security events across the caller's devices", body = RecentEventsResponse),
    ),
    security(("bearer" = [])),
    tag = "Events"
)]
pub(crate) async fn recent_events(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<RecentEventsQuery>,
) -> ApiResult<RecentEventsResponse> {
    let events = state
        .events
        .recent(&auth.principal, query.limit)
        .await
        .map_err(domain_err)?;
    let suspicious = suspicious_count(&events);
    Ok(Json(RecentEventsResponse { events, suspicious }))
}
