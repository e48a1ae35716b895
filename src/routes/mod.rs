pub mod agent;
pub mod devices;
pub(crate) mod error;
pub mod events;
pub mod ws;

use axum::Router;
use crate::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .merge(devices::router())
        .nest("/api/events", events::router())
        .nest("/api/agent", agent::router())
        .merge(ws::router())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::middleware::auth::create_token;
    use crate::store::{DeviceStore, MemoryStore};
    use crate::testing::{profile, registered_device, SECRET};

    const VALID_KEY: &str = "1234 5678 9012 34567890";

    pub(crate) fn test_state() -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_device(registered_device("D1", "U1", false));
        store.insert_device(registered_device("D2", "U2", false));
        store.insert_profile(profile("U3", true));
        let state = AppState::from_stores(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            SECRET.to_string(),
        );
        (state, store)
    }

    async fn call(
        state: &AppState,
        method: Method,
        uri: &str,
        token: Option<String>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let resp = api_router(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn console(user: &str) -> Option<String> {
        Some(create_token(user, None, SECRET).unwrap())
    }

    fn agent(user: &str, device: &str) -> Option<String> {
        Some(create_token(user, Some(device), SECRET).unwrap())
    }

    #[tokio::test]
    async fn requests_without_token_are_rejected() {
        let (state, _) = test_state();
        let (status, _) = call(&state, Method::GET, "/api/devices", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let bad = Some(create_token("U1", None, "not-the-secret").unwrap());
        let (status, _) = call(&state, Method::GET, "/api/devices/D1", bad, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn agent_tokens_are_refused_on_console_routes() {
        let (state, store) = test_state();

        let (status, _) =
            call(&state, Method::GET, "/api/devices", agent("U1", "D1"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/devices/D1/commands",
            agent("U1", "D1"),
            Some(json!({ "type": "lock", "confirmed": true })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let device = store.get("D1").await.unwrap().unwrap();
        assert!(!device.lock.blocked);
    }

    #[tokio::test]
    async fn repeated_device_reads_are_identical() {
        let (state, _) = test_state();

        for (uri, user) in [("/api/devices/D1", "U1"), ("/api/devices/device-U3", "U3")] {
            let (status, first) = call(&state, Method::GET, uri, console(user), None).await;
            assert_eq!(status, StatusCode::OK);
            let (status, second) = call(&state, Method::GET, uri, console(user), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn devices_are_scoped_to_their_owner() {
        let (state, _) = test_state();

        let (status, body) = call(&state, Method::GET, "/api/devices", console("U1"), None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["D1"]);

        let (status, _) = call(&state, Method::GET, "/api/devices/D2", console("U1"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn profile_device_is_listed_and_resolvable() {
        let (state, _) = test_state();

        let (status, body) = call(&state, Method::GET, "/api/devices", console("U3"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "device-U3");
        assert_eq!(body[0]["blocked"], true);

        let (status, body) =
            call(&state, Method::GET, "/api/devices/device-U3", console("U3"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["info"]["brand"], "Acme");
    }

    #[tokio::test]
    async fn lock_then_unlock_round_trip() {
        let (state, _) = test_state();
        let uri = "/api/devices/D1/commands";

        let (status, _) = call(
            &state,
            Method::POST,
            uri,
            console("U1"),
            Some(json!({ "type": "lock" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &state,
            Method::POST,
            uri,
            console("U1"),
            Some(json!({ "type": "lock", "confirmed": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["command"]["status"], "pending");
        assert_eq!(body["command"]["label"], "Lock device");
        assert_eq!(body["device"]["blocked"], true);
        assert_eq!(body["device"]["block_reason"], "remote_lock");

        let (status, _) = call(
            &state,
            Method::POST,
            uri,
            console("U1"),
            Some(json!({ "type": "lock", "confirmed": true })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(
            &state,
            Method::POST,
            uri,
            console("U1"),
            Some(json!({ "type": "unlock", "params": { "security_key": "1234 5678 9012 3456789" } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &state,
            Method::POST,
            uri,
            console("U1"),
            Some(json!({ "type": "unlock", "params": { "security_key": VALID_KEY } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["device"]["blocked"], false);

        let (status, history) = call(
            &state,
            Method::GET,
            "/api/devices/D1/commands?view=detail",
            console("U1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 2);

        let (status, events) =
            call(&state, Method::GET, "/api/devices/D1/events", console("U1"), None).await;
        assert_eq!(status, StatusCode::OK);
        let events = events.as_array().unwrap();
        assert_eq!(events.len(), 4);
        let raw = serde_json::to_string(events).unwrap();
        assert!(!raw.contains("34567890"));
    }

    #[tokio::test]
    async fn agent_executes_a_locate() {
        let (state, _) = test_state();

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/devices/D1/commands",
            console("U1"),
            Some(json!({ "type": "locate" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let command_id = body["command_id"].as_str().unwrap().to_string();

        let (status, _) =
            call(&state, Method::GET, "/api/agent/commands", console("U1"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, pending) =
            call(&state, Method::GET, "/api/agent/commands", agent("U1", "D1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending[0]["id"], command_id.as_str());

        let status_uri = format!("/api/agent/commands/{command_id}");
        let (status, body) = call(
            &state,
            Method::PUT,
            &status_uri,
            agent("U1", "D1"),
            Some(json!({ "status": "executed", "result": { "success": true } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "executed");
        assert!(body["executed_at"].is_string());

        let (status, _) = call(
            &state,
            Method::PUT,
            &status_uri,
            agent("U1", "D1"),
            Some(json!({ "status": "executing" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, history) =
            call(&state, Method::GET, "/api/devices/D1/commands", console("U1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history[0]["phase"], "terminal");
        assert_eq!(history[0]["result"], "Succeeded");
    }

    #[tokio::test]
    async fn agent_events_feed_the_dashboard() {
        let (state, _) = test_state();

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/agent/events",
            agent("U1", "D1"),
            Some(json!({ "type": "device_blocked", "description": "forged" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/agent/events",
            agent("U1", "D1"),
            Some(json!({ "type": "password_failed", "description": "Wrong unlock key", "severity": "high" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) =
            call(&state, Method::POST, "/api/agent/heartbeat", agent("U1", "D1"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &state,
            Method::GET,
            "/api/events/recent?limit=50",
            console("U1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["events"].as_array().unwrap().len(), 1);
        assert_eq!(body["suspicious"], 1);
        assert_eq!(body["events"][0]["label"], "Failed unlock attempt");
    }
}
