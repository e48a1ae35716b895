use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent_hub::AgentHub;
use crate::middleware::auth::validate_token;
use crate::models::agent::{AgentMessage, StatusReport};
use crate::models::principal::Principal;
use crate::AppState;

#[derive(serde::Deserialize)]
struct WsQuery {
    token: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/agent/ws", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let claims =
        validate_token(&query.token, &state.jwt_secret).map_err(|_| StatusCode::UNAUTHORIZED)?;
    let device_id = claims.device_id.ok_or(StatusCode::UNAUTHORIZED)?;
    let principal = Principal {
        id: claims.sub,
        email: claims.email,
    };

    // Refuse the upgrade for devices the principal does not own.
    state
        .resolver
        .resolve(&principal, &device_id)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, principal, device_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, principal: Principal, device_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let mut rx = state.hub.subscribe(&device_id);

    // Replies addressed to this connection only
    let (direct_tx, mut direct_rx) = mpsc::channel::<String>(32);

    if let Err(e) = state.executor.heartbeat(&principal, &device_id).await {
        tracing::warn!("Failed to record agent activity: {}", e);
    }

    tracing::info!(
        "Agent connected: principal={}, device={}",
        principal.id,
        device_id
    );

    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(payload) => {
                            if sender.send(Message::Text(payload.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!("Agent channel lagged, skipped {} nudges", skipped);
                        }
                        Err(_) => break,
                    }
                }
                Some(payload) = direct_rx.recv() => {
                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_state = state.clone();
    let recv_principal = principal.clone();
    let recv_device = device_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply =
                        handle_agent_message(&recv_state, &recv_principal, &recv_device, &text)
                            .await;
                    if let Some(payload) = reply.and_then(|m| encode(&m)) {
                        if direct_tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    shut_down(&state.hub, &device_id, send_task, recv_task).await;
    tracing::info!(
        "Agent disconnected: principal={}, device={}",
        principal.id,
        device_id
    );
}

/// Waits for either half to finish, stops the other, then releases the
/// device channel. The stopped task is awaited so its receiver is dropped
/// before the release check runs.
async fn shut_down(
    hub: &AgentHub,
    device_id: &str,
    mut send_task: JoinHandle<()>,
    mut recv_task: JoinHandle<()>,
) {
    let send_finished = tokio::select! {
        _ = &mut send_task => true,
        _ = &mut recv_task => false,
    };
    let remaining = if send_finished { recv_task } else { send_task };
    remaining.abort();
    let _ = remaining.await;

    hub.release(device_id);
}

/// Handles one inbound frame and returns the reply for this connection.
async fn handle_agent_message(
    state: &AppState,
    principal: &Principal,
    device_id: &str,
    text: &str,
) -> Option<AgentMessage> {
    let msg: AgentMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            return Some(AgentMessage::Error {
                message: format!("Invalid message: {}", e),
            })
        }
    };

    match msg {
        AgentMessage::StatusReport {
            command_id,
            status,
            executed_at,
            result,
        } => {
            let report = StatusReport {
                status,
                executed_at,
                result,
            };
            match state
                .executor
                .report_status(principal, device_id, command_id, report)
                .await
            {
                Ok(command) => Some(AgentMessage::StatusAccepted {
                    command_id,
                    status: command.status,
                }),
                Err(e) => {
                    tracing::warn!("Rejected status report for {}: {}", command_id, e);
                    Some(AgentMessage::Error {
                        message: e.to_string(),
                    })
                }
            }
        }
        // Server-to-agent message types
        _ => None,
    }
}

fn encode(msg: &AgentMessage) -> Option<String> {
    serde_json::to_string(msg)
        .map_err(|e| tracing::error!("Failed to encode agent message: {}", e))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::command::{CommandParams, CommandStatus, CommandType};
    use crate::models::command::Command;
    use crate::routes::tests::test_state;
    use crate::store::CommandStore;
    use chrono::Utc;

    #[tokio::test]
    async fn status_report_frames_go_through_the_executor() {
        let (state, store) = test_state();
        let command = Command::pending(
            CommandType::Locate,
            "D1",
            "U1",
            CommandParams::default(),
            Utc::now(),
        );
        CommandStore::insert(store.as_ref(), &command).await.unwrap();
        let principal = Principal::new("U1");

        let frame = serde_json::json!({
            "type": "status_report",
            "command_id": command.id,
            "status": "executed",
            "executed_at": 1_700_000_000_000i64,
            "result": { "success": true },
        })
        .to_string();
        let reply = handle_agent_message(&state, &principal, "D1", &frame).await;
        assert!(matches!(
            reply,
            Some(AgentMessage::StatusAccepted {
                status: CommandStatus::Executed,
                ..
            })
        ));

        // A second report against a final command is refused.
        let reply = handle_agent_message(&state, &principal, "D1", &frame).await;
        assert!(matches!(reply, Some(AgentMessage::Error { .. })));
    }

    #[tokio::test]
    async fn closing_connection_releases_the_device_channel() {
        let hub = AgentHub::new();
        let mut rx = hub.subscribe("D1");
        let send_task = tokio::spawn(async move { while rx.recv().await.is_ok() {} });
        let recv_task = tokio::spawn(async {});

        shut_down(&hub, "D1", send_task, recv_task).await;

        assert!(!hub.has_channel("D1"));
    }

    #[tokio::test]
    async fn garbage_frames_get_an_error_reply() {
        let (state, _) = test_state();
        let reply =
            handle_agent_message(&state, &Principal::new("U1"), "D1", "not json").await;
        assert!(matches!(reply, Some(AgentMessage::Error { .. })));
    }
}
