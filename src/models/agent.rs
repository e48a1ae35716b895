use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::command::{CommandResult, CommandStatus, CommandType};
use super::event::{EventType, Severity};
use super::timestamp::Timestamp;

/// Status report sent by a device agent for one command.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StatusReport {
    pub status: CommandStatus,
    /// Epoch milliseconds or RFC 3339; defaults to the server clock for final statuses
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub executed_at: Option<Timestamp>,
    #[serde(default)]
    pub result: Option<CommandResult>,
}

/// A security observation made on the device.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AgentEventReport {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub description: String,
    #[serde(default = "default_agent_severity")]
    pub severity: Severity,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
}

fn default_agent_severity() -> Severity {
    Severity::Medium
}

// ── WebSocket messages ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentMessage {
    #[serde(rename = "command_pending")]
    CommandPending {
        command_id: Uuid,
        command_type: CommandType,
        created_at: DateTime<Utc>,
    },
    #[serde(rename = "status_report")]
    StatusReport {
        command_id: Uuid,
        status: CommandStatus,
        #[serde(default)]
        executed_at: Option<Timestamp>,
        #[serde(default)]
        result: Option<CommandResult>,
    },
    #[serde(rename = "status_accepted")]
    StatusAccepted {
        command_id: Uuid,
        status: CommandStatus,
    },
    #[serde(rename = "error")]
    Error { message: String },
}
