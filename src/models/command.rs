use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::event::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Lock,
    Unlock,
    Locate,
    Wipe,
}

impl CommandType {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandType::Lock => "lock",
            CommandType::Unlock => "unlock",
            CommandType::Locate => "locate",
            CommandType::Wipe => "wipe",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CommandType::Lock => "Lock device",
            CommandType::Unlock => "Unlock device",
            CommandType::Locate => "Locate device",
            CommandType::Wipe => "Wipe data",
        }
    }

    /// Lock and unlock are projected onto the device record as soon as
    /// they are dispatched.
    pub fn projects_lock_state(self) -> bool {
        matches!(self, CommandType::Lock | CommandType::Unlock)
    }

    /// Commands the operator must explicitly confirm.
    pub fn requires_confirmation(self) -> bool {
        matches!(self, CommandType::Lock | CommandType::Wipe)
    }

    pub fn severity(self) -> Severity {
        match self {
            CommandType::Locate => Severity::Medium,
            _ => Severity::High,
        }
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommandType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lock" => Ok(CommandType::Lock),
            "unlock" => Ok(CommandType::Unlock),
            "locate" => Ok(CommandType::Locate),
            "wipe" => Ok(CommandType::Wipe),
            other => Err(format!("unknown command type: {other}")),
        }
    }
}

/// Command lifecycle: `pending -> executing -> executed | failed`.
///
/// The console only ever creates `pending` commands; every later
/// transition is reported by the device agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Executing,
    Executed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Executing => "executing",
            CommandStatus::Executed => "executed",
            CommandStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Executed | CommandStatus::Failed)
    }

    /// Agents may skip `executing` and report a final status directly.
    pub fn can_transition_to(self, next: CommandStatus) -> bool {
        use CommandStatus::*;
        matches!(
            (self, next),
            (Pending, Executing) | (Pending, Executed) | (Pending, Failed)
                | (Executing, Executed) | (Executing, Failed)
        )
    }

    pub fn color(self) -> &'static str {
        match self {
            CommandStatus::Pending => "#FFC107",
            CommandStatus::Executing => "#2196F3",
            CommandStatus::Executed => "#4CAF50",
            CommandStatus::Failed => "#F44336",
        }
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommandStatus::Pending),
            "executing" => Ok(CommandStatus::Executing),
            "executed" => Ok(CommandStatus::Executed),
            "failed" => Ok(CommandStatus::Failed),
            other => Err(format!("unknown command status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CommandParams {
    /// Normalized unlock key, forwarded to the agent for verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_key: Option<String>,
}

impl CommandParams {
    /// Params as they may be written to the audit log.
    pub fn redacted(&self) -> serde_json::Value {
        match self.security_key {
            Some(_) => serde_json::json!({ "security_key": "[redacted]" }),
            None => serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Command {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub device_id: String,
    pub issued_by: String,
    pub status: CommandStatus,
    pub params: CommandParams,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub result: Option<CommandResult>,
}

impl Command {
    pub fn pending(
        command_type: CommandType,
        device_id: &str,
        issued_by: &str,
        params: CommandParams,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            command_type,
            device_id: device_id.to_string(),
            issued_by: issued_by.to_string(),
            status: CommandStatus::Pending,
            params,
            created_at,
            executed_at: None,
            result: None,
        }
    }
}

/// A status change reported by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: CommandStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub result: Option<CommandResult>,
}

impl StatusUpdate {
    pub fn apply(&self, command: &mut Command) {
        command.status = self.status;
        if self.executed_at.is_some() {
            command.executed_at = self.executed_at;
        }
        if self.result.is_some() {
            command.result = self.result.clone();
        }
    }
}
