use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RemoteCommand,
    DeviceBlocked,
    DeviceUnblocked,
    SuspiciousActivity,
    AdminEnabled,
    AdminDisabled,
    PasswordFailed,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::RemoteCommand => "remote_command",
            EventType::DeviceBlocked => "device_blocked",
            EventType::DeviceUnblocked => "device_unblocked",
            EventType::SuspiciousActivity => "suspicious_activity",
            EventType::AdminEnabled => "admin_enabled",
            EventType::AdminDisabled => "admin_disabled",
            EventType::PasswordFailed => "password_failed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EventType::RemoteCommand => "Remote command",
            EventType::DeviceBlocked => "Device blocked",
            EventType::DeviceUnblocked => "Device unblocked",
            EventType::SuspiciousActivity => "Suspicious activity",
            EventType::AdminEnabled => "Device admin enabled",
            EventType::AdminDisabled => "Device admin disabled",
            EventType::PasswordFailed => "Failed unlock attempt",
        }
    }

    /// Types the console writes itself; agents may not forge them.
    pub fn is_console_owned(self) -> bool {
        matches!(
            self,
            EventType::RemoteCommand | EventType::DeviceBlocked | EventType::DeviceUnblocked
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown event type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// One entry of the append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SecurityEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub device_id: Option<String>,
    pub issued_by: String,
    pub severity: Severity,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
}

impl SecurityEvent {
    pub fn new(
        event_type: EventType,
        description: impl Into<String>,
        device_id: Option<&str>,
        issued_by: &str,
        severity: Severity,
        details: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            description: description.into(),
            timestamp,
            device_id: device_id.map(str::to_string),
            issued_by: issued_by.to_string(),
            severity,
            details,
        }
    }
}
