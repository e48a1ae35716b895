use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::resolver::DeviceResolver;
use crate::error::DomainResult;
use crate::models::command::{Command, CommandStatus, CommandType};
use crate::models::event::{EventType, SecurityEvent};
use crate::models::principal::Principal;
use crate::models::timestamp::format_timestamp;
use crate::store::{CommandStore, SecurityEventLog};

/// Which screen the history is shown on; decides how many rows come back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HistoryScope {
    #[default]
    Panel,
    Detail,
}

impl HistoryScope {
    pub fn limit(self) -> usize {
        match self {
            HistoryScope::Panel => 10,
            HistoryScope::Detail => 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatusPhase {
    InProgress,
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CommandHistoryEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub label: String,
    pub status: CommandStatus,
    pub phase: StatusPhase,
    pub status_color: String,
    pub created_at: DateTime<Utc>,
    pub sent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed: Option<String>,
    /// Present only once the agent has reported a result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl From<&Command> for CommandHistoryEntry {
    fn from(c: &Command) -> Self {
        let phase = if c.status.is_terminal() {
            StatusPhase::Terminal
        } else {
            StatusPhase::InProgress
        };
        let result = c.result.as_ref().map(|r| {
            let outcome = if r.success { "Succeeded" } else { "Failed" };
            match &r.error {
                Some(error) => format!("{outcome} - {error}"),
                None => outcome.to_string(),
            }
        });
        Self {
            id: c.id,
            command_type: c.command_type,
            label: c.command_type.label().to_string(),
            status: c.status,
            phase,
            status_color: c.status.color().to_string(),
            created_at: c.created_at,
            sent: format_timestamp(Some(c.created_at)),
            executed: c.executed_at.map(|at| format_timestamp(Some(at))),
            result,
        }
    }
}

pub struct CommandHistoryView {
    commands: Arc<dyn CommandStore>,
    resolver: Arc<DeviceResolver>,
}

impl CommandHistoryView {
    pub fn new(commands: Arc<dyn CommandStore>, resolver: Arc<DeviceResolver>) -> Self {
        Self { commands, resolver }
    }

    pub async fn recent(
        &self,
        principal: &Principal,
        device_id: &str,
        scope: HistoryScope,
    ) -> DomainResult<Vec<CommandHistoryEntry>> {
        let resolved = self.resolver.resolve(principal, device_id).await?;
        let commands = self
            .commands
            .recent_for_device(&resolved.device.id, scope.limit())
            .await?;
        Ok(commands
            .iter()
            .take(scope.limit())
            .map(CommandHistoryEntry::from)
            .collect())
    }
}

pub const DEVICE_EVENTS_LIMIT: usize = 20;
pub const DASHBOARD_EVENTS_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SecurityEventEntry {
    #[serde(flatten)]
    pub event: SecurityEvent,
    pub label: String,
    pub when: String,
}

impl From<SecurityEvent> for SecurityEventEntry {
    fn from(event: SecurityEvent) -> Self {
        Self {
            label: event.event_type.label().to_string(),
            when: format_timestamp(Some(event.timestamp)),
            event,
        }
    }
}

pub struct SecurityEventView {
    events: Arc<dyn SecurityEventLog>,
    resolver: Arc<DeviceResolver>,
}

impl SecurityEventView {
    pub fn new(events: Arc<dyn SecurityEventLog>, resolver: Arc<DeviceResolver>) -> Self {
        Self { events, resolver }
    }

    pub async fn for_device(
        &self,
        principal: &Principal,
        device_id: &str,
    ) -> DomainResult<Vec<SecurityEventEntry>> {
        let resolved = self.resolver.resolve(principal, device_id).await?;
        let events = self
            .events
            .recent_for_device(&resolved.device.id, DEVICE_EVENTS_LIMIT)
            .await?;
        Ok(events.into_iter().map(SecurityEventEntry::from).collect())
    }

    /// Latest events across all of the principal's devices; `limit` is
    /// clamped to `1..=20`.
    pub async fn recent(
        &self,
        principal: &Principal,
        limit: Option<usize>,
    ) -> DomainResult<Vec<SecurityEventEntry>> {
        let limit = limit
            .unwrap_or(DASHBOARD_EVENTS_LIMIT)
            .clamp(1, DEVICE_EVENTS_LIMIT);
        let events = self.events.recent_for_principal(&principal.id, limit).await?;
        Ok(events.into_iter().map(SecurityEventEntry::from).collect())
    }
}

/// Counts of suspicious observations, for the dashboard badge.
pub fn suspicious_count(events: &[SecurityEventEntry]) -> usize {
    events
        .iter()
        .filter(|e| {
            matches!(
                e.event.event_type,
                EventType::SuspiciousActivity | EventType::PasswordFailed
            )
        })
        .count()
}
