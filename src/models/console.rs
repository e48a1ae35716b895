use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::command::{CommandParams, CommandType};
use super::device::Device;
use crate::dispatch::history::{CommandHistoryEntry, HistoryScope, SecurityEventEntry};

#[derive(Debug, Deserialize, ToSchema)]
pub struct DispatchCommandRequest {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    #[serde(default)]
    pub params: CommandParams,
    /// Required for lock and wipe
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DispatchResponse {
    pub command_id: Uuid,
    pub command: CommandHistoryEntry,
    /// Fresh read after the dispatch; absent if that read failed
    pub device: Option<Device>,
}

#[derive(Debug, Default, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct HistoryQuery {
    /// `panel` (10 entries, default) or `detail` (20 entries)
    #[serde(default)]
    pub view: HistoryScope,
}

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct RecentEventsQuery {
    /// Max events to return (default 5, max 20)
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecentEventsResponse {
    pub events: Vec<SecurityEventEntry>,
    /// Suspicious activity and failed unlock attempts among `events`
    pub suspicious: usize,
}
