use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CommandStore, DeviceStore, ProfileStore, SecurityEventLog};
use crate::error::{DomainError, DomainResult};
use crate::models::command::{Command, CommandParams, CommandResult, CommandStatus, StatusUpdate};
use crate::models::device::{Device, DeviceInfo, DeviceOrigin, LockProjection, LockState};
use crate::models::event::SecurityEvent;
use crate::models::profile::{Profile, ProfileDeviceInfo};

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

// ── Database rows ────────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct CommandRow {
    id: Uuid,
    command_type: String,
    device_id: String,
    issued_by: String,
    status: String,
    params: Json<CommandParams>,
    created_at: DateTime<Utc>,
    executed_at: Option<DateTime<Utc>>,
    result: Option<Json<CommandResult>>,
}

impl TryFrom<CommandRow> for Command {
    type Error = DomainError;

    fn try_from(r: CommandRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            command_type: r.command_type.parse().map_err(DomainError::Store)?,
            device_id: r.device_id,
            issued_by: r.issued_by,
            status: r.status.parse().map_err(DomainError::Store)?,
            params: r.params.0,
            created_at: r.created_at,
            executed_at: r.executed_at,
            result: r.result.map(|j| j.0),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeviceRow {
    id: String,
    user_id: String,
    name: String,
    brand: String,
    model_name: String,
    os_name: String,
    os_version: String,
    blocked: bool,
    blocked_at: Option<DateTime<Utc>>,
    block_reason: Option<String>,
    unblocked_at: Option<DateTime<Utc>>,
    last_activity: DateTime<Utc>,
    registered_at: DateTime<Utc>,
}

impl From<DeviceRow> for Device {
    fn from(r: DeviceRow) -> Self {
        Self {
            id: r.id,
            owner_id: r.user_id,
            info: DeviceInfo {
                name: r.name,
                brand: r.brand,
                model_name: r.model_name,
                os_name: r.os_name,
                os_version: r.os_version,
            },
            lock: LockState {
                blocked: r.blocked,
                blocked_at: r.blocked_at,
                block_reason: r.block_reason,
                unblocked_at: r.unblocked_at,
            },
            last_activity: r.last_activity,
            registered_at: Some(r.registered_at),
            origin: DeviceOrigin::Registered,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    user_id: String,
    email: Option<String>,
    device_info: Option<Json<ProfileDeviceInfo>>,
    device_blocked: bool,
    blocked_at: Option<DateTime<Utc>>,
    block_reason: Option<String>,
    unblocked_at: Option<DateTime<Utc>>,
    last_activity: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(r: ProfileRow) -> Self {
        Self {
            user_id: r.user_id,
            email: r.email,
            device_info: r.device_info.map(|j| j.0),
            lock: LockState {
                blocked: r.device_blocked,
                blocked_at: r.blocked_at,
                block_reason: r.block_reason,
                unblocked_at: r.unblocked_at,
            },
            last_activity: r.last_activity,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    event_type: String,
    description: String,
    timestamp: DateTime<Utc>,
    device_id: Option<String>,
    user_id: String,
    severity: String,
    details: Json<serde_json::Value>,
}

impl TryFrom<EventRow> for SecurityEvent {
    type Error = DomainError;

    fn try_from(r: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            event_type: r.event_type.parse().map_err(DomainError::Store)?,
            description: r.description,
            timestamp: r.timestamp,
            device_id: r.device_id,
            issued_by: r.user_id,
            severity: r.severity.parse().map_err(DomainError::Store)?,
            details: r.details.0,
        })
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

const COMMAND_COLUMNS: &str =
    "id, command_type, device_id, issued_by, status, params, created_at, executed_at, result";

const DEVICE_COLUMNS: &str = "id, user_id, name, brand, model_name, os_name, os_version, \
     blocked, blocked_at, block_reason, unblocked_at, last_activity, registered_at";

const EVENT_COLUMNS: &str =
    "id, event_type, description, timestamp, device_id, user_id, severity, details";

// ── Commands ─────────────────────────────────────────────────────────────────

#[async_trait]
impl CommandStore for PgStore {
    async fn insert(&self, command: &Command) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO remote_commands (id, command_type, device_id, issued_by, status, params, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(command.id)
        .bind(command.command_type.as_str())
        .bind(&command.device_id)
        .bind(&command.issued_by)
        .bind(command.status.as_str())
        .bind(Json(&command.params))
        .bind(command.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Command>> {
        let row = sqlx::query_as::<_, CommandRow>(&format!(
            "SELECT {COMMAND_COLUMNS} FROM remote_commands WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Command::try_from).transpose()
    }

    async fn recent_for_device(&self, device_id: &str, limit: usize) -> DomainResult<Vec<Command>> {
        let rows = sqlx::query_as::<_, CommandRow>(&format!(
            "SELECT {COMMAND_COLUMNS} FROM remote_commands
             WHERE device_id = $1
             ORDER BY created_at DESC
             LIMIT $2"
        ))
        .bind(device_id)
        .bind(limit_param(limit))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Command::try_from).collect()
    }

    async fn pending_for_device(&self, device_id: &str) -> DomainResult<Vec<Command>> {
        let rows = sqlx::query_as::<_, CommandRow>(&format!(
            "SELECT {COMMAND_COLUMNS} FROM remote_commands
             WHERE device_id = $1 AND status = 'pending'
             ORDER BY created_at ASC"
        ))
        .bind(device_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Command::try_from).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: CommandStatus,
        update: &StatusUpdate,
    ) -> DomainResult<bool> {
        let result = sqlx::query(
            "UPDATE remote_commands
             SET status = $3,
                 executed_at = COALESCE($4, executed_at),
                 result = COALESCE($5, result)
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(update.status.as_str())
        .bind(update.executed_at)
        .bind(update.result.as_ref().map(Json))
        .execute(&self.db)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM remote_commands WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.db)
                .await?;
        if !exists {
            return Err(DomainError::CommandNotFound(id.to_string()));
        }
        Ok(false)
    }
}

// ── Devices ──────────────────────────────────────────────────────────────────

#[async_trait]
impl DeviceStore for PgStore {
    async fn get(&self, device_id: &str) -> DomainResult<Option<Device>> {
        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1"
        ))
        .bind(device_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Device::from))
    }

    async fn list_for_owner(&self, owner_id: &str) -> DomainResult<Vec<Device>> {
        let rows = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE user_id = $1 ORDER BY last_activity DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Device::from).collect())
    }

    async fn apply_projection(
        &self,
        device_id: &str,
        projection: &LockProjection,
    ) -> DomainResult<()> {
        let result = if projection.blocked {
            sqlx::query(
                "UPDATE devices
                 SET blocked = TRUE, blocked_at = $2, block_reason = $3, last_activity = $2
                 WHERE id = $1",
            )
            .bind(device_id)
            .bind(projection.at)
            .bind(&projection.reason)
            .execute(&self.db)
            .await?
        } else {
            sqlx::query(
                "UPDATE devices
                 SET blocked = FALSE, unblocked_at = $2, block_reason = NULL, last_activity = $2
                 WHERE id = $1",
            )
            .bind(device_id)
            .bind(projection.at)
            .execute(&self.db)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(DomainError::DeviceNotFound(device_id.to_string()));
        }
        Ok(())
    }

    async fn touch(&self, device_id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query("UPDATE devices SET last_activity = $2 WHERE id = $1")
            .bind(device_id)
            .bind(at)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::DeviceNotFound(device_id.to_string()));
        }
        Ok(())
    }
}

// ── Profiles ─────────────────────────────────────────────────────────────────

#[async_trait]
impl ProfileStore for PgStore {
    async fn get(&self, user_id: &str) -> DomainResult<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT user_id, email, device_info, device_blocked, blocked_at, block_reason,
                    unblocked_at, last_activity, created_at
             FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Profile::from))
    }

    async fn apply_projection(
        &self,
        user_id: &str,
        projection: &LockProjection,
    ) -> DomainResult<()> {
        let result = if projection.blocked {
            sqlx::query(
                "UPDATE profiles
                 SET device_blocked = TRUE, blocked_at = $2, block_reason = $3, last_activity = $2
                 WHERE user_id = $1",
            )
            .bind(user_id)
            .bind(projection.at)
            .bind(&projection.reason)
            .execute(&self.db)
            .await?
        } else {
            sqlx::query(
                "UPDATE profiles
                 SET device_blocked = FALSE, unblocked_at = $2, block_reason = NULL, last_activity = $2
                 WHERE user_id = $1",
            )
            .bind(user_id)
            .bind(projection.at)
            .execute(&self.db)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(DomainError::DeviceNotFound(format!("profile {user_id}")));
        }
        Ok(())
    }

    async fn touch(&self, user_id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        sqlx::query("UPDATE profiles SET last_activity = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

// ── Security events ──────────────────────────────────────────────────────────

#[async_trait]
impl SecurityEventLog for PgStore {
    async fn append(&self, event: &SecurityEvent) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO security_events
             (id, event_type, description, timestamp, device_id, user_id, severity, details)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.id)
        .bind(event.event_type.as_str())
        .bind(&event.description)
        .bind(event.timestamp)
        .bind(&event.device_id)
        .bind(&event.issued_by)
        .bind(event.severity.as_str())
        .bind(Json(&event.details))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn recent_for_device(
        &self,
        device_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<SecurityEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM security_events
             WHERE device_id = $1
             ORDER BY timestamp DESC
             LIMIT $2"
        ))
        .bind(device_id)
        .bind(limit_param(limit))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(SecurityEvent::try_from).collect()
    }

    async fn recent_for_principal(
        &self,
        user_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<SecurityEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM security_events
             WHERE user_id = $1
             ORDER BY timestamp DESC
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit_param(limit))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(SecurityEvent::try_from).collect()
    }
}
