use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tracing::{error, info, instrument, warn};

use super::reconcile::reconcile;
use super::resolver::{DeviceResolver, ResolvedDevice};
use super::unlock_gate::validate_security_key;
use crate::agent_hub::AgentHub;
use crate::error::{DomainError, DomainResult, WriteStage};
use crate::models::agent::AgentMessage;
use crate::models::command::{Command, CommandParams, CommandType};
use crate::models::device::{Device, LockProjection, REMOTE_LOCK_REASON};
use crate::models::event::{EventType, SecurityEvent, Severity};
use crate::models::principal::Principal;
use crate::store::{CommandStore, SecurityEventLog};

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub device_id: String,
    pub command_type: CommandType,
    /// Raw operator input; only read for unlock
    pub security_key: Option<String>,
    pub confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub command: Command,
    /// Fresh read after the dispatch; `None` if that read failed
    pub device: Option<Device>,
}

/// Marks a device as having a dispatch in flight until dropped.
pub(crate) struct InFlightGuard<'a> {
    set: &'a DashSet<String>,
    device_id: String,
}

impl<'a> InFlightGuard<'a> {
    pub(crate) fn acquire(set: &'a DashSet<String>, device_id: &str) -> DomainResult<Self> {
        if !set.insert(device_id.to_string()) {
            return Err(DomainError::DispatchInFlight(device_id.to_string()));
        }
        Ok(Self {
            set,
            device_id: device_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.device_id);
    }
}

/// Turns operator requests into pending commands.
///
/// Writes happen in this order: command record, device projection (lock
/// and unlock only), audit events. Each write is independent and earlier
/// writes are not undone when a later one fails.
///
/// The in-flight set is advisory and process-local. It keeps one console
/// from double-submitting but does not coordinate separate processes.
pub struct CommandDispatcher {
    commands: Arc<dyn CommandStore>,
    events: Arc<dyn SecurityEventLog>,
    resolver: Arc<DeviceResolver>,
    hub: Arc<AgentHub>,
    in_flight: DashSet<String>,
}

impl CommandDispatcher {
    pub fn new(
        commands: Arc<dyn CommandStore>,
        events: Arc<dyn SecurityEventLog>,
        resolver: Arc<DeviceResolver>,
        hub: Arc<AgentHub>,
    ) -> Self {
        Self {
            commands,
            events,
            resolver,
            hub,
            in_flight: DashSet::new(),
        }
    }

    #[instrument(skip(self, principal, request), fields(principal = %principal.id, device_id = %request.device_id, command_type = %request.command_type))]
    pub async fn dispatch(
        &self,
        principal: &Principal,
        request: DispatchRequest,
    ) -> DomainResult<DispatchOutcome> {
        let _guard = InFlightGuard::acquire(&self.in_flight, &request.device_id)?;

        let resolved = self.resolver.resolve(principal, &request.device_id).await?;
        let params = check_request(&request, &resolved.device)?;

        let now = Utc::now();
        let command = Command::pending(
            request.command_type,
            &resolved.device.id,
            &principal.id,
            params,
            now,
        );

        self.commands
            .insert(&command)
            .await
            .map_err(|e| write_failure(WriteStage::Command, &command, e))?;

        let projection = projection_for(request.command_type, now);
        if let Some(projection) = &projection {
            resolved
                .apply_projection(principal, projection)
                .await
                .map_err(|e| write_failure(WriteStage::Device, &command, e))?;
        }

        self.events
            .append(&command_event(&command, principal))
            .await
            .map_err(|e| write_failure(WriteStage::Event, &command, e))?;

        if let Some(projection) = &projection {
            self.events
                .append(&lock_event(&command, projection))
                .await
                .map_err(|e| write_failure(WriteStage::Event, &command, e))?;
        }

        info!(command_id = %command.id, source = resolved.source_name(), "command dispatched");

        self.hub.notify(
            &command.device_id,
            &AgentMessage::CommandPending {
                command_id: command.id,
                command_type: command.command_type,
                created_at: command.created_at,
            },
        );

        let device = self.reread(principal, &resolved, projection.as_ref()).await;
        Ok(DispatchOutcome { command, device })
    }

    async fn reread(
        &self,
        principal: &Principal,
        resolved: &ResolvedDevice,
        projection: Option<&LockProjection>,
    ) -> Option<Device> {
        let mut local = resolved.device.clone();
        if let Some(projection) = projection {
            projection.apply(&mut local.lock);
        }
        match self.resolver.resolve(principal, &resolved.device.id).await {
            Ok(fresh) => {
                let device = reconcile(Some(&local), fresh.device);
                if !device.lock.is_consistent() {
                    warn!(device_id = %device.id, "device lock fields are inconsistent");
                }
                Some(device)
            }
            Err(e) => {
                warn!("Failed to re-read device after dispatch: {}", e);
                None
            }
        }
    }
}

/// All validation that must pass before anything is written.
fn check_request(request: &DispatchRequest, device: &Device) -> DomainResult<CommandParams> {
    let command_type = request.command_type;

    if command_type.requires_confirmation() && !request.confirmed {
        return Err(DomainError::ConfirmationRequired(command_type.to_string()));
    }

    match command_type {
        CommandType::Lock if device.lock.blocked => {
            Err(DomainError::AlreadyBlocked(device.id.clone()))
        }
        CommandType::Unlock if !device.lock.blocked => {
            Err(DomainError::NotBlocked(device.id.clone()))
        }
        CommandType::Unlock => {
            let raw = request
                .security_key
                .as_deref()
                .ok_or(DomainError::MissingSecurityKey)?;
            Ok(CommandParams {
                security_key: Some(validate_security_key(raw)?),
            })
        }
        _ => Ok(CommandParams::default()),
    }
}

fn projection_for(command_type: CommandType, at: DateTime<Utc>) -> Option<LockProjection> {
    match command_type {
        CommandType::Lock => Some(LockProjection::lock(at)),
        CommandType::Unlock => Some(LockProjection::unlock(at)),
        CommandType::Locate | CommandType::Wipe => None,
    }
}

fn command_event(command: &Command, principal: &Principal) -> SecurityEvent {
    let mut details = serde_json::json!({
        "command_id": command.id,
        "command_type": command.command_type,
        "params": command.params.redacted(),
    });
    if let Some(email) = &principal.email {
        details["issued_by_email"] = serde_json::Value::from(email.as_str());
    }
    SecurityEvent::new(
        EventType::RemoteCommand,
        format!("Remote command sent: {}", command.command_type),
        Some(&command.device_id),
        &command.issued_by,
        command.command_type.severity(),
        details,
        command.created_at,
    )
}

fn lock_event(command: &Command, projection: &LockProjection) -> SecurityEvent {
    let (event_type, description, severity, details) = if projection.blocked {
        (
            EventType::DeviceBlocked,
            "Device blocked remotely from the console",
            Severity::High,
            serde_json::json!({ "command_id": command.id, "reason": REMOTE_LOCK_REASON }),
        )
    } else {
        (
            EventType::DeviceUnblocked,
            "Device unblocked remotely from the console",
            Severity::Medium,
            serde_json::json!({ "command_id": command.id }),
        )
    };
    SecurityEvent::new(
        event_type,
        description,
        Some(&command.device_id),
        &command.issued_by,
        severity,
        details,
        projection.at,
    )
}

fn write_failure(stage: WriteStage, command: &Command, source: DomainError) -> DomainError {
    error!(
        command_id = %command.id,
        device_id = %command.device_id,
        %stage,
        "Dispatch write failed, earlier writes are kept: {}",
        source
    );
    DomainError::write_failed(stage, source)
}
