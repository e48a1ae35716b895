use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::resolver::{DeviceResolver, ResolvedDevice};
use crate::error::{DomainError, DomainResult};
use crate::models::agent::{AgentEventReport, StatusReport};
use crate::models::command::{Command, CommandResult, CommandStatus, CommandType, StatusUpdate};
use crate::models::device::LockProjection;
use crate::models::event::{EventType, SecurityEvent, Severity};
use crate::models::principal::Principal;
use crate::store::{CommandStore, SecurityEventLog};

/// The operations a device agent performs against the command store.
///
/// Status changes follow the command lifecycle and are applied with a
/// compare-and-set, so a late or duplicated report cannot move a command
/// out of a final state.
///
/// The agent is the authoritative writer of lock state: a final report on
/// a lock or unlock command overwrites the optimistic projection when the
/// device disagrees with the outcome.
pub struct ExecutorService {
    commands: Arc<dyn CommandStore>,
    events: Arc<dyn SecurityEventLog>,
    resolver: Arc<DeviceResolver>,
}

impl ExecutorService {
    pub fn new(
        commands: Arc<dyn CommandStore>,
        events: Arc<dyn SecurityEventLog>,
        resolver: Arc<DeviceResolver>,
    ) -> Self {
        Self {
            commands,
            events,
            resolver,
        }
    }

    pub async fn pending(&self, principal: &Principal, device_id: &str) -> DomainResult<Vec<Command>> {
        let resolved = self.resolver.resolve(principal, device_id).await?;
        self.commands.pending_for_device(&resolved.device.id).await
    }

    #[instrument(skip(self, principal, report), fields(principal = %principal.id, status = %report.status))]
    pub async fn report_status(
        &self,
        principal: &Principal,
        device_id: &str,
        command_id: Uuid,
        report: StatusReport,
    ) -> DomainResult<Command> {
        let resolved = self.resolver.resolve(principal, device_id).await?;
        let mut command = self
            .commands
            .get(command_id)
            .await?
            .filter(|c| c.device_id == resolved.device.id)
            .ok_or_else(|| DomainError::CommandNotFound(command_id.to_string()))?;

        let from = command.status;
        let to = report.status;
        if !from.can_transition_to(to) {
            return Err(DomainError::InvalidTransition { from, to });
        }

        let update = status_update(report)?;
        if !self.commands.update_status(command_id, from, &update).await? {
            let current = self
                .commands
                .get(command_id)
                .await?
                .map(|c| c.status)
                .unwrap_or(from);
            warn!(%command_id, %current, "status report lost a race");
            return Err(DomainError::InvalidTransition { from: current, to });
        }

        update.apply(&mut command);
        info!(%command_id, %from, %to, "command status updated");

        let at = command.executed_at.unwrap_or_else(Utc::now);
        if let Some(projection) = outcome_projection(&command, resolved.device.lock.blocked, at) {
            // The status is already final, so a failed write here is only logged.
            if let Err(e) = self
                .apply_outcome(principal, &resolved, &command, &projection)
                .await
            {
                error!(
                    %command_id,
                    device_id = %command.device_id,
                    "Failed to apply reported lock state: {}",
                    e
                );
            }
        }
        Ok(command)
    }

    async fn apply_outcome(
        &self,
        principal: &Principal,
        resolved: &ResolvedDevice,
        command: &Command,
        projection: &LockProjection,
    ) -> DomainResult<()> {
        resolved.apply_projection(principal, projection).await?;
        let (event_type, description, severity) = if projection.blocked {
            (
                EventType::DeviceBlocked,
                "Device blocked as reported by the agent",
                Severity::High,
            )
        } else {
            (
                EventType::DeviceUnblocked,
                "Device unblocked as reported by the agent",
                Severity::Medium,
            )
        };
        let event = SecurityEvent::new(
            event_type,
            description,
            Some(&command.device_id),
            &principal.id,
            severity,
            serde_json::json!({
                "command_id": command.id,
                "command_type": command.command_type,
                "command_status": command.status,
            }),
            projection.at,
        );
        self.events.append(&event).await?;
        info!(
            command_id = %command.id,
            blocked = projection.blocked,
            "lock state set from agent report"
        );
        Ok(())
    }

    pub async fn heartbeat(&self, principal: &Principal, device_id: &str) -> DomainResult<()> {
        let resolved = self.resolver.resolve(principal, device_id).await?;
        resolved.touch(principal, Utc::now()).await
    }

    /// Records something the device itself observed. Lock, unlock and
    /// command events belong to the console and are refused.
    pub async fn record_event(
        &self,
        principal: &Principal,
        device_id: &str,
        report: AgentEventReport,
    ) -> DomainResult<SecurityEvent> {
        if report.event_type.is_console_owned() {
            return Err(DomainError::EventTypeNotAllowed(report.event_type.to_string()));
        }
        let resolved = self.resolver.resolve(principal, device_id).await?;
        let event = SecurityEvent::new(
            report.event_type,
            report.description,
            Some(&resolved.device.id),
            &principal.id,
            report.severity,
            report.details,
            Utc::now(),
        );
        self.events.append(&event).await?;
        Ok(event)
    }
}

/// The lock state a final lock/unlock report implies, if the device does
/// not already show it. A failed lock leaves the device unblocked and a
/// failed unlock leaves it blocked.
fn outcome_projection(
    command: &Command,
    currently_blocked: bool,
    at: DateTime<Utc>,
) -> Option<LockProjection> {
    let blocked = match (command.command_type, command.status) {
        (CommandType::Lock, CommandStatus::Executed)
        | (CommandType::Unlock, CommandStatus::Failed) => true,
        (CommandType::Unlock, CommandStatus::Executed)
        | (CommandType::Lock, CommandStatus::Failed) => false,
        _ => return None,
    };
    if blocked == currently_blocked {
        return None;
    }
    Some(if blocked {
        LockProjection::lock(at)
    } else {
        LockProjection::unlock(at)
    })
}

fn status_update(report: StatusReport) -> DomainResult<StatusUpdate> {
    let executed_at = match report.executed_at {
        Some(ts) => Some(ts.to_datetime().ok_or(DomainError::InvalidTimestamp(ts))?),
        None => report.status.is_terminal().then(Utc::now),
    };
    let result = match (report.status, report.result) {
        (_, Some(result)) => Some(result),
        (CommandStatus::Failed, None) => Some(CommandResult {
            success: false,
            error: None,
        }),
        _ => None,
    };
    Ok(StatusUpdate {
        status: report.status,
        executed_at,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_hub::AgentHub;
    use crate::dispatch::dispatcher::{CommandDispatcher, DispatchRequest};
    use crate::models::command::CommandParams;
    use crate::models::timestamp::Timestamp;
    use crate::store::{DeviceStore, MemoryStore};
    use crate::testing::registered_device;

    struct Harness {
        store: Arc<MemoryStore>,
        executor: ExecutorService,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        store.insert_device(registered_device("D1", "U1", false));
        let resolver = Arc::new(DeviceResolver::standard(store.clone(), store.clone()));
        Harness {
            executor: ExecutorService::new(store.clone(), store.clone(), resolver),
            store,
        }
    }

    async fn pending_command(store: &MemoryStore) -> Command {
        let c = Command::pending(
            CommandType::Locate,
            "D1",
            "U1",
            CommandParams::default(),
            Utc::now(),
        );
        CommandStore::insert(store, &c).await.unwrap();
        c
    }

    fn report(status: CommandStatus) -> StatusReport {
        StatusReport {
            status,
            executed_at: None,
            result: None,
        }
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let h = harness();
        let principal = Principal::new("U1");
        let c = pending_command(&h.store).await;

        assert_eq!(h.executor.pending(&principal, "D1").await.unwrap().len(), 1);

        let executing = h
            .executor
            .report_status(&principal, "D1", c.id, report(CommandStatus::Executing))
            .await
            .unwrap();
        assert_eq!(executing.status, CommandStatus::Executing);
        assert_eq!(executing.executed_at, None);
        assert!(h.executor.pending(&principal, "D1").await.unwrap().is_empty());

        let done = h
            .executor
            .report_status(
                &principal,
                "D1",
                c.id,
                StatusReport {
                    status: CommandStatus::Executed,
                    executed_at: Some(Timestamp::EpochMillis(1_700_000_000_000)),
                    result: Some(CommandResult {
                        success: true,
                        error: None,
                    }),
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, CommandStatus::Executed);
        assert_eq!(
            done.executed_at,
            Timestamp::EpochMillis(1_700_000_000_000).to_datetime()
        );
    }

    #[tokio::test]
    async fn terminal_commands_reject_reports() {
        let h = harness();
        let principal = Principal::new("U1");
        let c = pending_command(&h.store).await;

        let failed = h
            .executor
            .report_status(&principal, "D1", c.id, report(CommandStatus::Failed))
            .await
            .unwrap();
        assert_eq!(
            failed.result,
            Some(CommandResult {
                success: false,
                error: None
            })
        );
        assert!(failed.executed_at.is_some());

        for status in [CommandStatus::Executing, CommandStatus::Executed] {
            let err = h
                .executor
                .report_status(&principal, "D1", c.id, report(status))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                DomainError::InvalidTransition {
                    from: CommandStatus::Failed,
                    ..
                }
            ));
        }
    }

    #[tokio::test]
    async fn command_of_other_device_is_not_found() {
        let h = harness();
        h.store.insert_device(registered_device("D2", "U1", false));
        let c = pending_command(&h.store).await;

        let err = h
            .executor
            .report_status(&Principal::new("U1"), "D2", c.id, report(CommandStatus::Executing))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::CommandNotFound(_)));
    }

    fn failed(error: &str) -> StatusReport {
        StatusReport {
            status: CommandStatus::Failed,
            executed_at: None,
            result: Some(CommandResult {
                success: false,
                error: Some(error.to_string()),
            }),
        }
    }

    #[tokio::test]
    async fn failed_lock_reverts_projection_and_allows_retry() {
        let h = harness();
        let principal = Principal::new("U1");
        let resolver = Arc::new(DeviceResolver::standard(h.store.clone(), h.store.clone()));
        let dispatcher = CommandDispatcher::new(
            h.store.clone(),
            h.store.clone(),
            resolver,
            Arc::new(AgentHub::new()),
        );
        let lock = DispatchRequest {
            device_id: "D1".to_string(),
            command_type: CommandType::Lock,
            security_key: None,
            confirmed: true,
        };

        let outcome = dispatcher.dispatch(&principal, lock.clone()).await.unwrap();
        assert_eq!(outcome.device.map(|d| d.lock.blocked), Some(true));

        h.executor
            .report_status(&principal, "D1", outcome.command.id, failed("device offline"))
            .await
            .unwrap();

        let device = DeviceStore::get(h.store.as_ref(), "D1").await.unwrap().unwrap();
        assert!(!device.lock.blocked);
        assert!(device.lock.unblocked_at.is_some());

        let events = SecurityEventLog::recent_for_device(h.store.as_ref(), "D1", 10)
            .await
            .unwrap();
        assert_eq!(events[0].event_type, EventType::DeviceUnblocked);

        let retry = dispatcher.dispatch(&principal, lock).await.unwrap();
        assert_eq!(retry.device.map(|d| d.lock.blocked), Some(true));
    }

    #[tokio::test]
    async fn failed_unlock_restores_blocked_state() {
        let h = harness();
        h.store.insert_device(registered_device("D1", "U1", false));
        let principal = Principal::new("U1");
        let c = Command::pending(
            CommandType::Unlock,
            "D1",
            "U1",
            CommandParams::default(),
            Utc::now(),
        );
        CommandStore::insert(h.store.as_ref(), &c).await.unwrap();

        h.executor
            .report_status(&principal, "D1", c.id, failed("wrong key"))
            .await
            .unwrap();

        let device = DeviceStore::get(h.store.as_ref(), "D1").await.unwrap().unwrap();
        assert!(device.lock.blocked);
        assert_eq!(device.lock.block_reason.as_deref(), Some("remote_lock"));
    }

    #[tokio::test]
    async fn confirmed_outcome_matching_projection_writes_nothing() {
        let h = harness();
        h.store.insert_device(registered_device("D1", "U1", true));
        let c = Command::pending(
            CommandType::Lock,
            "D1",
            "U1",
            CommandParams::default(),
            Utc::now(),
        );
        CommandStore::insert(h.store.as_ref(), &c).await.unwrap();

        h.executor
            .report_status(&Principal::new("U1"), "D1", c.id, report(CommandStatus::Executed))
            .await
            .unwrap();

        assert!(SecurityEventLog::recent_for_device(h.store.as_ref(), "D1", 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn out_of_range_executed_at_is_rejected() {
        let h = harness();
        let principal = Principal::new("U1");
        let c = pending_command(&h.store).await;

        let err = h
            .executor
            .report_status(
                &principal,
                "D1",
                c.id,
                StatusReport {
                    status: CommandStatus::Executed,
                    executed_at: Some(Timestamp::EpochMillis(i64::MAX)),
                    result: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTimestamp(_)));
        assert!(err.is_validation());

        let stored = CommandStore::get(h.store.as_ref(), c.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CommandStatus::Pending);
    }

    #[tokio::test]
    async fn heartbeat_updates_last_activity() {
        let h = harness();
        let before = DeviceStore::get(h.store.as_ref(), "D1").await.unwrap().unwrap();
        h.executor.heartbeat(&Principal::new("U1"), "D1").await.unwrap();
        let after = DeviceStore::get(h.store.as_ref(), "D1").await.unwrap().unwrap();
        assert!(after.last_activity >= before.last_activity);
    }

    #[tokio::test]
    async fn agent_cannot_forge_console_events() {
        let h = harness();
        let principal = Principal::new("U1");

        let err = h
            .executor
            .record_event(
                &principal,
                "D1",
                AgentEventReport {
                    event_type: EventType::DeviceUnblocked,
                    description: "unblocked".to_string(),
                    severity: Severity::Low,
                    details: serde_json::json!({}),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::EventTypeNotAllowed(_)));

        let event = h
            .executor
            .record_event(
                &principal,
                "D1",
                AgentEventReport {
                    event_type: EventType::PasswordFailed,
                    description: "Wrong unlock key entered".to_string(),
                    severity: Severity::High,
                    details: serde_json::json!({ "attempts": 3 }),
                },
            )
            .await
            .unwrap();
        assert_eq!(event.device_id.as_deref(), Some("D1"));
    }
}
