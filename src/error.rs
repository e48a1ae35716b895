use thiserror::Error;

use crate::models::command::CommandStatus;
use crate::models::timestamp::Timestamp;

pub type DomainResult<T> = Result<T, DomainError>;

/// Which write of a dispatch failed. Earlier writes are not rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    Command,
    Device,
    Event,
}

impl std::fmt::Display for WriteStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WriteStage::Command => "command",
            WriteStage::Device => "device",
            WriteStage::Event => "event",
        })
    }
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Device is already blocked: {0}")]
    AlreadyBlocked(String),

    #[error("Device is not blocked: {0}")]
    NotBlocked(String),

    #[error("Security key must be exactly 20 characters (got {length})")]
    InvalidSecurityKey { length: usize },

    #[error("Unlock requires a security key")]
    MissingSecurityKey,

    #[error("Command {0} must be confirmed before it is sent")]
    ConfirmationRequired(String),

    #[error("A command is already being sent to device {0}")]
    DispatchInFlight(String),

    #[error("Cannot move command from {from} to {to}")]
    InvalidTransition {
        from: CommandStatus,
        to: CommandStatus,
    },

    #[error("executed_at is out of range: {0:?}")]
    InvalidTimestamp(Timestamp),

    #[error("Event type {0} cannot be reported by an agent")]
    EventTypeNotAllowed(String),

    #[error("Failed to write {stage}: {source}")]
    WriteFailed {
        stage: WriteStage,
        #[source]
        source: Box<DomainError>,
    },

    #[error("Store error: {0}")]
    Store(String),
}

impl DomainError {
    /// Rejections raised before anything was written.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DomainError::DeviceNotFound(_)
                | DomainError::AlreadyBlocked(_)
                | DomainError::NotBlocked(_)
                | DomainError::InvalidSecurityKey { .. }
                | DomainError::MissingSecurityKey
                | DomainError::ConfirmationRequired(_)
                | DomainError::InvalidTimestamp(_)
        )
    }

    pub(crate) fn write_failed(stage: WriteStage, source: DomainError) -> Self {
        DomainError::WriteFailed {
            stage,
            source: Box::new(source),
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(e: sqlx::Error) -> Self {
        DomainError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::Store(format!("invalid document: {e}"))
    }
}
