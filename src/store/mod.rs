//! Persistence seams for the dispatch core.
//!
//! Each store is written independently; there is no transaction spanning
//! commands, devices and events.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainResult;
use crate::models::command::{Command, CommandStatus, StatusUpdate};
use crate::models::device::{Device, LockProjection};
use crate::models::event::SecurityEvent;
use crate::models::profile::Profile;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn insert(&self, command: &Command) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Command>>;

    /// Most recent first, at most `limit` rows.
    async fn recent_for_device(&self, device_id: &str, limit: usize) -> DomainResult<Vec<Command>>;

    /// Pending commands, oldest first.
    async fn pending_for_device(&self, device_id: &str) -> DomainResult<Vec<Command>>;

    /// Applies `update` only if the command is still in `expected`.
    /// Returns false when another writer got there first.
    async fn update_status(
        &self,
        id: Uuid,
        expected: CommandStatus,
        update: &StatusUpdate,
    ) -> DomainResult<bool>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn get(&self, device_id: &str) -> DomainResult<Option<Device>>;

    /// Ordered by last activity, most recent first.
    async fn list_for_owner(&self, owner_id: &str) -> DomainResult<Vec<Device>>;

    async fn apply_projection(&self, device_id: &str, projection: &LockProjection)
        -> DomainResult<()>;

    async fn touch(&self, device_id: &str, at: DateTime<Utc>) -> DomainResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: &str) -> DomainResult<Option<Profile>>;

    async fn apply_projection(&self, user_id: &str, projection: &LockProjection)
        -> DomainResult<()>;

    async fn touch(&self, user_id: &str, at: DateTime<Utc>) -> DomainResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecurityEventLog: Send + Sync {
    async fn append(&self, event: &SecurityEvent) -> DomainResult<()>;

    /// Newest first.
    async fn recent_for_device(
        &self,
        device_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<SecurityEvent>>;

    /// Newest first.
    async fn recent_for_principal(
        &self,
        user_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<SecurityEvent>>;
}
