use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use uuid::Uuid;

use super::{CommandStore, DeviceStore, ProfileStore, SecurityEventLog};
use crate::error::{DomainError, DomainResult};
use crate::models::command::{Command, CommandStatus, StatusUpdate};
use crate::models::device::{Device, LockProjection};
use crate::models::event::SecurityEvent;
use crate::models::profile::Profile;

/// Process-local store for development and tests.
///
/// Rows carry an insertion sequence so that equal timestamps still sort
/// newest-first.
#[derive(Default)]
pub struct MemoryStore {
    seq: AtomicU64,
    commands: DashMap<Uuid, (u64, Command)>,
    devices: DashMap<String, Device>,
    profiles: DashMap<String, Profile>,
    events: DashMap<Uuid, (u64, SecurityEvent)>,
}

#[derive(Debug, Deserialize)]
struct Seed {
    #[serde(default)]
    profiles: Vec<Profile>,
    #[serde(default)]
    devices: Vec<Device>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads registered devices and profiles from a JSON file of the form
    /// `{"profiles": [...], "devices": [...]}`.
    pub fn from_seed_file(path: &Path) -> DomainResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DomainError::Store(format!("cannot read {}: {e}", path.display())))?;
        let seed: Seed = serde_json::from_str(&raw)?;

        let store = Self::new();
        for profile in seed.profiles {
            store.insert_profile(profile);
        }
        for device in seed.devices {
            store.insert_device(device);
        }
        Ok(store)
    }

    pub fn insert_device(&self, device: Device) {
        self.devices.insert(device.id.clone(), device);
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.profiles.insert(profile.user_id.clone(), profile);
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

fn newest_first<T>(mut rows: Vec<(u64, DateTime<Utc>, T)>, limit: usize) -> Vec<T> {
    rows.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
    rows.into_iter().take(limit).map(|(_, _, row)| row).collect()
}

#[async_trait]
impl CommandStore for MemoryStore {
    async fn insert(&self, command: &Command) -> DomainResult<()> {
        let seq = self.next_seq();
        self.commands.insert(command.id, (seq, command.clone()));
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Command>> {
        Ok(self.commands.get(&id).map(|entry| entry.1.clone()))
    }

    async fn recent_for_device(&self, device_id: &str, limit: usize) -> DomainResult<Vec<Command>> {
        let rows = self
            .commands
            .iter()
            .filter(|entry| entry.1.device_id == device_id)
            .map(|entry| (entry.0, entry.1.created_at, entry.1.clone()))
            .collect();
        Ok(newest_first(rows, limit))
    }

    async fn pending_for_device(&self, device_id: &str) -> DomainResult<Vec<Command>> {
        let mut rows: Vec<(u64, Command)> = self
            .commands
            .iter()
            .filter(|entry| {
                entry.1.device_id == device_id && entry.1.status == CommandStatus::Pending
            })
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then(a.0.cmp(&b.0)));
        Ok(rows.into_iter().map(|(_, command)| command).collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: CommandStatus,
        update: &StatusUpdate,
    ) -> DomainResult<bool> {
        let Some(mut entry) = self.commands.get_mut(&id) else {
            return Err(DomainError::CommandNotFound(id.to_string()));
        };
        if entry.1.status != expected {
            return Ok(false);
        }
        update.apply(&mut entry.1);
        Ok(true)
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn get(&self, device_id: &str) -> DomainResult<Option<Device>> {
        Ok(self.devices.get(device_id).map(|d| d.clone()))
    }

    async fn list_for_owner(&self, owner_id: &str) -> DomainResult<Vec<Device>> {
        let mut devices: Vec<Device> = self
            .devices
            .iter()
            .filter(|d| d.owner_id == owner_id)
            .map(|d| d.clone())
            .collect();
        devices.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(devices)
    }

    async fn apply_projection(
        &self,
        device_id: &str,
        projection: &LockProjection,
    ) -> DomainResult<()> {
        let mut device = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| DomainError::DeviceNotFound(device_id.to_string()))?;
        projection.apply(&mut device.lock);
        device.last_activity = projection.at;
        Ok(())
    }

    async fn touch(&self, device_id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        let mut device = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| DomainError::DeviceNotFound(device_id.to_string()))?;
        device.last_activity = at;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get(&self, user_id: &str) -> DomainResult<Option<Profile>> {
        Ok(self.profiles.get(user_id).map(|p| p.clone()))
    }

    async fn apply_projection(
        &self,
        user_id: &str,
        projection: &LockProjection,
    ) -> DomainResult<()> {
        let mut profile = self
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| DomainError::DeviceNotFound(format!("profile {user_id}")))?;
        projection.apply(&mut profile.lock);
        profile.last_activity = Some(projection.at);
        Ok(())
    }

    async fn touch(&self, user_id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        let mut profile = self
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| DomainError::DeviceNotFound(format!("profile {user_id}")))?;
        profile.last_activity = Some(at);
        Ok(())
    }
}

#[async_trait]
impl SecurityEventLog for MemoryStore {
    async fn append(&self, event: &SecurityEvent) -> DomainResult<()> {
        let seq = self.next_seq();
        self.events.insert(event.id, (seq, event.clone()));
        Ok(())
    }

    async fn recent_for_device(
        &self,
        device_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<SecurityEvent>> {
        let rows = self
            .events
            .iter()
            .filter(|entry| entry.1.device_id.as_deref() == Some(device_id))
            .map(|entry| (entry.0, entry.1.timestamp, entry.1.clone()))
            .collect();
        Ok(newest_first(rows, limit))
    }

    async fn recent_for_principal(
        &self,
        user_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<SecurityEvent>> {
        let rows = self
            .events
            .iter()
            .filter(|entry| entry.1.issued_by == user_id)
            .map(|entry| (entry.0, entry.1.timestamp, entry.1.clone()))
            .collect();
        Ok(newest_first(rows, limit))
    }
}
