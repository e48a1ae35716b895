use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const REMOTE_LOCK_REASON: &str = "remote_lock";

/// Descriptive fields, fixed at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeviceInfo {
    /// Display name (e.g., "Work phone")
    pub name: String,
    pub brand: String,
    pub model_name: String,
    pub os_name: String,
    pub os_version: String,
}

/// The mutable lock fields shared by device records and profiles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct LockState {
    pub blocked: bool,
    pub blocked_at: Option<DateTime<Utc>>,
    pub block_reason: Option<String>,
    pub unblocked_at: Option<DateTime<Utc>>,
}

impl LockState {
    /// A blocked state must carry `blocked_at`, and any `unblocked_at`
    /// must not be later than it.
    pub fn is_consistent(&self) -> bool {
        if !self.blocked {
            return true;
        }
        match (self.blocked_at, self.unblocked_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(blocked_at), Some(unblocked_at)) => unblocked_at <= blocked_at,
        }
    }
}

/// Where a device view was resolved from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOrigin {
    #[default]
    Registered,
    Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Device {
    pub id: String,
    pub owner_id: String,
    pub info: DeviceInfo,
    #[serde(flatten)]
    pub lock: LockState,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub registered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub origin: DeviceOrigin,
}

/// An optimistic lock/unlock write, applied before the agent confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockProjection {
    pub blocked: bool,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl LockProjection {
    pub fn lock(at: DateTime<Utc>) -> Self {
        Self {
            blocked: true,
            at,
            reason: Some(REMOTE_LOCK_REASON.to_string()),
        }
    }

    pub fn unlock(at: DateTime<Utc>) -> Self {
        Self {
            blocked: false,
            at,
            reason: None,
        }
    }

    pub fn apply(&self, lock: &mut LockState) {
        lock.blocked = self.blocked;
        lock.block_reason = self.reason.clone();
        if self.blocked {
            lock.blocked_at = Some(self.at);
        } else {
            lock.unblocked_at = Some(self.at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn lock_then_unlock_projection() {
        let t0 = Utc::now();
        let mut state = LockState::default();

        LockProjection::lock(t0).apply(&mut state);
        assert!(state.blocked);
        assert_eq!(state.blocked_at, Some(t0));
        assert_eq!(state.block_reason.as_deref(), Some(REMOTE_LOCK_REASON));
        assert!(state.is_consistent());

        let t1 = t0 + Duration::seconds(5);
        LockProjection::unlock(t1).apply(&mut state);
        assert!(!state.blocked);
        assert_eq!(state.unblocked_at, Some(t1));
        assert_eq!(state.block_reason, None);
        // blocked_at is kept as history
        assert_eq!(state.blocked_at, Some(t0));
    }

    #[test]
    fn relock_keeps_invariant() {
        let t0 = Utc::now();
        let mut state = LockState::default();
        LockProjection::lock(t0).apply(&mut state);
        LockProjection::unlock(t0 + Duration::seconds(1)).apply(&mut state);
        LockProjection::lock(t0 + Duration::seconds(2)).apply(&mut state);
        assert!(state.is_consistent());
    }

    #[test]
    fn blocked_without_timestamp_is_inconsistent() {
        let state = LockState {
            blocked: true,
            ..Default::default()
        };
        assert!(!state.is_consistent());

        let now = Utc::now();
        let stale = LockState {
            blocked: true,
            blocked_at: Some(now),
            block_reason: None,
            unblocked_at: Some(now + Duration::seconds(1)),
        };
        assert!(!stale.is_consistent());
    }
}
