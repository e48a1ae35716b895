//! Fixtures shared by the unit tests.

use chrono::Utc;

use crate::models::device::{Device, DeviceInfo, DeviceOrigin, LockState};
use crate::models::profile::{Profile, ProfileDeviceInfo};

pub const SECRET: &str = "test-secret";

pub fn registered_device(id: &str, owner: &str, blocked: bool) -> Device {
    let now = Utc::now();
    Device {
        id: id.to_string(),
        owner_id: owner.to_string(),
        info: DeviceInfo {
            name: "Pixel".to_string(),
            brand: "Google".to_string(),
            model_name: "Pixel 8".to_string(),
            os_name: "Android".to_string(),
            os_version: "14".to_string(),
        },
        lock: LockState {
            blocked,
            blocked_at: blocked.then_some(now),
            block_reason: blocked.then(|| "remote_lock".to_string()),
            unblocked_at: None,
        },
        last_activity: now,
        registered_at: Some(now),
        origin: DeviceOrigin::Registered,
    }
}

pub fn profile(user_id: &str, blocked: bool) -> Profile {
    let now = Utc::now();
    Profile {
        user_id: user_id.to_string(),
        email: Some(format!("{user_id}@example.com")),
        device_info: Some(ProfileDeviceInfo {
            brand: Some("Acme".to_string()),
            ..Default::default()
        }),
        lock: LockState {
            blocked,
            blocked_at: blocked.then_some(now),
            block_reason: blocked.then(|| "remote_lock".to_string()),
            unblocked_at: None,
        },
        last_activity: None,
        created_at: now,
    }
}
