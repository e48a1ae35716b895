use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::device::LockState;

/// Device details as recorded on a principal's profile. Any field may be
/// missing on older profiles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDeviceInfo {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub model_name: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
}

/// A principal's profile. Single-device accounts keep their lock state
/// here rather than in a device record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub device_info: Option<ProfileDeviceInfo>,
    #[serde(flatten)]
    pub lock: LockState,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}
