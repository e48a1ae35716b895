use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A timestamp as it arrives from a writer.
///
/// Clients write epoch milliseconds; server-assigned values arrive as
/// RFC 3339 strings. Both convert to `DateTime<Utc>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    EpochMillis(i64),
    Server(DateTime<Utc>),
}

impl Timestamp {
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::EpochMillis(ms) => Utc.timestamp_millis_opt(ms).single(),
            Timestamp::Server(dt) => Some(dt),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp::Server(dt)
    }
}

pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "N/A".to_string(),
    }
}
