use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::agent::AgentMessage;

/// Per-device broadcast channels for connected agents.
///
/// Messages are nudges only. A device with no live connection simply
/// misses them and picks its commands up on the next poll.
#[derive(Default)]
pub struct AgentHub {
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl AgentHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, device_id: &str) -> broadcast::Receiver<String> {
        self.channels
            .entry(device_id.to_string())
            .or_insert_with(|| broadcast::channel(100).0)
            .subscribe()
    }

    /// Returns how many connections received the message.
    pub fn notify(&self, device_id: &str, msg: &AgentMessage) -> usize {
        let Some(tx) = self.channels.get(device_id) else {
            return 0;
        };
        let payload = match serde_json::to_string(msg) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Failed to encode agent message: {}", e);
                return 0;
            }
        };
        let delivered = tx.send(payload).unwrap_or(0);
        debug!(device_id, delivered, "agent nudged");
        delivered
    }

    /// Drops the channel once its last subscriber is gone.
    pub fn release(&self, device_id: &str) {
        self.channels
            .remove_if(device_id, |_, tx| tx.receiver_count() == 0);
    }

    #[cfg(test)]
    pub(crate) fn has_channel(&self, device_id: &str) -> bool {
        self.channels.contains_key(device_id)
    }
}
