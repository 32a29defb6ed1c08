use dashmap::DashMap;
use tokio::sync::broadcast;

/// Per-group broadcast channels feeding the notification sockets.
///
/// Payloads are already encoded frames so every subscriber forwards them verbatim.
pub struct NotificationHub {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl NotificationHub {
    /// Hub whose channels buffer `capacity` messages; at least one.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber on the channel of `group_id`.
    pub fn subscribe(&self, group_id: &str) -> broadcast::Receiver<String> {
        self.channels
            .entry(group_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish to every subscriber of `group_id` and return how many received it.
    pub fn publish(&self, group_id: &str, payload: String) -> usize {
        let delivered = self
            .channels
            .get(group_id)
            .and_then(|sender| sender.send(payload).ok())
            .unwrap_or(0);
        if delivered == 0 {
            self.prune(group_id);
        }
        delivered
    }

    /// Drop the channel of `group_id` once nobody listens to it anymore.
    pub fn prune(&self, group_id: &str) {
        self.channels
            .remove_if(group_id, |_, sender| sender.receiver_count() == 0);
    }

    /// Live receivers on the channel of `group_id`.
    pub fn subscriber_count(&self, group_id: &str) -> usize {
        self.channels
            .get(group_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}
