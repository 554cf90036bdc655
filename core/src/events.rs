use std::collections::HashMap;

use parking_lot::Mutex;
use realtime_api::ChangeEnvelope;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// In-process fan-out of change envelopes by topic. Stands in for the
/// managed backend's change subscription when both ends live in one process.
pub struct ChangeFeed {
    subscribers: Mutex<HashMap<String, Vec<UnboundedSender<ChangeEnvelope>>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to a topic, returning a receiver for its changes.
    pub fn subscribe(&self, topic: &str) -> UnboundedReceiver<ChangeEnvelope> {
        let (tx, rx) = unbounded_channel();
        self.subscribers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Deliver a change to every live subscriber of its topic. Closed
    /// receivers are pruned.
    pub fn publish(&self, change: ChangeEnvelope) {
        let mut guard = self.subscribers.lock();
        if let Some(list) = guard.get_mut(&change.topic) {
            list.retain(|tx| tx.send(change.clone()).is_ok());
            trace!(topic = %change.topic, subscribers = list.len(), "change published");
            if list.is_empty() {
                guard.remove(&change.topic);
            }
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.lock().get(topic).map_or(0, Vec::len)
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
