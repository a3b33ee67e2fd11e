use std::sync::Arc;

use tokio::sync::broadcast;

use taskhub_types::events::Notification;

use crate::notifier::{Notifier, NotifyError};

const CHANNEL_CAPACITY: usize = 1024;

/// In-process fan-out to connected gateway clients. Every connection gets
/// every notification and filters by its own subscriptions.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<Notification>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Number of live gateway connections.
    pub fn connection_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }

    pub fn broadcast(&self, notification: Notification) {
        // No receivers just means nobody is connected.
        let _ = self.inner.broadcast_tx.send(notification);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for Dispatcher {
    fn send(&self, channel: &str, event: &str, data: serde_json::Value) -> Result<(), NotifyError> {
        self.broadcast(Notification {
            channel: channel.to_string(),
            event: event.to_string(),
            data,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_notifications() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        assert_eq!(dispatcher.connection_count(), 1);

        dispatcher
            .send("thread-1", "message_added", json!({"content": "hi"}))
            .unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.channel, "thread-1");
        assert_eq!(got.event, "message_added");
        assert_eq!(got.data["content"], "hi");
    }

    #[test]
    fn sending_without_listeners_is_fine() {
        let dispatcher = Dispatcher::default();
        assert!(dispatcher.send("user-1", "mentioned", json!({})).is_ok());
        assert_eq!(dispatcher.connection_count(), 0);
    }
}
