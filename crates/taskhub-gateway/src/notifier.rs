//! Outbound notifications. Delivery is best effort: a failed send is logged
//! and dropped, never surfaced to the request that caused it.

use std::time::Duration;

use tracing::{debug, warn};

use taskhub_db::models::PostedMessage;
use taskhub_types::events::{Channel, MENTIONED, MESSAGE_ADDED, MessageAdded, Mentioned, Notification};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("could not encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no async runtime to deliver on")]
    NoRuntime,

    #[error("notifier unavailable: {0}")]
    Unavailable(String),
}

/// Fan-out sink for real-time events.
pub trait Notifier: Send + Sync {
    fn send(&self, channel: &str, event: &str, data: serde_json::Value) -> Result<(), NotifyError>;
}

/// Send and swallow the error.
pub fn notify_best_effort(notifier: &dyn Notifier, channel: &str, event: &str, data: serde_json::Value) {
    if let Err(e) = notifier.send(channel, event, data) {
        warn!("Dropping {} notification for {}: {}", event, channel, e);
    }
}

/// Announce a freshly posted message on its thread channel, and ping every
/// mentioned user on their personal channel.
pub fn publish_message(notifier: &dyn Notifier, posted: &PostedMessage) {
    let message = &posted.message;

    match serde_json::to_value(MessageAdded {
        content: message.content.clone(),
        sender: message.sender.id,
    }) {
        Ok(data) => notify_best_effort(
            notifier,
            &Channel::Thread(message.thread_id).to_string(),
            MESSAGE_ADDED,
            data,
        ),
        Err(e) => warn!("Could not encode {} for {}: {}", MESSAGE_ADDED, message.id, e),
    }

    for user in &posted.mentioned {
        let payload = Mentioned {
            thread_id: message.thread_id,
            message_id: message.id,
            sender: message.sender.id,
        };
        match serde_json::to_value(payload) {
            Ok(data) => notify_best_effort(notifier, &Channel::User(*user).to_string(), MENTIONED, data),
            Err(e) => warn!("Could not encode {} for {}: {}", MENTIONED, user, e),
        }
    }
}

/// Forwards notifications to an external pub/sub relay over HTTP.
///
/// `send` returns as soon as the request is spawned; delivery failures are
/// logged from the background task.
#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for HttpNotifier {
    fn send(&self, channel: &str, event: &str, data: serde_json::Value) -> Result<(), NotifyError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;
        let body = Notification {
            channel: channel.to_string(),
            event: event.to_string(),
            data,
        };
        let client = self.client.clone();
        let url = self.url.clone();

        runtime.spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!("Relayed {} on {}", body.event, body.channel);
                }
                Ok(resp) => warn!(
                    "Relay rejected {} on {}: HTTP {}",
                    body.event,
                    body.channel,
                    resp.status()
                ),
                Err(e) => warn!("Relay unreachable for {} on {}: {}", body.event, body.channel, e),
            }
        });
        Ok(())
    }
}
