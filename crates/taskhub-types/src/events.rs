use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event name published when a message is posted to a thread.
pub const MESSAGE_ADDED: &str = "message_added";

/// Event name published on a user's personal channel when they are @mentioned.
pub const MENTIONED: &str = "mentioned";

/// Pub/sub channel a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Everyone following a thread (context or direct).
    Thread(Uuid),
    /// A single user's personal feed.
    User(Uuid),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thread(id) => write!(f, "thread-{}", id),
            Self::User(id) => write!(f, "user-{}", id),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, id) = s
            .split_once('-')
            .ok_or_else(|| format!("malformed channel '{}'", s))?;
        let id: Uuid = id.parse().map_err(|_| format!("malformed channel id in '{}'", s))?;
        match prefix {
            "thread" => Ok(Self::Thread(id)),
            "user" => Ok(Self::User(id)),
            _ => Err(format!("unknown channel prefix '{}'", prefix)),
        }
    }
}

/// Payload of `message_added`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAdded {
    pub content: String,
    pub sender: Uuid,
}

/// Payload of `mentioned`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mentioned {
    pub thread_id: Uuid,
    pub message_id: Uuid,
    pub sender: Uuid,
}

/// A notification as it travels through the in-process dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub channel: String,
    pub event: String,
    pub data: serde_json::Value,
}

/// Frames sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    Ready { user_id: Uuid, username: String },

    /// A notification on a channel this client subscribed to
    Event(Notification),

    /// A subscription request was refused (no access or malformed channel)
    SubscribeDenied { channel: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start receiving events for these channels.
    Subscribe { channels: Vec<String> },

    /// Stop receiving events for these channels.
    Unsubscribe { channels: Vec<String> },
}
