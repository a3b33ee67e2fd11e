use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ContextType, ThreadKind, UserRef};

// -- JWT Claims --

/// Bearer token claims. Tokens are issued by the auth service; this
/// crate only needs the viewer identity they carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Requests (write models) --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub task_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDirectThreadRequest {
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AckMessagesRequest {
    pub message_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AckThreadRequest {
    /// Watermark to store. Omitted means "now".
    #[serde(default)]
    pub seen_at: Option<DateTime<Utc>>,
}

// -- Responses: threads --

/// Display context of a thread: which project/task it belongs to, or
/// the direct conversation it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadContext {
    #[serde(rename = "type")]
    pub kind: ContextType,
    pub id: Uuid,
    pub name: String,
}

/// Read model returned by thread listings and lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: Uuid,
    pub kind: ThreadKind,
    pub context: ThreadContext,
    pub created_by: Option<Uuid>,
    pub members: Vec<UserRef>,
    pub unread_count: u64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Write model returned right after a thread is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadCreated {
    pub id: Uuid,
    pub kind: ThreadKind,
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub member_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

// -- Responses: messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender: UserRef,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Whether the viewer has read this message.
    pub acked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCreated {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub message: MessageResponse,
    pub context: ThreadContext,
}

// -- Responses: acknowledgments / unread --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    /// Rows newly inserted; already-acked messages are not counted.
    pub acked: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkResponse {
    pub thread_id: Uuid,
    pub seen_at: DateTime<Utc>,
    pub unread_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub thread_id: Uuid,
    pub unread_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadThread {
    pub project: Option<Uuid>,
    pub task: Option<Uuid>,
    pub thread_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ContextType,
    pub name: String,
    pub unread_count: u64,
    pub last_unread_message_created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterpartUnread {
    pub user: UserRef,
    pub unread_count: u64,
    pub last_unread_message_created_at: DateTime<Utc>,
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub field: Option<String>,
}
