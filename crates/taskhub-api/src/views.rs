//! Response shapes. Reads and writes return different DTOs for the same
//! entity; [`RequestKind`] picks which one and the status code that goes
//! with it.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use taskhub_db::models::{
    CounterpartRow, MessageRow, SearchRow, ThreadListing, UnreadThreadRow,
};
use taskhub_types::api::{
    CounterpartUnread, MessageCreated, MessageResponse, SearchHit, ThreadCreated, ThreadSummary,
    UnreadThread,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
}

impl RequestKind {
    pub fn status(self) -> StatusCode {
        match self {
            Self::Read => StatusCode::OK,
            Self::Write => StatusCode::CREATED,
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum ThreadView {
    Summary(ThreadSummary),
    Created(ThreadCreated),
}

impl ThreadView {
    pub fn new(kind: RequestKind, listing: ThreadListing) -> Self {
        match kind {
            RequestKind::Read => Self::Summary(thread_summary(listing)),
            RequestKind::Write => Self::Created(ThreadCreated {
                id: listing.thread.id,
                kind: listing.thread.kind,
                project_id: listing.thread.project_id,
                task_id: listing.thread.task_id,
                member_ids: listing.members.iter().map(|m| m.id).collect(),
                created_at: listing.thread.created_at,
            }),
        }
    }
}

impl IntoResponse for ThreadView {
    fn into_response(self) -> Response {
        match self {
            Self::Summary(s) => (RequestKind::Read.status(), Json(s)).into_response(),
            Self::Created(c) => (RequestKind::Write.status(), Json(c)).into_response(),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum MessageView {
    Full(MessageResponse),
    Created(MessageCreated),
}

impl MessageView {
    pub fn new(kind: RequestKind, row: MessageRow) -> Self {
        match kind {
            RequestKind::Read => Self::Full(message_response(row)),
            RequestKind::Write => Self::Created(MessageCreated {
                id: row.id,
                thread_id: row.thread_id,
                sender_id: row.sender.id,
                content: row.content,
                created_at: row.created_at,
            }),
        }
    }
}

impl IntoResponse for MessageView {
    fn into_response(self) -> Response {
        match self {
            Self::Full(m) => (RequestKind::Read.status(), Json(m)).into_response(),
            Self::Created(c) => (RequestKind::Write.status(), Json(c)).into_response(),
        }
    }
}

fn thread_summary(listing: ThreadListing) -> ThreadSummary {
    ThreadSummary {
        id: listing.thread.id,
        kind: listing.thread.kind,
        context: listing.context,
        created_by: listing.thread.created_by,
        members: listing.members,
        unread_count: listing.unread_count,
        last_message_at: listing.last_message_at,
        created_at: listing.thread.created_at,
        updated_at: listing.thread.updated_at,
    }
}

fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id,
        thread_id: row.thread_id,
        sender: row.sender,
        content: row.content,
        created_at: row.created_at,
        acked: row.acked,
    }
}

pub fn search_hit(row: SearchRow) -> SearchHit {
    SearchHit {
        message: message_response(row.message),
        context: row.context,
    }
}

pub fn unread_thread(row: UnreadThreadRow) -> UnreadThread {
    UnreadThread {
        project: row.project_id,
        task: row.task_id,
        thread_id: row.thread_id,
        kind: row.context.kind,
        name: row.context.name,
        unread_count: row.unread_count,
        last_unread_message_created_at: row.last_unread_at,
    }
}

pub fn counterpart_unread(row: CounterpartRow) -> CounterpartUnread {
    CounterpartUnread {
        user: row.user,
        unread_count: row.unread_count,
        last_unread_message_created_at: row.last_unread_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskhub_types::models::UserRef;
    use uuid::Uuid;

    fn row() -> MessageRow {
        let now = Utc::now();
        MessageRow {
            id: Uuid::new_v4(),
            thread_id: Uuid::new_v4(),
            sender: UserRef {
                id: Uuid::new_v4(),
                username: "alice".into(),
            },
            content: "hi".into(),
            created_at: now,
            updated_at: now,
            acked: true,
        }
    }

    #[test]
    fn request_kind_selects_message_shape() {
        let msg = row();
        match MessageView::new(RequestKind::Write, msg.clone()) {
            MessageView::Created(c) => assert_eq!(c.sender_id, msg.sender.id),
            MessageView::Full(_) => panic!("write should produce the created shape"),
        }
        match MessageView::new(RequestKind::Read, msg) {
            MessageView::Full(m) => assert!(m.acked),
            MessageView::Created(_) => panic!("read should produce the full shape"),
        }
    }

    #[test]
    fn views_serialize_as_the_bare_dto() {
        let value = serde_json::to_value(MessageView::new(RequestKind::Read, row())).unwrap();
        assert_eq!(value["sender"]["username"], "alice");
        assert_eq!(value["acked"], true);
        let value = serde_json::to_value(MessageView::new(RequestKind::Write, row())).unwrap();
        assert!(value.get("sender_id").is_some());
        assert!(value.get("acked").is_none());
    }

    #[test]
    fn writes_answer_created() {
        assert_eq!(RequestKind::Write.status(), StatusCode::CREATED);
        let resp = MessageView::new(RequestKind::Write, row()).into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let resp = MessageView::new(RequestKind::Read, row()).into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
