use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;
use uuid::Uuid;

use taskhub_types::models::UserRef;

use crate::access::{can_access_thread, ensure_thread_access};
use crate::models::{MessageRow, PostedMessage, ts_at, uuid_at};
use crate::threads::require_thread;
use crate::unread::UNREAD_FOR_VIEWER;
use crate::{Database, DbError, DbResult, timestamps};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Cursor-based page of a thread's history, newest first: up to `limit`
/// messages older than `before`. Pass the last seen message's id as
/// `before_id` too, so messages sharing its timestamp are not skipped.
#[derive(Debug, Clone, Copy)]
pub struct MessagePage {
    pub limit: u32,
    pub before: Option<DateTime<Utc>>,
    pub before_id: Option<Uuid>,
}

impl Default for MessagePage {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            before: None,
            before_id: None,
        }
    }
}

impl MessagePage {
    /// The page after `last`, the oldest message of the previous page.
    pub fn after(limit: u32, last: &MessageRow) -> Self {
        Self {
            limit,
            before: Some(last.created_at),
            before_id: Some(last.id),
        }
    }
}

impl Database {
    /// Append a message to a thread the sender can access.
    pub fn post_message(&self, thread_id: Uuid, sender: Uuid, content: &str) -> DbResult<PostedMessage> {
        if content.trim().is_empty() {
            return Err(DbError::validation("content", "must not be empty"));
        }

        // Resolve names before taking the connection lock.
        let candidates = self.mention_index()?.resolve(content);

        self.with_tx(|tx| {
            require_thread(tx, thread_id)?;
            ensure_thread_access(tx, self.policy, sender, thread_id)?;

            let id = Uuid::new_v4();
            let now = timestamps::now();
            let now_sql = timestamps::to_sql(now);
            tx.execute(
                "INSERT INTO messages (id, thread_id, sender_id, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id.to_string(), thread_id.to_string(), sender.to_string(), content, now_sql],
            )?;
            tx.execute(
                "UPDATE threads SET updated_at = ?2 WHERE id = ?1",
                params![thread_id.to_string(), now_sql],
            )?;

            let username: String = tx
                .query_row(
                    "SELECT username FROM users WHERE id = ?1",
                    [sender.to_string()],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| DbError::not_found("user", sender))?;

            let mut mentioned = Vec::with_capacity(candidates.len());
            for user in candidates {
                if user != sender && can_access_thread(tx, self.policy, user, thread_id)? {
                    mentioned.push(user);
                }
            }

            debug!("Message {} posted to thread {} ({} mentions)", id, thread_id, mentioned.len());
            Ok(PostedMessage {
                message: MessageRow {
                    id,
                    thread_id,
                    sender: UserRef {
                        id: sender,
                        username,
                    },
                    content: content.to_string(),
                    created_at: now,
                    updated_at: now,
                    acked: false,
                },
                mentioned,
            })
        })
    }

    /// A page of the thread's messages, newest first, with the viewer's read
    /// state on each.
    pub fn list_messages(
        &self,
        thread_id: Uuid,
        viewer: Uuid,
        page: MessagePage,
    ) -> DbResult<Vec<MessageRow>> {
        self.with_conn(|conn| {
            require_thread(conn, thread_id)?;
            ensure_thread_access(conn, self.policy, viewer, thread_id)?;
            query_messages(conn, thread_id, viewer, page)
        })
    }

    pub fn message_count(&self, thread_id: Uuid) -> DbResult<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE thread_id = ?1",
                [thread_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(n.max(0) as u64)
        })
    }
}

/// Columns read by [`message_at`]; the last one needs `:viewer` bound.
pub(crate) fn message_columns() -> String {
    format!(
        "m.id, m.thread_id, m.sender_id, u.username, m.content, m.created_at, m.updated_at,
         CASE WHEN {UNREAD_FOR_VIEWER} THEN 0 ELSE 1 END"
    )
}

pub(crate) fn message_at(row: &Row<'_>, at: usize) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: uuid_at(row, at)?,
        thread_id: uuid_at(row, at + 1)?,
        sender: UserRef {
            id: uuid_at(row, at + 2)?,
            username: row.get(at + 3)?,
        },
        content: row.get(at + 4)?,
        created_at: ts_at(row, at + 5)?,
        updated_at: ts_at(row, at + 6)?,
        acked: row.get(at + 7)?,
    })
}

fn query_messages(
    conn: &Connection,
    thread_id: Uuid,
    viewer: Uuid,
    page: MessagePage,
) -> DbResult<Vec<MessageRow>> {
    let sql = format!(
        "SELECT {}
         FROM messages m
         JOIN users u ON u.id = m.sender_id
         WHERE m.thread_id = :thread
           AND (:before IS NULL
                OR m.created_at < :before
                OR (m.created_at = :before
                    AND m.rowid < (SELECT rowid FROM messages WHERE id = :before_id)))
         ORDER BY m.created_at DESC, m.rowid DESC
         LIMIT :limit",
        message_columns()
    );

    let thread = thread_id.to_string();
    let viewer = viewer.to_string();
    let before = page.before.map(timestamps::to_sql);
    let before_id = page.before_id.map(|id| id.to_string());
    let limit = i64::from(page.limit.clamp(1, MAX_PAGE_SIZE));
    let named: [(&str, &dyn ToSql); 5] = [
        (":thread", &thread),
        (":viewer", &viewer),
        (":before", &before),
        (":before_id", &before_id),
        (":limit", &limit),
    ];

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(named.as_slice(), |row| message_at(row, 0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Thread a message belongs to, or `NotFound`.
pub(crate) fn message_thread_id(conn: &Connection, message_id: Uuid) -> DbResult<Uuid> {
    let raw: String = conn
        .query_row(
            "SELECT thread_id FROM messages WHERE id = ?1",
            [message_id.to_string()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| DbError::not_found("message", message_id))?;
    raw.parse()
        .map_err(|_| DbError::Corrupt(format!("thread id '{}' on message {}", raw, message_id)))
}
