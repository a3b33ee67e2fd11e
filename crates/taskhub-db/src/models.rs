//! Row types returned by the store. Identifiers and timestamps are parsed
//! at the row boundary so callers never see raw column text.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use taskhub_types::api::ThreadContext;
use taskhub_types::models::{ContextTarget, ContextType, ThreadKind, UserRef};

use crate::timestamps;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub id: Uuid,
    pub title: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: Uuid,
    pub title: String,
    pub project_id: Uuid,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ThreadRow {
    pub id: Uuid,
    pub kind: ThreadKind,
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub project_title: Option<String>,
    pub task_title: Option<String>,
}

impl ThreadRow {
    pub fn target(&self) -> Option<ContextTarget> {
        ContextTarget::from_parts(self.project_id, self.task_id)
    }

    /// How this thread is presented to `viewer`. Direct threads are named
    /// after the other members.
    pub fn context(&self, viewer: Uuid, members: &[UserRef]) -> ThreadContext {
        match (self.kind, self.target()) {
            (ThreadKind::Context, Some(ContextTarget::Project(id))) => ThreadContext {
                kind: ContextType::Project,
                id,
                name: self.project_title.clone().unwrap_or_default(),
            },
            (ThreadKind::Context, Some(ContextTarget::Task(id))) => ThreadContext {
                kind: ContextType::Task,
                id,
                name: self.task_title.clone().unwrap_or_default(),
            },
            _ => ThreadContext {
                kind: ContextType::Direct,
                id: self.id,
                name: direct_thread_name(viewer, members),
            },
        }
    }
}

fn direct_thread_name(viewer: Uuid, members: &[UserRef]) -> String {
    let mut others: Vec<&str> = members
        .iter()
        .filter(|m| m.id != viewer)
        .map(|m| m.username.as_str())
        .collect();
    if others.is_empty() {
        others = members.iter().map(|m| m.username.as_str()).collect();
    }
    others.sort_unstable();
    others.join(", ")
}

/// A thread as it appears in a viewer's listing.
#[derive(Debug, Clone)]
pub struct ThreadListing {
    pub thread: ThreadRow,
    pub context: ThreadContext,
    pub members: Vec<UserRef>,
    pub unread_count: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender: UserRef,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Read state for the viewer the row was loaded for.
    pub acked: bool,
}

/// Result of a successful post: the stored message plus the users it
/// @mentions who can see the thread.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub message: MessageRow,
    pub mentioned: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct Watermark {
    pub thread_id: Uuid,
    pub seen_at: DateTime<Utc>,
    pub unread_count: u64,
}

#[derive(Debug, Clone)]
pub struct UnreadThreadRow {
    pub thread_id: Uuid,
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub context: ThreadContext,
    pub unread_count: u64,
    pub last_unread_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CounterpartRow {
    pub user: UserRef,
    pub unread_count: u64,
    pub last_unread_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SearchRow {
    pub message: MessageRow,
    pub context: ThreadContext,
}

// -- Column helpers --

pub(crate) const THREAD_COLUMNS: &str = "th.id, th.kind, th.project_id, th.task_id, th.created_by, \
     th.created_at, th.updated_at, p.title, t.title";

pub(crate) const THREAD_FROM: &str = "FROM threads th \
     LEFT JOIN projects p ON p.id = th.project_id \
     LEFT JOIN tasks t ON t.id = th.task_id";

/// Reads the nine `THREAD_COLUMNS` starting at column `at`.
pub(crate) fn thread_at(row: &Row<'_>, at: usize) -> rusqlite::Result<ThreadRow> {
    Ok(ThreadRow {
        id: uuid_at(row, at)?,
        kind: kind_at(row, at + 1)?,
        project_id: opt_uuid_at(row, at + 2)?,
        task_id: opt_uuid_at(row, at + 3)?,
        created_by: opt_uuid_at(row, at + 4)?,
        created_at: ts_at(row, at + 5)?,
        updated_at: ts_at(row, at + 6)?,
        project_title: row.get(at + 7)?,
        task_title: row.get(at + 8)?,
    })
}

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| {
        r.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    timestamps::from_sql(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| {
        timestamps::from_sql(&r)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn kind_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<ThreadKind> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

pub(crate) fn count_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let n: i64 = row.get(idx)?;
    Ok(n.max(0) as u64)
}
