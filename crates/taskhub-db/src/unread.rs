//! Unread aggregation.
//!
//! A message `m` is read by the viewer when the viewer has an explicit ack
//! row for it, or holds a thread watermark at or after `m.created_at`.
//! Everything else is unread, including the viewer's own messages.

use rusqlite::{Connection, named_params};
use uuid::Uuid;

use taskhub_types::models::{ThreadKind, UserRef};

use crate::access::{ensure_thread_access, viewer_scope};
use crate::directory::user_exists;
use crate::models::{CounterpartRow, ThreadListing, UnreadThreadRow, count_at, thread_at, ts_at, uuid_at, THREAD_COLUMNS, THREAD_FROM};
use crate::threads::{Scope, load_members, query_listings, require_thread};
use crate::{Database, DbError, DbResult};

/// SQL predicate over a `messages` row aliased `m`, true when `:viewer` has
/// not read it.
pub(crate) const UNREAD_FOR_VIEWER: &str = "NOT EXISTS (
        SELECT 1 FROM message_acks a WHERE a.message_id = m.id AND a.user_id = :viewer
    ) AND NOT EXISTS (
        SELECT 1 FROM thread_acks w
         WHERE w.thread_id = m.thread_id AND w.user_id = :viewer AND m.created_at <= w.seen_at
    )";

impl Database {
    pub fn unread_count(&self, thread_id: Uuid, viewer: Uuid) -> DbResult<u64> {
        self.with_conn(|conn| {
            require_thread(conn, thread_id)?;
            ensure_thread_access(conn, self.policy, viewer, thread_id)?;
            count_unread(conn, thread_id, viewer)
        })
    }

    /// Every accessible thread with at least one unread message, most
    /// recent unread first.
    pub fn unread_threads(&self, viewer: Uuid) -> DbResult<Vec<UnreadThreadRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{}
                 SELECT {THREAD_COLUMNS}, COUNT(m.id), MAX(m.created_at)
                 {THREAD_FROM}
                 JOIN messages m ON m.thread_id = th.id
                 WHERE th.id IN (SELECT id FROM acc_threads) AND {UNREAD_FOR_VIEWER}
                 GROUP BY th.id
                 ORDER BY MAX(m.created_at) DESC",
                viewer_scope(self.policy)
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(named_params! { ":viewer": viewer.to_string() }, |row| {
                    Ok((thread_at(row, 0)?, count_at(row, 9)?, ts_at(row, 10)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let direct_ids: Vec<Uuid> = rows
                .iter()
                .filter(|(t, _, _)| t.kind == ThreadKind::Direct)
                .map(|(t, _, _)| t.id)
                .collect();
            let members = load_members(conn, &direct_ids)?;

            Ok(rows
                .into_iter()
                .map(|(thread, unread_count, last_unread_at)| {
                    let context = thread.context(
                        viewer,
                        members.get(&thread.id).map(Vec::as_slice).unwrap_or_default(),
                    );
                    UnreadThreadRow {
                        thread_id: thread.id,
                        project_id: thread.project_id,
                        task_id: thread.task_id,
                        context,
                        unread_count,
                        last_unread_at,
                    }
                })
                .collect())
        })
    }

    /// Threads that both the viewer and `other` can access, with the
    /// viewer's unread counts.
    pub fn threads_with_user(&self, viewer: Uuid, other: Uuid) -> DbResult<Vec<ThreadListing>> {
        if viewer == other {
            return Err(DbError::validation("user_id", "cannot list threads shared with yourself"));
        }
        self.with_conn(|conn| {
            if !user_exists(conn, other)? {
                return Err(DbError::not_found("user", other));
            }
            query_listings(conn, self.policy, viewer, Scope::SharedWith(other))
        })
    }

    /// Unread messages across all the viewer's threads, grouped by sender.
    /// The viewer never appears as their own counterpart.
    pub fn per_counterpart_unread(&self, viewer: Uuid) -> DbResult<Vec<CounterpartRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{}
                 SELECT u.id, u.username, COUNT(m.id) AS unread, MAX(m.created_at) AS latest
                 FROM messages m
                 JOIN users u ON u.id = m.sender_id
                 WHERE m.thread_id IN (SELECT id FROM acc_threads)
                   AND m.sender_id <> :viewer
                   AND {UNREAD_FOR_VIEWER}
                 GROUP BY u.id, u.username
                 ORDER BY unread DESC, latest DESC",
                viewer_scope(self.policy)
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(named_params! { ":viewer": viewer.to_string() }, |row| {
                    Ok(CounterpartRow {
                        user: UserRef {
                            id: uuid_at(row, 0)?,
                            username: row.get(1)?,
                        },
                        unread_count: count_at(row, 2)?,
                        last_unread_at: ts_at(row, 3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn count_unread(conn: &Connection, thread_id: Uuid, viewer: Uuid) -> DbResult<u64> {
    let sql = format!(
        "SELECT COUNT(*) FROM messages m WHERE m.thread_id = :thread AND {UNREAD_FOR_VIEWER}"
    );
    let n = conn.query_row(
        &sql,
        named_params! {
            ":thread": thread_id.to_string(),
            ":viewer": viewer.to_string(),
        },
        |row| count_at(row, 0),
    )?;
    Ok(n)
}
