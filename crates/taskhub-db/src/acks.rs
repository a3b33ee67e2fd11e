//! Acknowledgment tracking: explicit per-message acks and per-thread
//! watermarks. Both are idempotent; the unique constraints on
//! `(message_id, user_id)` and `(thread_id, user_id)` absorb concurrent acks.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::debug;
use uuid::Uuid;

use crate::access::{can_access_thread, ensure_thread_access};
use crate::messages::message_thread_id;
use crate::models::Watermark;
use crate::threads::require_thread;
use crate::unread::count_unread;
use crate::{Database, DbError, DbResult, timestamps};

impl Database {
    /// Mark specific messages as read. Messages already acked by this user
    /// are skipped silently. Returns the number of new ack rows.
    pub fn ack_messages(&self, user_id: Uuid, message_ids: &[Uuid]) -> DbResult<usize> {
        self.ack_messages_in(user_id, None, message_ids)
    }

    /// Like [`Database::ack_messages`], but every message must belong to
    /// `thread_id`.
    pub fn ack_thread_messages(
        &self,
        user_id: Uuid,
        thread_id: Uuid,
        message_ids: &[Uuid],
    ) -> DbResult<usize> {
        self.with_conn(|conn| require_thread(conn, thread_id).map(|_| ()))?;
        self.ack_messages_in(user_id, Some(thread_id), message_ids)
    }

    fn ack_messages_in(
        &self,
        user_id: Uuid,
        thread_id: Option<Uuid>,
        message_ids: &[Uuid],
    ) -> DbResult<usize> {
        if message_ids.is_empty() {
            return Err(DbError::validation("message_ids", "must not be empty"));
        }
        let unique: BTreeSet<Uuid> = message_ids.iter().copied().collect();

        self.with_tx(|tx| {
            let mut access: HashMap<Uuid, bool> = HashMap::new();
            let seen_at = timestamps::to_sql(timestamps::now());
            let mut inserted = 0;

            for message_id in unique {
                let owner = message_thread_id(tx, message_id)?;
                if thread_id.is_some_and(|t| t != owner) {
                    return Err(DbError::not_found("message", message_id));
                }
                let allowed = match access.get(&owner) {
                    Some(allowed) => *allowed,
                    None => {
                        let allowed = can_access_thread(tx, self.policy, user_id, owner)?;
                        access.insert(owner, allowed);
                        allowed
                    }
                };
                if !allowed {
                    return Err(DbError::PermissionDenied);
                }

                inserted += tx.execute(
                    "INSERT OR IGNORE INTO message_acks (id, message_id, user_id, seen_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        Uuid::new_v4().to_string(),
                        message_id.to_string(),
                        user_id.to_string(),
                        seen_at
                    ],
                )?;
            }

            debug!("User {} acked {} new messages", user_id, inserted);
            Ok(inserted)
        })
    }

    /// Set the user's read watermark for a thread, replacing any earlier
    /// one. Moving it backwards marks messages unread again. `None` means now.
    pub fn ack_thread(
        &self,
        user_id: Uuid,
        thread_id: Uuid,
        seen_at: Option<DateTime<Utc>>,
    ) -> DbResult<Watermark> {
        let seen_at = seen_at.unwrap_or_else(timestamps::now);
        let seen_sql = timestamps::to_sql(seen_at);

        self.with_tx(|tx| {
            require_thread(tx, thread_id)?;
            ensure_thread_access(tx, self.policy, user_id, thread_id)?;

            tx.execute(
                "INSERT INTO thread_acks (id, thread_id, user_id, seen_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (thread_id, user_id) DO UPDATE SET seen_at = excluded.seen_at",
                params![
                    Uuid::new_v4().to_string(),
                    thread_id.to_string(),
                    user_id.to_string(),
                    seen_sql
                ],
            )?;

            Ok(Watermark {
                thread_id,
                // Read back through the storage format so callers get the
                // exact value comparisons use.
                seen_at: timestamps::from_sql(&seen_sql)
                    .map_err(|e| DbError::Corrupt(e.to_string()))?,
                unread_count: count_unread(tx, thread_id, user_id)?,
            })
        })
    }

    /// Number of ack rows for `(message, user)`: always 0 or 1.
    pub fn message_ack_rows(&self, message_id: Uuid, user_id: Uuid) -> DbResult<u64> {
        self.with_conn(|conn| count_rows(conn, "message_acks", "message_id", message_id, user_id))
    }

    /// Number of watermark rows for `(thread, user)`: always 0 or 1.
    pub fn thread_ack_rows(&self, thread_id: Uuid, user_id: Uuid) -> DbResult<u64> {
        self.with_conn(|conn| count_rows(conn, "thread_acks", "thread_id", thread_id, user_id))
    }
}

fn count_rows(
    conn: &Connection,
    table: &str,
    column: &str,
    id: Uuid,
    user_id: Uuid,
) -> DbResult<u64> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE {} = ?1 AND user_id = ?2", table, column);
    let n: i64 = conn.query_row(&sql, params![id.to_string(), user_id.to_string()], |row| {
        row.get(0)
    })?;
    Ok(n.max(0) as u64)
}
