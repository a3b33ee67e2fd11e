//! SQLite-backed messaging core: access resolution, thread and message
//! stores, acknowledgment tracking and unread aggregation.

pub mod access;
pub mod acks;
pub mod directory;
pub mod error;
pub mod mentions;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod search;
pub mod threads;
pub mod timestamps;
pub mod unread;

#[cfg(test)]
mod testutil;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing::info;

use taskhub_types::models::TaskAccessPolicy;

pub use error::{DbError, DbResult};
use mentions::MentionIndex;

pub struct Database {
    conn: Mutex<Connection>,
    policy: TaskAccessPolicy,
    mentions: RwLock<MentionIndex>,
}

impl Database {
    pub fn open(path: &Path, policy: TaskAccessPolicy) -> DbResult<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent readers in other processes
        conn.pragma_update(None, "journal_mode", "WAL")?;
        // Other handles on the same file may hold the write lock briefly
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Self::init(conn, policy)?;

        info!("Database opened at {} (task access: {})", path.display(), policy);
        Ok(db)
    }

    pub fn open_in_memory(policy: TaskAccessPolicy) -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?, policy)
    }

    fn init(conn: Connection, policy: TaskAccessPolicy) -> DbResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        let index = MentionIndex::load(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            policy,
            mentions: RwLock::new(index),
        })
    }

    pub fn policy(&self) -> TaskAccessPolicy {
        self.policy
    }

    pub fn with_conn<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))?;
        f(&conn)
    }

    /// Run `f` inside a single transaction; commits on `Ok`, rolls back on `Err`.
    pub fn with_tx<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> DbResult<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))?;
        // Take the write lock up front so a second handle waits on
        // busy_timeout instead of failing a read-to-write upgrade.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub(crate) fn mention_index(&self) -> DbResult<std::sync::RwLockReadGuard<'_, MentionIndex>> {
        self.mentions
            .read()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))
    }

    pub(crate) fn mention_index_mut(
        &self,
    ) -> DbResult<std::sync::RwLockWriteGuard<'_, MentionIndex>> {
        self.mentions
            .write()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))
    }
}
