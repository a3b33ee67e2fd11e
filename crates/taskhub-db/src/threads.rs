use std::collections::{BTreeSet, HashMap};

use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use taskhub_types::models::{ContextTarget, ThreadKind, UserRef};

use crate::access::{access_ctes, can_access_target, ensure_thread_access, viewer_scope};
use crate::directory::user_exists;
use crate::models::{THREAD_COLUMNS, THREAD_FROM, ThreadListing, ThreadRow, count_at, opt_ts_at, thread_at, uuid_at};
use crate::unread::UNREAD_FOR_VIEWER;
use crate::{Database, DbError, DbResult, timestamps};

/// Which of the viewer's threads a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadFilter {
    #[default]
    All,
    Context,
    Direct,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Scope {
    Filter(ThreadFilter),
    /// Threads both the viewer and this user can access.
    SharedWith(Uuid),
    Single(Uuid),
}

impl Database {
    /// Create a thread attached to exactly one project or task.
    pub fn create_context_thread(
        &self,
        creator: Uuid,
        project_id: Option<Uuid>,
        task_id: Option<Uuid>,
    ) -> DbResult<ThreadRow> {
        let target = ContextTarget::from_parts(project_id, task_id).ok_or_else(|| {
            DbError::validation("project_id", "exactly one of project_id or task_id must be set")
        })?;

        self.with_tx(|tx| {
            if !can_access_target(tx, self.policy, creator, target)? {
                return Err(DbError::PermissionDenied);
            }
            let id = insert_context_thread(tx, creator, target)?;
            require_thread(tx, id)
        })
    }

    /// The oldest context thread attached to `target`, created on demand.
    pub fn get_or_create_context_thread(
        &self,
        user_id: Uuid,
        target: ContextTarget,
    ) -> DbResult<ThreadRow> {
        self.with_tx(|tx| {
            if !can_access_target(tx, self.policy, user_id, target)? {
                return Err(DbError::PermissionDenied);
            }

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM threads
                     WHERE kind = 'context' AND (project_id = ?1 OR task_id = ?2)
                     ORDER BY created_at, rowid LIMIT 1",
                    params![
                        target.project_id().map(|id| id.to_string()),
                        target.task_id().map(|id| id.to_string())
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            let id = match existing {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| DbError::Corrupt(format!("thread id '{}'", raw)))?,
                None => insert_context_thread(tx, user_id, target)?,
            };
            require_thread(tx, id)
        })
    }

    /// Create a direct thread. The creator is always a member; duplicates in
    /// `member_ids` are ignored. Needs two distinct existing users.
    pub fn create_direct_thread(&self, creator: Uuid, member_ids: &[Uuid]) -> DbResult<ThreadRow> {
        let members: BTreeSet<Uuid> = member_ids
            .iter()
            .copied()
            .chain(std::iter::once(creator))
            .collect();
        if members.len() < 2 {
            return Err(DbError::validation(
                "member_ids",
                "a direct thread needs at least two distinct members",
            ));
        }

        self.with_tx(|tx| {
            for id in &members {
                if !user_exists(tx, *id)? {
                    return Err(DbError::validation("member_ids", format!("unknown user {}", id)));
                }
            }

            let id = Uuid::new_v4();
            let now = timestamps::to_sql(timestamps::now());
            tx.execute(
                "INSERT INTO threads (id, kind, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id.to_string(), ThreadKind::Direct.as_str(), creator.to_string(), now],
            )?;
            for member in &members {
                tx.execute(
                    "INSERT INTO thread_members (thread_id, user_id) VALUES (?1, ?2)",
                    params![id.to_string(), member.to_string()],
                )?;
            }
            debug!("Direct thread {} created with {} members", id, members.len());
            require_thread(tx, id)
        })
    }

    pub fn get_thread(&self, id: Uuid) -> DbResult<ThreadRow> {
        self.with_conn(|conn| require_thread(conn, id))
    }

    /// Member user IDs of a direct thread (empty for context threads).
    pub fn thread_member_ids(&self, id: Uuid) -> DbResult<Vec<Uuid>> {
        self.with_conn(|conn| {
            Ok(load_members(conn, &[id])?
                .remove(&id)
                .unwrap_or_default()
                .into_iter()
                .map(|m| m.id)
                .collect())
        })
    }

    /// One thread as the viewer sees it, with unread count.
    pub fn thread_for_viewer(&self, viewer: Uuid, id: Uuid) -> DbResult<ThreadListing> {
        self.with_conn(|conn| {
            require_thread(conn, id)?;
            ensure_thread_access(conn, self.policy, viewer, id)?;
            query_listings(conn, self.policy, viewer, Scope::Single(id))?
                .pop()
                .ok_or_else(|| DbError::not_found("thread", id))
        })
    }

    /// Accessible context threads plus direct threads the viewer belongs to,
    /// most recently active first.
    pub fn list_threads(&self, viewer: Uuid, filter: ThreadFilter) -> DbResult<Vec<ThreadListing>> {
        self.with_conn(|conn| query_listings(conn, self.policy, viewer, Scope::Filter(filter)))
    }
}

fn insert_context_thread(conn: &Connection, creator: Uuid, target: ContextTarget) -> DbResult<Uuid> {
    let id = Uuid::new_v4();
    let now = timestamps::to_sql(timestamps::now());
    conn.execute(
        "INSERT INTO threads (id, kind, project_id, task_id, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            id.to_string(),
            ThreadKind::Context.as_str(),
            target.project_id().map(|p| p.to_string()),
            target.task_id().map(|t| t.to_string()),
            creator.to_string(),
            now
        ],
    )?;
    debug!("Context thread {} created for {:?}", id, target);
    Ok(id)
}

pub(crate) fn require_thread(conn: &Connection, id: Uuid) -> DbResult<ThreadRow> {
    let sql = format!("SELECT {} {} WHERE th.id = ?1", THREAD_COLUMNS, THREAD_FROM);
    conn.query_row(&sql, [id.to_string()], |row| thread_at(row, 0))
        .optional()?
        .ok_or_else(|| DbError::not_found("thread", id))
}

pub(crate) fn query_listings(
    conn: &Connection,
    policy: taskhub_types::models::TaskAccessPolicy,
    viewer: Uuid,
    scope: Scope,
) -> DbResult<Vec<ThreadListing>> {
    let viewer_param = viewer.to_string();
    let scope_param;
    let mut named: Vec<(&str, &dyn ToSql)> = vec![(":viewer", &viewer_param)];

    let mut with = viewer_scope(policy);
    let extra = match scope {
        Scope::Filter(ThreadFilter::All) => "",
        Scope::Filter(ThreadFilter::Context) => "AND th.kind = 'context'",
        Scope::Filter(ThreadFilter::Direct) => "AND th.kind = 'direct'",
        Scope::SharedWith(other) => {
            with.push_str(", ");
            with.push_str(&access_ctes(policy, "other", ":other"));
            scope_param = other.to_string();
            named.push((":other", &scope_param));
            "AND th.id IN (SELECT id FROM other_threads)"
        }
        Scope::Single(id) => {
            scope_param = id.to_string();
            named.push((":thread", &scope_param));
            "AND th.id = :thread"
        }
    };

    let sql = format!(
        "{with}
         SELECT {THREAD_COLUMNS},
                (SELECT COUNT(*) FROM messages m WHERE m.thread_id = th.id AND {UNREAD_FOR_VIEWER}),
                (SELECT MAX(m.created_at) FROM messages m WHERE m.thread_id = th.id)
         {THREAD_FROM}
         WHERE th.id IN (SELECT id FROM acc_threads) {extra}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(named.as_slice(), |row| {
            Ok((thread_at(row, 0)?, count_at(row, 9)?, opt_ts_at(row, 10)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let direct_ids: Vec<Uuid> = rows
        .iter()
        .filter(|(t, _, _)| t.kind == ThreadKind::Direct)
        .map(|(t, _, _)| t.id)
        .collect();
    let mut members = load_members(conn, &direct_ids)?;

    let mut listings: Vec<ThreadListing> = rows
        .into_iter()
        .map(|(thread, unread_count, last_message_at)| {
            let members = members.remove(&thread.id).unwrap_or_default();
            ThreadListing {
                context: thread.context(viewer, &members),
                thread,
                members,
                unread_count,
                last_message_at,
            }
        })
        .collect();

    listings.sort_by(|a, b| {
        let a_at = a.last_message_at.unwrap_or(a.thread.created_at);
        let b_at = b.last_message_at.unwrap_or(b.thread.created_at);
        b_at.cmp(&a_at)
    });
    Ok(listings)
}

/// Batch-fetch direct-thread members for a set of thread IDs.
pub(crate) fn load_members(
    conn: &Connection,
    thread_ids: &[Uuid],
) -> DbResult<HashMap<Uuid, Vec<UserRef>>> {
    if thread_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders: Vec<String> = (1..=thread_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT tm.thread_id, u.id, u.username
         FROM thread_members tm
         JOIN users u ON u.id = tm.user_id
         WHERE tm.thread_id IN ({})
         ORDER BY u.username",
        placeholders.join(", ")
    );

    let ids: Vec<String> = thread_ids.iter().map(|id| id.to_string()).collect();
    let params: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok((
                uuid_at(row, 0)?,
                UserRef {
                    id: uuid_at(row, 1)?,
                    username: row.get(2)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut map: HashMap<Uuid, Vec<UserRef>> = HashMap::new();
    for (thread_id, user) in rows {
        map.entry(thread_id).or_default().push(user);
    }
    Ok(map)
}
