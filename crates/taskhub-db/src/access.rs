//! Access resolution.
//!
//! Which projects, tasks and threads a user may see is expressed once, as a
//! SQL common-table-expression prefix, and shared by every query that
//! filters by viewer. The task rule depends on [`TaskAccessPolicy`].

use std::collections::HashSet;

use rusqlite::{Connection, named_params};
use uuid::Uuid;

use taskhub_types::models::{ContextTarget, TaskAccessPolicy};

use crate::models::uuid_at;
use crate::{Database, DbError, DbResult};

/// CTE bodies defining `{prefix}_projects`, `{prefix}_tasks` and
/// `{prefix}_threads` for the user bound to `param`. Not prefixed with
/// `WITH` so several can be chained.
pub(crate) fn access_ctes(policy: TaskAccessPolicy, prefix: &str, param: &str) -> String {
    let inherited = match policy {
        TaskAccessPolicy::InheritFromProject => format!(
            "UNION SELECT t.id FROM tasks t WHERE t.project_id IN (SELECT id FROM {prefix}_projects)"
        ),
        TaskAccessPolicy::Independent => String::new(),
    };

    format!(
        "{prefix}_projects(id) AS (
            SELECT id FROM projects WHERE owner_id = {param}
            UNION SELECT project_id FROM project_access WHERE user_id = {param}
        ),
        {prefix}_tasks(id) AS (
            SELECT id FROM tasks WHERE owner_id = {param}
            UNION SELECT task_id FROM task_access WHERE user_id = {param}
            {inherited}
        ),
        {prefix}_threads(id) AS (
            SELECT id FROM threads
             WHERE kind = 'context' AND project_id IN (SELECT id FROM {prefix}_projects)
            UNION SELECT id FROM threads
             WHERE kind = 'context' AND task_id IN (SELECT id FROM {prefix}_tasks)
            UNION SELECT tm.thread_id FROM thread_members tm
              JOIN threads d ON d.id = tm.thread_id
             WHERE d.kind = 'direct' AND tm.user_id = {param}
        )"
    )
}

/// `WITH` clause for the viewer bound to `:viewer`, tables prefixed `acc_`.
pub(crate) fn viewer_scope(policy: TaskAccessPolicy) -> String {
    format!("WITH {}", access_ctes(policy, "acc", ":viewer"))
}

impl Database {
    /// Projects the user owns or holds a grant for.
    pub fn accessible_project_ids(&self, user_id: Uuid) -> DbResult<HashSet<Uuid>> {
        self.with_conn(|conn| query_ids(conn, self.policy, user_id, "acc_projects"))
    }

    /// Tasks the user may see under the configured [`TaskAccessPolicy`].
    pub fn accessible_task_ids(&self, user_id: Uuid) -> DbResult<HashSet<Uuid>> {
        self.with_conn(|conn| query_ids(conn, self.policy, user_id, "acc_tasks"))
    }

    pub fn can_access_thread(&self, user_id: Uuid, thread_id: Uuid) -> DbResult<bool> {
        self.with_conn(|conn| can_access_thread(conn, self.policy, user_id, thread_id))
    }
}

fn query_ids(
    conn: &Connection,
    policy: TaskAccessPolicy,
    user_id: Uuid,
    table: &str,
) -> DbResult<HashSet<Uuid>> {
    let sql = format!("{} SELECT id FROM {}", viewer_scope(policy), table);
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(named_params! { ":viewer": user_id.to_string() }, |row| {
            uuid_at(row, 0)
        })?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}

pub(crate) fn can_access_thread(
    conn: &Connection,
    policy: TaskAccessPolicy,
    user_id: Uuid,
    thread_id: Uuid,
) -> DbResult<bool> {
    let sql = format!(
        "{} SELECT EXISTS(SELECT 1 FROM acc_threads WHERE id = :thread)",
        viewer_scope(policy)
    );
    let found: bool = conn.query_row(
        &sql,
        named_params! {
            ":viewer": user_id.to_string(),
            ":thread": thread_id.to_string(),
        },
        |row| row.get(0),
    )?;
    Ok(found)
}

pub(crate) fn can_access_target(
    conn: &Connection,
    policy: TaskAccessPolicy,
    user_id: Uuid,
    target: ContextTarget,
) -> DbResult<bool> {
    let (table, id) = match target {
        ContextTarget::Project(id) => ("acc_projects", id),
        ContextTarget::Task(id) => ("acc_tasks", id),
    };
    let sql = format!(
        "{} SELECT EXISTS(SELECT 1 FROM {} WHERE id = :target)",
        viewer_scope(policy),
        table
    );
    let found: bool = conn.query_row(
        &sql,
        named_params! {
            ":viewer": user_id.to_string(),
            ":target": id.to_string(),
        },
        |row| row.get(0),
    )?;
    Ok(found)
}

/// Fails with [`DbError::PermissionDenied`] unless the user can see the thread.
pub(crate) fn ensure_thread_access(
    conn: &Connection,
    policy: TaskAccessPolicy,
    user_id: Uuid,
    thread_id: Uuid,
) -> DbResult<()> {
    if can_access_thread(conn, policy, user_id, thread_id)? {
        Ok(())
    } else {
        Err(DbError::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Fixture, db_with};

    #[test]
    fn owner_and_grant_give_project_access() {
        let db = db_with(TaskAccessPolicy::InheritFromProject);
        let f = Fixture::new(&db);
        let owner = f.user("owner");
        let member = f.user("member");
        let stranger = f.user("stranger");
        let project = f.project(owner, "Apollo");
        db.grant_project_access(project, member).unwrap();

        assert!(db.accessible_project_ids(owner).unwrap().contains(&project));
        assert!(db.accessible_project_ids(member).unwrap().contains(&project));
        assert!(db.accessible_project_ids(stranger).unwrap().is_empty());
    }

    #[test]
    fn inherit_policy_propagates_project_access_to_tasks() {
        let db = db_with(TaskAccessPolicy::InheritFromProject);
        let f = Fixture::new(&db);
        let owner = f.user("owner");
        let member = f.user("member");
        let project = f.project(owner, "Apollo");
        let task = f.task(project, owner, "Launch");
        db.grant_project_access(project, member).unwrap();

        assert!(db.accessible_task_ids(member).unwrap().contains(&task));
        // Project owners inherit too.
        assert!(db.accessible_task_ids(owner).unwrap().contains(&task));
    }

    #[test]
    fn independent_policy_requires_task_grant() {
        let db = db_with(TaskAccessPolicy::Independent);
        let f = Fixture::new(&db);
        let owner = f.user("owner");
        let member = f.user("member");
        let project = f.project(owner, "Apollo");
        let task = f.task(project, owner, "Launch");
        db.grant_project_access(project, member).unwrap();

        assert!(!db.accessible_task_ids(member).unwrap().contains(&task));

        db.grant_task_access(task, member).unwrap();
        assert!(db.accessible_task_ids(member).unwrap().contains(&task));
    }

    #[test]
    fn task_thread_visibility_follows_policy() {
        for (policy, expected) in [
            (TaskAccessPolicy::InheritFromProject, true),
            (TaskAccessPolicy::Independent, false),
        ] {
            let db = db_with(policy);
            let f = Fixture::new(&db);
            let owner = f.user("owner");
            let member = f.user("member");
            let project = f.project(owner, "Apollo");
            let task = f.task(project, owner, "Launch");
            db.grant_project_access(project, member).unwrap();
            let thread = db
                .create_context_thread(owner, None, Some(task))
                .unwrap()
                .id;

            assert_eq!(db.can_access_thread(member, thread).unwrap(), expected, "{policy}");
            assert!(db.can_access_thread(owner, thread).unwrap());
        }
    }

    #[test]
    fn direct_threads_are_visible_to_members_only() {
        let db = db_with(TaskAccessPolicy::default());
        let f = Fixture::new(&db);
        let a = f.user("a");
        let b = f.user("b");
        let c = f.user("c");
        let thread = db.create_direct_thread(a, &[b]).unwrap().id;

        assert!(db.can_access_thread(a, thread).unwrap());
        assert!(db.can_access_thread(b, thread).unwrap());
        assert!(!db.can_access_thread(c, thread).unwrap());
    }
}
