//! Users, projects, tasks and access grants.
//!
//! These rows belong to the project/task service. The messaging core only
//! reads them, but exposes inserts so that service (and tests) can populate
//! a shared database.

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::mentions::username_key;
use crate::models::{ProjectRow, TaskRow, UserRow, ts_at, uuid_at};
use crate::{Database, DbError, DbResult, timestamps};

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str) -> DbResult<UserRow> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DbError::validation("username", "must not be empty"));
        }

        let key = username_key(username);
        let row = UserRow {
            id: Uuid::new_v4(),
            username: username.to_string(),
            created_at: timestamps::now(),
        };
        self.with_conn(|conn| {
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username_key = ?1)",
                [&key],
                |r| r.get(0),
            )?;
            if taken {
                return Err(DbError::validation("username", "already taken"));
            }
            conn.execute(
                "INSERT INTO users (id, username, username_key, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    row.id.to_string(),
                    row.username,
                    key,
                    timestamps::to_sql(row.created_at)
                ],
            )?;
            Ok(())
        })?;

        self.mention_index_mut()?.insert(&row.username, row.id);
        Ok(row)
    }

    pub fn get_user(&self, id: Uuid) -> DbResult<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn get_user_by_username(&self, username: &str) -> DbResult<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, created_at FROM users WHERE username_key = ?1",
                    [username_key(username)],
                    user_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Projects / tasks --

    pub fn create_project(&self, owner_id: Uuid, title: &str) -> DbResult<ProjectRow> {
        let row = ProjectRow {
            id: Uuid::new_v4(),
            title: title.to_string(),
            owner_id,
            created_at: timestamps::now(),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (id, title, owner_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    row.id.to_string(),
                    row.title,
                    owner_id.to_string(),
                    timestamps::to_sql(row.created_at)
                ],
            )?;
            Ok(())
        })?;
        Ok(row)
    }

    pub fn create_task(&self, project_id: Uuid, owner_id: Uuid, title: &str) -> DbResult<TaskRow> {
        let row = TaskRow {
            id: Uuid::new_v4(),
            title: title.to_string(),
            project_id,
            owner_id,
            created_at: timestamps::now(),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (id, title, project_id, owner_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.id.to_string(),
                    row.title,
                    project_id.to_string(),
                    owner_id.to_string(),
                    timestamps::to_sql(row.created_at)
                ],
            )?;
            Ok(())
        })?;
        Ok(row)
    }

    pub fn get_project(&self, id: Uuid) -> DbResult<Option<ProjectRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, title, owner_id, created_at FROM projects WHERE id = ?1",
                    [id.to_string()],
                    |row| {
                        Ok(ProjectRow {
                            id: uuid_at(row, 0)?,
                            title: row.get(1)?,
                            owner_id: uuid_at(row, 2)?,
                            created_at: ts_at(row, 3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_task(&self, id: Uuid) -> DbResult<Option<TaskRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, title, project_id, owner_id, created_at FROM tasks WHERE id = ?1",
                    [id.to_string()],
                    |row| {
                        Ok(TaskRow {
                            id: uuid_at(row, 0)?,
                            title: row.get(1)?,
                            project_id: uuid_at(row, 2)?,
                            owner_id: uuid_at(row, 3)?,
                            created_at: ts_at(row, 4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Grants --

    /// Idempotent: granting twice leaves one row.
    pub fn grant_project_access(&self, project_id: Uuid, user_id: Uuid) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO project_access (project_id, user_id) VALUES (?1, ?2)",
                params![project_id.to_string(), user_id.to_string()],
            )?;
            Ok(())
        })
    }

    /// Idempotent: granting twice leaves one row.
    pub fn grant_task_access(&self, task_id: Uuid, user_id: Uuid) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO task_access (task_id, user_id) VALUES (?1, ?2)",
                params![task_id.to_string(), user_id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn revoke_project_access(&self, project_id: Uuid, user_id: Uuid) -> DbResult<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM project_access WHERE project_id = ?1 AND user_id = ?2",
                params![project_id.to_string(), user_id.to_string()],
            )?;
            Ok(n > 0)
        })
    }
}

pub(crate) fn query_user(conn: &Connection, id: Uuid) -> DbResult<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, username, created_at FROM users WHERE id = ?1",
            [id.to_string()],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn user_exists(conn: &Connection, id: Uuid) -> DbResult<bool> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(found)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: uuid_at(row, 0)?,
        username: row.get(1)?,
        created_at: ts_at(row, 2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::db_with;
    use taskhub_types::models::TaskAccessPolicy;

    #[test]
    fn user_crud() {
        let db = db_with(TaskAccessPolicy::default());

        let alice = db.create_user("alice").unwrap();
        let loaded = db.get_user(alice.id).unwrap().unwrap();
        assert_eq!(loaded.username, "alice");
        assert_eq!(loaded.created_at, alice.created_at);

        // Usernames are unique case-insensitively.
        assert!(matches!(
            db.create_user("ALICE"),
            Err(DbError::Validation { field: "username", .. })
        ));
        assert!(db.get_user_by_username("Alice").unwrap().is_some());
        assert!(db.get_user(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn non_ascii_case_variants_are_one_user() {
        let db = db_with(TaskAccessPolicy::default());
        let emile = db.create_user("Émile").unwrap();

        assert!(matches!(
            db.create_user("émile"),
            Err(DbError::Validation { field: "username", .. })
        ));
        assert_eq!(db.get_user_by_username("ÉMILE").unwrap().unwrap().id, emile.id);
    }

    #[test]
    fn blank_username_is_rejected() {
        let db = db_with(TaskAccessPolicy::default());
        match db.create_user("   ") {
            Err(DbError::Validation { field, .. }) => assert_eq!(field, "username"),
            other => panic!("expected validation error, got {:?}", other.map(|u| u.id)),
        }
    }

    #[test]
    fn grants_are_idempotent_and_revocable() {
        let db = db_with(TaskAccessPolicy::default());
        let owner = db.create_user("owner").unwrap();
        let member = db.create_user("member").unwrap();
        let project = db.create_project(owner.id, "Apollo").unwrap();

        db.grant_project_access(project.id, member.id).unwrap();
        db.grant_project_access(project.id, member.id).unwrap();
        assert!(db.accessible_project_ids(member.id).unwrap().contains(&project.id));

        assert!(db.revoke_project_access(project.id, member.id).unwrap());
        assert!(!db.revoke_project_access(project.id, member.id).unwrap());
        assert!(db.accessible_project_ids(member.id).unwrap().is_empty());
    }

    #[test]
    fn project_and_task_lookup() {
        let db = db_with(TaskAccessPolicy::default());
        let owner = db.create_user("owner").unwrap();
        let project = db.create_project(owner.id, "Apollo").unwrap();
        let task = db.create_task(project.id, owner.id, "Launch").unwrap();

        assert_eq!(db.get_project(project.id).unwrap().unwrap().title, "Apollo");
        let loaded = db.get_task(task.id).unwrap().unwrap();
        assert_eq!(loaded.project_id, project.id);
        assert!(db.get_task(Uuid::new_v4()).unwrap().is_none());
    }
}
