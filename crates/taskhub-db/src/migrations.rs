use rusqlite::{Connection, params};
use tracing::info;

use crate::DbResult;
use crate::mentions::username_key;

pub fn run(conn: &Connection) -> DbResult<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            -- Collaborator tables: owned by the project/task CRUD service,
            -- read here to resolve access and display names.
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE COLLATE NOCASE,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE projects (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                owner_id    TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            CREATE TABLE tasks (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                owner_id    TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_tasks_project ON tasks(project_id);

            CREATE TABLE project_access (
                project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (project_id, user_id)
            );

            CREATE INDEX idx_project_access_user ON project_access(user_id);

            CREATE TABLE task_access (
                task_id     TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (task_id, user_id)
            );

            CREATE INDEX idx_task_access_user ON task_access(user_id);

            -- Messaging core
            CREATE TABLE threads (
                id          TEXT PRIMARY KEY,
                kind        TEXT NOT NULL CHECK (kind IN ('context', 'direct')),
                project_id  TEXT REFERENCES projects(id) ON DELETE CASCADE,
                task_id     TEXT REFERENCES tasks(id) ON DELETE CASCADE,
                created_by  TEXT REFERENCES users(id),
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                CHECK (
                    (kind = 'context' AND ((project_id IS NULL) <> (task_id IS NULL)))
                    OR (kind = 'direct' AND project_id IS NULL AND task_id IS NULL)
                )
            );

            CREATE INDEX idx_threads_project ON threads(project_id);
            CREATE INDEX idx_threads_task ON threads(task_id);

            CREATE TABLE thread_members (
                thread_id   TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (thread_id, user_id)
            );

            CREATE INDEX idx_thread_members_user ON thread_members(user_id);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                thread_id   TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                sender_id   TEXT NOT NULL REFERENCES users(id),
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_thread ON messages(thread_id, created_at);
            CREATE INDEX idx_messages_sender ON messages(sender_id);

            CREATE TABLE message_acks (
                id          TEXT PRIMARY KEY,
                message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                seen_at     TEXT NOT NULL,
                UNIQUE (message_id, user_id)
            );

            CREATE TABLE thread_acks (
                id          TEXT PRIMARY KEY,
                thread_id   TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                seen_at     TEXT NOT NULL,
                UNIQUE (thread_id, user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        // COLLATE NOCASE only folds ASCII, so "Émile" and "émile" could both
        // be inserted while sharing one mention. Uniqueness moves to a key
        // folded the same way the mention index folds.
        info!("DB: running migration v2 (normalized username key)");
        conn.execute_batch("ALTER TABLE users ADD COLUMN username_key TEXT;")?;

        let users: Vec<(String, String)> = {
            let mut stmt = conn.prepare("SELECT id, username FROM users")?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<_, _>>()?
        };
        for (id, username) in users {
            conn.execute(
                "UPDATE users SET username_key = ?2 WHERE id = ?1",
                params![id, username_key(&username)],
            )?;
        }

        conn.execute_batch(
            "
            CREATE UNIQUE INDEX idx_users_username_key ON users(username_key);
            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
