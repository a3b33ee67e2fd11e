use rusqlite::types::ToSql;
use uuid::Uuid;

use taskhub_types::models::ThreadKind;

use crate::access::viewer_scope;
use crate::messages::{message_at, message_columns};
use crate::models::{SearchRow, THREAD_COLUMNS, thread_at};
use crate::threads::load_members;
use crate::{Database, DbResult};

impl Database {
    /// Messages in the viewer's threads whose content contains `query`,
    /// ignoring case, newest first. An empty query matches everything.
    ///
    /// SQLite's `lower()` only folds ASCII, so SQL narrows the rows and the
    /// final match is done here. For an ASCII query, SQL keeps rows that
    /// match after ASCII folding plus any row holding a non-ASCII character.
    /// A non-ASCII query cannot be narrowed in SQL.
    pub fn search_messages(&self, viewer: Uuid, query: &str) -> DbResult<Vec<SearchRow>> {
        let needle = query.to_lowercase();
        let prefilter = if needle.is_empty() || !needle.is_ascii() {
            ""
        } else {
            "AND (instr(lower(m.content), :needle) > 0 OR m.content GLOB '*[^ -~]*')"
        };

        self.with_conn(|conn| {
            let sql = format!(
                "{}
                 SELECT {}, {THREAD_COLUMNS}
                 FROM messages m
                 JOIN users u ON u.id = m.sender_id
                 JOIN threads th ON th.id = m.thread_id
                 LEFT JOIN projects p ON p.id = th.project_id
                 LEFT JOIN tasks t ON t.id = th.task_id
                 WHERE m.thread_id IN (SELECT id FROM acc_threads) {prefilter}
                 ORDER BY m.created_at DESC, m.rowid DESC",
                viewer_scope(self.policy),
                message_columns()
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut hits = Vec::new();
            let viewer_param = viewer.to_string();
            let mut named: Vec<(&str, &dyn ToSql)> = vec![(":viewer", &viewer_param)];
            if !prefilter.is_empty() {
                named.push((":needle", &needle));
            }
            let rows = stmt.query_map(named.as_slice(), |row| {
                Ok((message_at(row, 0)?, thread_at(row, 8)?))
            })?;
            for row in rows {
                let (message, thread) = row?;
                if needle.is_empty() || message.content.to_lowercase().contains(&needle) {
                    hits.push((message, thread));
                }
            }

            let direct_ids: Vec<Uuid> = hits
                .iter()
                .filter(|(_, t)| t.kind == ThreadKind::Direct)
                .map(|(_, t)| t.id)
                .collect();
            let members = load_members(conn, &direct_ids)?;

            Ok(hits
                .into_iter()
                .map(|(message, thread)| SearchRow {
                    context: thread.context(
                        viewer,
                        members.get(&thread.id).map(Vec::as_slice).unwrap_or_default(),
                    ),
                    message,
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{Fixture, db_with};
    use taskhub_types::models::{ContextType, TaskAccessPolicy};

    #[test]
    fn substring_search_is_case_insensitive() {
        let db = db_with(TaskAccessPolicy::default());
        let f = Fixture::new(&db);
        let alice = f.user("alice");
        let bob = f.user("bob");
        let project = f.shared_project(alice, &[bob], "Apollo");
        let task = f.task(project, alice, "Launch checklist");
        let project_thread = db.create_context_thread(alice, Some(project), None).unwrap().id;
        let task_thread = db.create_context_thread(alice, None, Some(task)).unwrap().id;

        f.post(project_thread, alice, "This is a TEST message");
        f.post(task_thread, bob, "unrelated");
        f.post(task_thread, alice, "another test here");

        let hits = db.search_messages(bob, "test").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].message.content, "another test here");
        assert_eq!(hits[0].context.kind, ContextType::Task);
        assert_eq!(hits[0].context.id, task);
        assert_eq!(hits[0].context.name, "Launch checklist");
        assert_eq!(hits[1].context.kind, ContextType::Project);
        assert_eq!(hits[1].context.name, "Apollo");

        assert_eq!(db.search_messages(bob, "").unwrap().len(), 3);
    }

    #[test]
    fn search_never_crosses_access_boundaries() {
        let db = db_with(TaskAccessPolicy::default());
        let f = Fixture::new(&db);
        let alice = f.user("alice");
        let bob = f.user("bob");
        let carol = f.user("carol");
        let private = f.project(alice, "Private");
        let thread = db.create_context_thread(alice, Some(private), None).unwrap().id;
        let dm = db.create_direct_thread(bob, &[carol]).unwrap().id;

        f.post(thread, alice, "secret plan");
        f.post(dm, carol, "Plan for lunch?");

        let hits = db.search_messages(bob, "PLAN").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].context.kind, ContextType::Direct);
        assert_eq!(hits[0].context.name, "carol");
        assert!(db.search_messages(alice, "lunch").unwrap().is_empty());
    }

    #[test]
    fn non_ascii_case_folding() {
        let db = db_with(TaskAccessPolicy::default());
        let f = Fixture::new(&db);
        let a = f.user("a");
        let b = f.user("b");
        let dm = db.create_direct_thread(a, &[b]).unwrap().id;
        f.post(dm, a, "ÜBER wichtig");

        assert_eq!(db.search_messages(b, "über").unwrap().len(), 1);
        // The Kelvin sign lowercases to an ASCII 'k' that SQLite cannot see.
        f.post(dm, a, "\u{212A}ELVIN scale");
        assert_eq!(db.search_messages(b, "kelvin").unwrap().len(), 1);
    }

    #[test]
    fn query_is_matched_verbatim() {
        let db = db_with(TaskAccessPolicy::default());
        let f = Fixture::new(&db);
        let a = f.user("a");
        let b = f.user("b");
        let dm = db.create_direct_thread(a, &[b]).unwrap().id;
        f.post(dm, a, "test run");
        f.post(dm, a, "a test");

        let hits = db.search_messages(b, " test").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message.content, "a test");
        assert_eq!(db.search_messages(b, "TEST").unwrap().len(), 2);
        assert!(db.search_messages(b, "rest").unwrap().is_empty());
    }
}
