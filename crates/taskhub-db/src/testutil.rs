use chrono::{DateTime, Utc};
use uuid::Uuid;

use taskhub_types::models::TaskAccessPolicy;

use crate::Database;

pub fn db_with(policy: TaskAccessPolicy) -> Database {
    Database::open_in_memory(policy).unwrap()
}

/// Shorthand for seeding collaborator rows.
pub struct Fixture<'a> {
    db: &'a Database,
}

impl<'a> Fixture<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn user(&self, username: &str) -> Uuid {
        self.db.create_user(username).unwrap().id
    }

    pub fn project(&self, owner: Uuid, title: &str) -> Uuid {
        self.db.create_project(owner, title).unwrap().id
    }

    pub fn task(&self, project: Uuid, owner: Uuid, title: &str) -> Uuid {
        self.db.create_task(project, owner, title).unwrap().id
    }

    /// Project owned by `owner` with every user in `members` granted access.
    pub fn shared_project(&self, owner: Uuid, members: &[Uuid], title: &str) -> Uuid {
        let project = self.project(owner, title);
        for m in members {
            self.db.grant_project_access(project, *m).unwrap();
        }
        project
    }

    pub fn post(&self, thread: Uuid, sender: Uuid, content: &str) -> DateTime<Utc> {
        self.db
            .post_message(thread, sender, content)
            .unwrap()
            .message
            .created_at
    }
}
