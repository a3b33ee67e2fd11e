//! @mention resolution.
//!
//! Usernames are kept in an in-memory index keyed by their lower-cased form.
//! A message is tokenized once and every `@name` token is looked up, so the
//! cost is proportional to the message, not to the number of users.

use std::collections::HashMap;

use rusqlite::Connection;
use uuid::Uuid;

use crate::DbResult;
use crate::models::uuid_at;

#[derive(Debug, Default, Clone)]
pub struct MentionIndex {
    by_name: HashMap<String, Uuid>,
}

impl MentionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = (S, Uuid)>,
        S: AsRef<str>,
    {
        let mut index = Self::new();
        for (name, id) in users {
            index.insert(name.as_ref(), id);
        }
        index
    }

    pub(crate) fn load(conn: &Connection) -> DbResult<Self> {
        let mut stmt = conn.prepare("SELECT username, id FROM users")?;
        let users = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, uuid_at(row, 1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_users(users))
    }

    pub fn insert(&mut self, username: &str, id: Uuid) {
        self.by_name.insert(username_key(username), id);
    }

    pub fn remove(&mut self, username: &str) -> Option<Uuid> {
        self.by_name.remove(&username_key(username))
    }

    /// Users mentioned in `text`, deduplicated, in order of first mention.
    /// Unknown names are ignored.
    pub fn resolve(&self, text: &str) -> Vec<Uuid> {
        let mut found = Vec::new();
        for token in mention_tokens(text) {
            if let Some(id) = self.by_name.get(&username_key(token)) {
                if !found.contains(id) {
                    found.push(*id);
                }
            }
        }
        found
    }
}

/// Case-folded form of a username. Unique per user, and the key mentions
/// are resolved by.
pub(crate) fn username_key(username: &str) -> String {
    username.trim().to_lowercase()
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Every `@name` token in `text`, without the `@`. An `@` preceded by a
/// name character (as in `a@b.com`) does not start a mention. Trailing
/// `.` and `-` are treated as punctuation.
pub fn mention_tokens(text: &str) -> impl Iterator<Item = &str> {
    let mut prev: Option<char> = None;
    let mut starts = Vec::new();
    for (i, c) in text.char_indices() {
        if c == '@' && !prev.is_some_and(is_name_char) {
            starts.push(i + 1);
        }
        prev = Some(c);
    }

    starts.into_iter().filter_map(move |start| {
        let rest = &text[start..];
        let end = rest
            .char_indices()
            .find(|&(_, c)| !is_name_char(c))
            .map_or(rest.len(), |(i, _)| i);
        let token = rest[..end].trim_end_matches(['.', '-']);
        (!token.is_empty()).then_some(token)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_skip_emails_and_trailing_punctuation() {
        let tokens: Vec<&str> =
            mention_tokens("hi @alice, ping @bob. mail me at carol@example.com @ @dave-").collect();
        assert_eq!(tokens, vec!["alice", "bob", "dave"]);
    }

    #[test]
    fn tokens_allow_dotted_names() {
        let tokens: Vec<&str> = mention_tokens("(@jane.doe) and @x_y").collect();
        assert_eq!(tokens, vec!["jane.doe", "x_y"]);
    }

    #[test]
    fn resolve_is_case_insensitive_and_deduplicated() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let index = MentionIndex::from_users([("Alice", alice), ("bob", bob)]);

        let ids = index.resolve("@ALICE meet @bob; @alice again, @nobody");
        assert_eq!(ids, vec![alice, bob]);
    }

    #[test]
    fn removed_users_are_not_resolved() {
        let alice = Uuid::new_v4();
        let mut index = MentionIndex::from_users([("alice", alice)]);
        assert_eq!(index.remove("Alice"), Some(alice));
        assert!(index.resolve("@alice").is_empty());
    }
}
