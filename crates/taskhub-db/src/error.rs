use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Malformed input; `field` names the offending request field.
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// The caller may not see or touch the resource. Carries no detail so
    /// the resource's existence is not leaked.
    #[error("Permission denied")]
    PermissionDenied,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("DB lock poisoned: {0}")]
    LockPoisoned(String),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
