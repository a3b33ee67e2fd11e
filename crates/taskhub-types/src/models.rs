use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storage-level discriminator for the two thread variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadKind {
    /// Bound to exactly one project or one task.
    Context,
    /// Bound to an explicit set of member users.
    Direct,
}

impl ThreadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Direct => "direct",
        }
    }
}

impl FromStr for ThreadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "context" => Ok(Self::Context),
            "direct" => Ok(Self::Direct),
            other => Err(format!("unknown thread kind '{}'", other)),
        }
    }
}

/// What a thread is displayed as: the project or task it hangs off,
/// or a direct conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Project,
    Task,
    Direct,
}

/// The object a context thread is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextTarget {
    Project(Uuid),
    Task(Uuid),
}

impl ContextTarget {
    /// Build a target from the two optional references a client sends.
    /// Returns `None` unless exactly one of them is set.
    pub fn from_parts(project_id: Option<Uuid>, task_id: Option<Uuid>) -> Option<Self> {
        match (project_id, task_id) {
            (Some(p), None) => Some(Self::Project(p)),
            (None, Some(t)) => Some(Self::Task(t)),
            _ => None,
        }
    }

    pub fn project_id(&self) -> Option<Uuid> {
        match self {
            Self::Project(id) => Some(*id),
            Self::Task(_) => None,
        }
    }

    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            Self::Task(id) => Some(*id),
            Self::Project(_) => None,
        }
    }
}

/// Minimal public view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Uuid,
    pub username: String,
}

/// Whether holding access to a project implies access to its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAccessPolicy {
    /// Task access = task owner, task grant, or any access to the task's project.
    #[default]
    InheritFromProject,
    /// Task access = task owner or task grant only.
    Independent,
}

impl FromStr for TaskAccessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inherit" | "inherit_from_project" => Ok(Self::InheritFromProject),
            "independent" => Ok(Self::Independent),
            other => Err(format!("unknown task access policy '{}'", other)),
        }
    }
}

impl fmt::Display for TaskAccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InheritFromProject => f.write_str("inherit"),
            Self::Independent => f.write_str("independent"),
        }
    }
}
