//! Task model and field validation for Taskwire.
//!
//! A [`Task`] is an immutable value snapshot received from the server —
//! clients never edit individual fields, they replace whole entries. Field
//! bounds here are the single source of truth for both the client-side
//! message validator and the server-side request validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum allowed task title length in characters.
pub const MAX_TITLE_LENGTH: usize = 100;

/// Maximum allowed task description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// Maximum allowed assignee name length in characters.
pub const MAX_ASSIGNEE_LENGTH: usize = 100;

/// Status of a task on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is open and unclaimed.
    Todo,
    /// Task has been claimed and is being worked on.
    InProgress,
    /// Task has been completed.
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "todo"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A task as carried on the wire and held in the client's collection.
///
/// `id` is an opaque stable string minted by the server. Timestamps are
/// RFC 3339 in transit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque stable identifier.
    pub id: String,
    /// Task title (non-empty, bounded).
    pub title: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional assignee name.
    #[serde(default)]
    pub assignee: Option<String>,
    /// Current status.
    pub status: TaskStatus,
    /// When the task was created (server clock).
    pub created_at: DateTime<Utc>,
    /// When the task was last mutated, if ever.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A single task field failing validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskFieldError {
    /// Task id must be a non-empty string.
    #[error("task id cannot be empty")]
    EmptyId,
    /// Task title must be non-empty.
    #[error("task title cannot be empty")]
    EmptyTitle,
    /// Task title exceeds [`MAX_TITLE_LENGTH`].
    #[error("task title too long (max {MAX_TITLE_LENGTH} characters)")]
    TitleTooLong,
    /// Description exceeds [`MAX_DESCRIPTION_LENGTH`].
    #[error("task description too long (max {MAX_DESCRIPTION_LENGTH} characters)")]
    DescriptionTooLong,
    /// Assignee exceeds [`MAX_ASSIGNEE_LENGTH`].
    #[error("assignee name too long (max {MAX_ASSIGNEE_LENGTH} characters)")]
    AssigneeTooLong,
    /// Assignee contains characters outside the allowed set.
    #[error("assignee name contains invalid characters")]
    AssigneeInvalidChars,
}

/// Returns `true` if every character is allowed in an assignee name:
/// letters, digits, whitespace, `.`, `-`, `'`.
#[must_use]
pub fn is_valid_assignee(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '.' | '-' | '\''))
}

/// Validates the shared title/description/assignee bounds.
fn validate_fields(
    title: &str,
    description: Option<&str>,
    assignee: Option<&str>,
) -> Result<(), TaskFieldError> {
    if title.is_empty() {
        return Err(TaskFieldError::EmptyTitle);
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(TaskFieldError::TitleTooLong);
    }
    if let Some(desc) = description
        && desc.chars().count() > MAX_DESCRIPTION_LENGTH
    {
        return Err(TaskFieldError::DescriptionTooLong);
    }
    if let Some(name) = assignee {
        if name.chars().count() > MAX_ASSIGNEE_LENGTH {
            return Err(TaskFieldError::AssigneeTooLong);
        }
        if !is_valid_assignee(name) {
            return Err(TaskFieldError::AssigneeInvalidChars);
        }
    }
    Ok(())
}

impl Task {
    /// Checks that every field satisfies the wire-level bounds.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaskFieldError`] encountered.
    pub fn validate(&self) -> Result<(), TaskFieldError> {
        if self.id.is_empty() {
            return Err(TaskFieldError::EmptyId);
        }
        validate_fields(
            &self.title,
            self.description.as_deref(),
            self.assignee.as_deref(),
        )
    }
}

/// Request payload for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    /// Title of the new task.
    pub title: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional initial assignee.
    #[serde(default)]
    pub assignee: Option<String>,
}

impl NewTask {
    /// Validates the payload against the task field bounds.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaskFieldError`] encountered.
    pub fn validate(&self) -> Result<(), TaskFieldError> {
        validate_fields(
            &self.title,
            self.description.as_deref(),
            self.assignee.as_deref(),
        )
    }

    /// Returns a copy with surrounding whitespace trimmed and empty optional
    /// fields collapsed to `None`.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let trim_opt = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        };
        Self {
            title: self.title.trim().to_string(),
            description: trim_opt(&self.description),
            assignee: trim_opt(&self.assignee),
        }
    }
}

/// Request payload for claiming (assigning) a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTask {
    /// Who is taking the task.
    pub assignee: String,
}

impl ClaimTask {
    /// Validates the assignee against the task field bounds.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskFieldError`] if the assignee is empty, too long, or
    /// contains disallowed characters.
    pub fn validate(&self) -> Result<(), TaskFieldError> {
        let name = self.assignee.trim();
        if name.is_empty() {
            return Err(TaskFieldError::AssigneeInvalidChars);
        }
        if name.chars().count() > MAX_ASSIGNEE_LENGTH {
            return Err(TaskFieldError::AssigneeTooLong);
        }
        if !is_valid_assignee(name) {
            return Err(TaskFieldError::AssigneeInvalidChars);
        }
        Ok(())
    }
}
