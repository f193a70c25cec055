//! Inbound server messages and the frame validator.
//!
//! The server pushes one JSON object per UTF-8 text frame. [`parse`] turns a
//! raw frame into a member of the closed [`ServerMessage`] set or a
//! [`Rejection`] explaining why it is not one. Nothing downstream of the
//! validator ever sees an unknown or malformed message.

use serde::{Deserialize, Serialize};

use crate::task::Task;

/// A validated message pushed by the server over the task feed.
///
/// The wire representation is internally tagged:
/// `{"type":"snapshot","tasks":[...]}`,
/// `{"type":"task_created","task":{...}}`,
/// `{"type":"task_updated","task":{...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Complete authoritative task collection, sent on every (re)connect.
    Snapshot {
        /// All tasks, in server order.
        tasks: Vec<Task>,
    },
    /// A task was created.
    TaskCreated {
        /// The new task.
        task: Task,
    },
    /// A task was mutated.
    TaskUpdated {
        /// The full replacement snapshot of the task.
        task: Task,
    },
}

impl ServerMessage {
    /// The wire tag of this message kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::TaskCreated { .. } => "task_created",
            Self::TaskUpdated { .. } => "task_updated",
        }
    }
}

/// Why an inbound frame was dropped by the validator.
///
/// Rejections are reported to the log, never raised to subscribers — a bad
/// frame must not affect connection state or the task collection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The frame is not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// The frame has no `type` field.
    #[error("frame missing \"type\" field")]
    MissingType,
    /// The `type` is not one of the known kinds. Unknown types are dropped,
    /// not fatal, so protocol additions cannot crash old clients.
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    /// The payload does not match the shape declared by `type`.
    #[error("bad payload for {kind:?}: {reason}")]
    BadPayload {
        /// The declared message kind.
        kind: String,
        /// What was wrong with the payload.
        reason: String,
    },
}

/// Error wrapping a failed message serialization.
#[derive(Debug, thiserror::Error)]
#[error("message encode error: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Encodes a [`ServerMessage`] as a single-frame JSON string.
///
/// # Errors
///
/// Returns [`EncodeError`] if serialization fails.
pub fn encode(msg: &ServerMessage) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(msg)?)
}

/// Parses and validates a raw inbound frame.
///
/// Checks are staged so each failure mode is distinguishable: JSON parse,
/// `type` presence, `type` recognition, then payload shape including
/// per-field task bounds.
///
/// # Errors
///
/// Returns a [`Rejection`] describing the first failed stage.
pub fn parse(raw: &str) -> Result<ServerMessage, Rejection> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| Rejection::Malformed(e.to_string()))?;

    let Some(kind_value) = value.get("type") else {
        return Err(Rejection::MissingType);
    };
    let Some(kind) = kind_value.as_str() else {
        return Err(Rejection::UnknownType(kind_value.to_string()));
    };

    let msg = match kind {
        "snapshot" => {
            let tasks = value
                .get("tasks")
                .ok_or_else(|| bad_payload(kind, "missing \"tasks\" field"))?;
            let tasks: Vec<Task> = serde_json::from_value(tasks.clone())
                .map_err(|e| bad_payload(kind, &e.to_string()))?;
            ServerMessage::Snapshot { tasks }
        }
        "task_created" | "task_updated" => {
            let task = value
                .get("task")
                .ok_or_else(|| bad_payload(kind, "missing \"task\" field"))?;
            let task: Task = serde_json::from_value(task.clone())
                .map_err(|e| bad_payload(kind, &e.to_string()))?;
            if kind == "task_created" {
                ServerMessage::TaskCreated { task }
            } else {
                ServerMessage::TaskUpdated { task }
            }
        }
        other => return Err(Rejection::UnknownType(other.to_string())),
    };

    validate_payload(&msg)?;
    Ok(msg)
}

/// Runs task field validation over every task the message carries.
fn validate_payload(msg: &ServerMessage) -> Result<(), Rejection> {
    let tasks: &[Task] = match msg {
        ServerMessage::Snapshot { tasks } => tasks,
        ServerMessage::TaskCreated { task } | ServerMessage::TaskUpdated { task } => {
            std::slice::from_ref(task)
        }
    };
    for task in tasks {
        task.validate()
            .map_err(|e| bad_payload(msg.kind(), &e.to_string()))?;
    }
    Ok(())
}

fn bad_payload(kind: &str, reason: &str) -> Rejection {
    Rejection::BadPayload {
        kind: kind.to_string(),
        reason: reason.to_string(),
    }
}
