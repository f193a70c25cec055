//! In-memory task store.
//!
//! Holds the authoritative board state behind an async [`RwLock`]: an
//! ordered id list (newest first) next to the id → task map. Every mutation
//! returns the resulting task snapshot so callers can broadcast it.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use taskwire_proto::task::{NewTask, Task, TaskStatus};

struct Inner {
    /// Task ids, newest first.
    order: Vec<String>,
    tasks: HashMap<String, Task>,
}

/// Thread-safe in-memory task store.
pub struct TaskStore {
    inner: RwLock<Inner>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                order: Vec::new(),
                tasks: HashMap::new(),
            }),
        }
    }

    /// Creates a task from an already-validated payload.
    ///
    /// Mints a time-ordered UUID v7 id, stamps `created_at`, and places the
    /// task at the front of the board.
    pub async fn create(&self, new: &NewTask) -> Task {
        let task = Task {
            id: Uuid::now_v7().to_string(),
            title: new.title.clone(),
            description: new.description.clone(),
            assignee: new.assignee.clone(),
            status: TaskStatus::Todo,
            created_at: Utc::now(),
            updated_at: None,
        };

        let mut inner = self.inner.write().await;
        inner.order.insert(0, task.id.clone());
        inner.tasks.insert(task.id.clone(), task.clone());
        task
    }

    /// Claims a task: sets the assignee, moves it to `in_progress`, and
    /// stamps `updated_at`. Returns `None` for an unknown id.
    pub async fn claim(&self, id: &str, assignee: &str) -> Option<Task> {
        let mut inner = self.inner.write().await;
        let task = inner.tasks.get_mut(id)?;
        task.assignee = Some(assignee.to_string());
        task.status = TaskStatus::InProgress;
        task.updated_at = Some(Utc::now());
        Some(task.clone())
    }

    /// Looks up a single task.
    pub async fn get(&self, id: &str) -> Option<Task> {
        self.inner.read().await.tasks.get(id).cloned()
    }

    /// All tasks in board order (newest first).
    pub async fn all(&self) -> Vec<Task> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .cloned()
            .collect()
    }

    /// Case-insensitive title substring search, in board order.
    ///
    /// A blank query matches nothing (never an error).
    pub async fn search_by_title(&self, query: &str) -> Vec<Task> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|task| task.title.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Number of tasks in the store.
    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.order.is_empty()
    }
}
