//! Task board reconciliation.
//!
//! [`TaskBoard`] folds validated server messages into an ordered id → task
//! collection: snapshots replace the whole board, creations prepend, updates
//! replace in place. The board is the client's authoritative view — a
//! complete snapshot plus every delta applied in arrival order.

use std::collections::HashMap;

use taskwire_proto::message::ServerMessage;
use taskwire_proto::task::Task;

/// Ordered task collection, at most one entry per id.
///
/// Order is explicit (`order` holds ids front-to-back) because prepend order
/// of newly created tasks is observable to consumers. `tasks` holds the
/// values. The two structures are kept consistent by construction — every
/// mutation goes through [`TaskBoard::apply`].
#[derive(Debug, Default, Clone)]
pub struct TaskBoard {
    order: Vec<String>,
    tasks: HashMap<String, Task>,
}

impl TaskBoard {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a validated message into the board.
    ///
    /// Applies last-arrived-wins: the protocol carries no sequence numbers,
    /// so a stale update can overwrite a newer one until the next snapshot.
    pub fn apply(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::Snapshot { tasks } => self.replace_all(tasks),
            // Duplicate delivery of a creation replaces in place rather than
            // duplicating; an update for an unknown id is kept as a creation.
            ServerMessage::TaskCreated { task } | ServerMessage::TaskUpdated { task } => {
                self.upsert(task);
            }
        }
    }

    /// Replaces the entire collection, preserving server order.
    ///
    /// If the server ever repeats an id within one snapshot, the last
    /// occurrence wins (value) at the first occurrence's position.
    fn replace_all(&mut self, tasks: &[Task]) {
        self.order.clear();
        self.tasks.clear();
        for task in tasks {
            if self.tasks.insert(task.id.clone(), task.clone()).is_none() {
                self.order.push(task.id.clone());
            }
        }
    }

    /// Inserts at the front for an unknown id, replaces in place for a
    /// known one.
    fn upsert(&mut self, task: &Task) {
        if self.tasks.insert(task.id.clone(), task.clone()).is_none() {
            self.order.insert(0, task.id.clone());
        }
    }

    /// Number of tasks on the board.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the board is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// The position of a task in display order, if present.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|entry| entry == id)
    }

    /// All tasks in display order (front first).
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .cloned()
            .collect()
    }
}
