//! Fan-out registry for message and connection-status subscribers.
//!
//! The subscriber list is snapshotted at the start of every publish, so a
//! handler that unsubscribes itself (or another handler) mid-publish still
//! leaves that publish's delivery set intact; the change takes effect on the
//! next publish. A panicking handler is isolated — it is logged and the
//! remaining handlers still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use taskwire_proto::message::ServerMessage;

use crate::conn::ConnectionStatus;

/// Shared handler invoked for every validated feed message.
pub type MessageHandler = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

/// Shared handler invoked for every connection state transition.
pub type StatusHandler = Arc<dyn Fn(&ConnectionStatus) + Send + Sync>;

/// Stable identity of a registered subscriber, used for exact removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registry {
    next_id: u64,
    messages: Vec<(SubscriptionId, MessageHandler)>,
    statuses: Vec<(SubscriptionId, StatusHandler)>,
    /// Latest published status, replayed to new status subscribers so late
    /// registration never leaves a consumer without an initial value.
    last_status: ConnectionStatus,
}

/// Subscriber registry with copy-on-publish semantics.
pub struct Dispatcher {
    inner: Mutex<Registry>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates an empty dispatcher; the initial status is `disconnected`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Registry {
                next_id: 0,
                messages: Vec::new(),
                statuses: Vec::new(),
                last_status: ConnectionStatus::default(),
            }),
        }
    }

    /// Registers a message subscriber, returning its removal handle.
    pub fn subscribe_messages<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.messages.push((id, Arc::new(handler)));
        id
    }

    /// Removes a message subscriber. Returns `false` if the id was unknown.
    pub fn unsubscribe_messages(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.messages.len();
        inner.messages.retain(|(sub_id, _)| *sub_id != id);
        inner.messages.len() != before
    }

    /// Registers a status subscriber and immediately invokes it with the
    /// latest published status.
    pub fn subscribe_status<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        let handler: StatusHandler = Arc::new(handler);
        let (id, current) = {
            let mut inner = self.inner.lock();
            let id = SubscriptionId(inner.next_id);
            inner.next_id += 1;
            inner.statuses.push((id, Arc::clone(&handler)));
            (id, inner.last_status.clone())
        };
        invoke_status(&handler, &current);
        id
    }

    /// Removes a status subscriber. Returns `false` if the id was unknown.
    pub fn unsubscribe_status(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.statuses.len();
        inner.statuses.retain(|(sub_id, _)| *sub_id != id);
        inner.statuses.len() != before
    }

    /// Delivers a validated message to every current subscriber, in
    /// registration order.
    pub fn publish_message(&self, msg: &ServerMessage) {
        let handlers: Vec<MessageHandler> = {
            let inner = self.inner.lock();
            inner.messages.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in &handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(msg))).is_err() {
                tracing::warn!(kind = msg.kind(), "message subscriber panicked");
            }
        }
    }

    /// Records the new status and delivers it to every current subscriber,
    /// in registration order.
    pub fn publish_status(&self, status: &ConnectionStatus) {
        let handlers: Vec<StatusHandler> = {
            let mut inner = self.inner.lock();
            inner.last_status = status.clone();
            inner.statuses.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in &handlers {
            invoke_status(handler, status);
        }
    }

    /// The latest published status.
    #[must_use]
    pub fn current_status(&self) -> ConnectionStatus {
        self.inner.lock().last_status.clone()
    }
}

fn invoke_status(handler: &StatusHandler, status: &ConnectionStatus) {
    if catch_unwind(AssertUnwindSafe(|| handler(status))).is_err() {
        tracing::warn!(phase = %status.phase, "status subscriber panicked");
    }
}
