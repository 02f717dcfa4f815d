use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

/// Toast sink shared by the session parts. The host drains it.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    queue: Rc<RefCell<Vec<Notification>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, kind: NotificationKind, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(?kind, message = message.as_str(), "notification");
        self.queue.borrow_mut().push(Notification { kind, message });
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(NotificationKind::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(NotificationKind::Error, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(NotificationKind::Info, message);
    }

    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }

    pub fn last(&self) -> Option<Notification> {
        self.queue.borrow().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}
