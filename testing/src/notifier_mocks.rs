//! Notifier and operator-directory doubles.
//!
//! - [`RecordingNotifier`]: captures every delivered message, optionally
//!   failing deliveries to exercise best-effort semantics
//! - [`StaticOperators`]: fixed set of operator ids

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use eventdesk_core::notifier::{
    DirectoryFuture, Message, MessageRef, Notifier, NotifyError, NotifyFuture, OperatorAction,
    OperatorDirectory,
};
use eventdesk_core::types::UserId;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Where a recorded message went
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// Direct message
    User(UserId),
    /// Operator channel
    Operators,
}

/// One delivered message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Destination
    pub to: Recipient,
    /// Content
    pub message: Message,
    /// Buttons attached (operator channel only)
    pub actions: Vec<OperatorAction>,
}

/// Notifier that records deliveries instead of sending them.
///
/// `fail_next(n)` makes the next `n` delivery attempts fail with a transport
/// error; `fail_always()` makes every attempt fail.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    failures_left: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl RecordingNotifier {
    /// Create a notifier that delivers everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` delivery attempts
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Fail every delivery attempt from now on
    pub fn fail_always(&self) {
        self.fail_next(usize::MAX);
    }

    /// All successful deliveries so far
    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Messages delivered to one user
    #[must_use]
    pub fn messages_for(&self, user_id: UserId) -> Vec<Message> {
        self.deliveries()
            .into_iter()
            .filter(|d| d.to == Recipient::User(user_id))
            .map(|d| d.message)
            .collect()
    }

    /// Deliveries to the operator channel
    #[must_use]
    pub fn operator_posts(&self) -> Vec<Delivery> {
        self.deliveries()
            .into_iter()
            .filter(|d| d.to == Recipient::Operators)
            .collect()
    }

    /// Delivery attempts, including failed ones
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn record(&self, delivery: Delivery) -> Result<usize, NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if failing {
            return Err(NotifyError::Transport("simulated outage".to_string()));
        }
        let mut deliveries = self.deliveries.lock().unwrap();
        deliveries.push(delivery);
        Ok(deliveries.len())
    }
}

impl Notifier for RecordingNotifier {
    fn notify_user(&self, user_id: UserId, message: Message) -> NotifyFuture<'_, ()> {
        Box::pin(async move {
            self.record(Delivery {
                to: Recipient::User(user_id),
                message,
                actions: Vec::new(),
            })
            .map(|_| ())
        })
    }

    fn notify_operator_channel(&self, message: Message) -> NotifyFuture<'_, ()> {
        Box::pin(async move {
            self.record(Delivery {
                to: Recipient::Operators,
                message,
                actions: Vec::new(),
            })
            .map(|_| ())
        })
    }

    fn notify_operator_channel_with_actions(
        &self,
        message: Message,
        actions: Vec<OperatorAction>,
    ) -> NotifyFuture<'_, MessageRef> {
        Box::pin(async move {
            self.record(Delivery {
                to: Recipient::Operators,
                message,
                actions,
            })
            .map(|n| MessageRef(format!("operator-msg-{n}")))
        })
    }
}

/// Operator directory backed by a fixed id set
#[derive(Clone, Debug, Default)]
pub struct StaticOperators {
    ids: HashSet<UserId>,
}

impl StaticOperators {
    /// Directory containing exactly `ids`
    #[must_use]
    pub fn new(ids: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }
}

impl OperatorDirectory for StaticOperators {
    fn is_operator(&self, user_id: UserId) -> DirectoryFuture<'_> {
        let known = self.ids.contains(&user_id);
        Box::pin(async move { known })
    }
}
