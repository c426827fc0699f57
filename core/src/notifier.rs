//! Outbound messages and the collaborators that deliver them.
//!
//! The engine decides *what* to tell users and operators; rendering,
//! localization and transport belong to the [`Notifier`] implementation.
//! Delivery is advisory: the ledger is the source of truth, and a failed
//! notification never undoes a committed seat change.

use crate::types::{DecisionToken, EventId, Money, PaymentDecision, Receipt, UserId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`Notifier`] methods.
pub type NotifyFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, NotifyError>> + Send + 'a>>;

/// Boxed future returned by [`OperatorDirectory`] methods.
pub type DirectoryFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Message delivery failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The recipient cannot be reached (blocked the bot, deleted account)
    #[error("Recipient unreachable: {0}")]
    Unreachable(String),

    /// Transport failure that may succeed on retry
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Handle to a delivered operator-channel message
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef(pub String);

/// Typed content of an outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Free seat confirmed
    RegistrationAccepted {
        /// Event
        event_id: EventId,
        /// Display order number
        order: u32,
    },
    /// Paid seat held; pay and send a receipt
    PaymentRequested {
        /// Event
        event_id: EventId,
        /// Amount due
        amount: Money,
        /// Display order number
        order: u32,
    },
    /// Joined the waitlist
    Waitlisted {
        /// Event
        event_id: EventId,
        /// 1-based queue position
        position: u32,
    },
    /// A seat freed up and is now reserved for the user
    PromotedFromWaitlist {
        /// Event
        event_id: EventId,
        /// Amount due
        amount: Money,
    },
    /// Receipt received and forwarded for review
    ReceiptUnderReview {
        /// Event
        event_id: EventId,
    },
    /// Operator verified the payment
    PaymentConfirmed {
        /// Event
        event_id: EventId,
    },
    /// Operator could not verify the receipt; reservation released
    PaymentUnclear {
        /// Event
        event_id: EventId,
    },
    /// Operator cancelled the reservation
    ReservationCancelled {
        /// Event
        event_id: EventId,
    },
    /// User cancelled their own seat or waitlist entry
    CancellationConfirmed {
        /// Event
        event_id: EventId,
    },
    /// Operator channel: a receipt waiting for a decision
    ReceiptForReview {
        /// Event
        event_id: EventId,
        /// Payer
        user_id: UserId,
        /// Amount due
        amount: Money,
        /// The receipt to inspect
        receipt: Receipt,
    },
    /// Operator channel: final list of confirmed attendees
    FinalRoster {
        /// Event
        event_id: EventId,
        /// Why registration closed
        reason: String,
        /// Confirmed registrants in registration order
        attendees: Vec<UserId>,
    },
}

/// A button offered to operators next to a receipt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OperatorAction {
    /// Verdict the button submits
    pub decision: PaymentDecision,
    /// Reservation the verdict applies to
    pub token: DecisionToken,
}

impl OperatorAction {
    /// The full confirm / unclear / cancel button set for one token
    #[must_use]
    pub fn review_set(token: DecisionToken) -> Vec<Self> {
        PaymentDecision::ALL
            .into_iter()
            .map(|decision| Self { decision, token })
            .collect()
    }
}

/// Message delivery to users and the operator channel.
///
/// # Dyn Compatibility
///
/// Returns boxed futures so the engine can share an `Arc<dyn Notifier>`.
pub trait Notifier: Send + Sync {
    /// Send a direct message to a user.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if delivery fails.
    fn notify_user(&self, user_id: UserId, message: Message) -> NotifyFuture<'_, ()>;

    /// Post to the operator channel.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if delivery fails.
    fn notify_operator_channel(&self, message: Message) -> NotifyFuture<'_, ()>;

    /// Post to the operator channel with decision buttons.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if delivery fails.
    fn notify_operator_channel_with_actions(
        &self,
        message: Message,
        actions: Vec<OperatorAction>,
    ) -> NotifyFuture<'_, MessageRef>;
}

/// Admin directory: who may resolve payments and manage events.
pub trait OperatorDirectory: Send + Sync {
    /// Whether `user_id` is an operator
    fn is_operator(&self, user_id: UserId) -> DirectoryFuture<'_>;
}
