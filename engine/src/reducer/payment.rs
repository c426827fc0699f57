//! Payment reservation lifecycle.
//!
//! ```text
//! Reserved --submit receipt--> AwaitingReview --confirm--> Confirmed
//!    |                              |
//!    +--user cancel--+   +--unclear / cancel / user cancel
//!                    v   v
//!                  Released (registration deleted, waitlist promoted)
//! ```
//!
//! A reservation only leaves the ledger through an explicit operator verdict
//! or user cancellation. Every path that frees a seat dispatches
//! [`DeskAction::PromoteNext`] so the seat goes to the oldest waiting user in
//! the same commit.

use super::{DeskAction, DeskEnvironment, DeskReducer, write};
use crate::error::EngineError;
use eventdesk_core::effect::{Effect, Notification};
use eventdesk_core::ledger::{EventLedger, LedgerOp};
use eventdesk_core::notifier::{Message, OperatorAction};
use eventdesk_core::reducer::Effects;
use eventdesk_core::types::{
    Cancellation, DecisionToken, Payment, PaymentDecision, Receipt, RejectReason, SeatState, UserId,
};

impl DeskReducer {
    pub(super) fn submit_receipt(
        state: &mut EventLedger,
        user_id: UserId,
        receipt: Receipt,
        token: DecisionToken,
        env: &DeskEnvironment,
        effects: &mut Effects<DeskAction>,
    ) -> Result<(), EngineError> {
        let event_id = state.event.id;
        let registration = state.registration(user_id).ok_or_else(|| {
            EngineError::NotFound(format!("no registration for user {user_id} at event {event_id}"))
        })?;
        if registration.state != SeatState::Reserved {
            return Err(EngineError::InvalidState(format!(
                "registration of user {user_id} is not awaiting a receipt"
            )));
        }

        write(
            state,
            effects,
            LedgerOp::SetSeatState {
                user_id,
                state: SeatState::AwaitingReview {
                    token,
                    receipt: receipt.clone(),
                    submitted_at: env.clock.now(),
                },
            },
        )?;
        effects.push(Effect::notify_user(user_id, Message::ReceiptUnderReview { event_id }));
        effects.push(Effect::Notify(Notification::OperatorsWithActions {
            message: Message::ReceiptForReview {
                event_id,
                user_id,
                amount: state.event.cost,
                receipt,
            },
            actions: OperatorAction::review_set(token),
        }));
        Ok(())
    }

    pub(super) fn resolve_payment(
        state: &mut EventLedger,
        operator: UserId,
        user_id: UserId,
        decision: PaymentDecision,
        token: Option<DecisionToken>,
        env: &DeskEnvironment,
        effects: &mut Effects<DeskAction>,
    ) -> Result<(), EngineError> {
        let event_id = state.event.id;
        let registration = state.registration(user_id).ok_or_else(|| {
            EngineError::NotFound(format!("no reservation for user {user_id} at event {event_id}"))
        })?;
        let under_review = match (&registration.state, token) {
            (SeatState::AwaitingReview { token: current, .. }, Some(expected)) => {
                *current == expected
            }
            (SeatState::AwaitingReview { .. }, None) => true,
            _ => false,
        };
        if !under_review {
            return Err(EngineError::InvalidState(format!(
                "reservation of user {user_id} is not awaiting review"
            )));
        }

        match decision {
            PaymentDecision::Confirm => {
                if state.event.capacity.is_filled_by(state.event.confirmed_count) {
                    return Err(EngineError::InvalidState(format!(
                        "event {event_id} has no seat left to confirm"
                    )));
                }
                let now = env.clock.now();
                let amount = state.event.cost;
                write(
                    state,
                    effects,
                    LedgerOp::CreatePayment(Payment {
                        user_id,
                        event_id,
                        amount,
                        confirmed_at: now,
                        confirmed_by: operator,
                    }),
                )?;
                write(
                    state,
                    effects,
                    LedgerOp::SetSeatState {
                        user_id,
                        state: SeatState::Confirmed,
                    },
                )?;
                write(state, effects, LedgerOp::IncrementConfirmed)?;
                effects.push(Effect::notify_user(user_id, Message::PaymentConfirmed { event_id }));
                Self::deactivate_if_filled(state, env, effects)?;
            }
            PaymentDecision::Unclear | PaymentDecision::Cancel => {
                Self::release(state, user_id, effects)?;
                let message = if decision == PaymentDecision::Unclear {
                    Message::PaymentUnclear { event_id }
                } else {
                    Message::ReservationCancelled { event_id }
                };
                effects.push(Effect::notify_user(user_id, message));
            }
        }
        Ok(())
    }

    pub(super) fn cancel(
        state: &mut EventLedger,
        user_id: UserId,
        env: &DeskEnvironment,
        effects: &mut Effects<DeskAction>,
    ) -> Result<Cancellation, EngineError> {
        let event_id = state.event.id;
        let Some(registration) = state.registration(user_id) else {
            if !state.is_waiting(user_id) {
                return Ok(Cancellation::Rejected(RejectReason::NotRegistered));
            }
            write(state, effects, LedgerOp::RemoveWaitlistEntry { user_id })?;
            effects.push(Effect::notify_user(user_id, Message::CancellationConfirmed { event_id }));
            return Ok(Cancellation::LeftWaitlist);
        };

        let outcome = if registration.state.is_pending() {
            Self::release(state, user_id, effects)?;
            Cancellation::ReservationReleased
        } else {
            if state.event.has_started(env.clock.now()) {
                return Ok(Cancellation::Rejected(RejectReason::EventStarted));
            }
            write(state, effects, LedgerOp::DeleteRegistration { user_id })?;
            if state.payments.contains_key(&user_id) {
                write(state, effects, LedgerOp::DeletePayment { user_id })?;
            }
            write(state, effects, LedgerOp::DecrementConfirmed)?;
            effects.push(Effect::Dispatch(DeskAction::PromoteNext { explicit: false }));
            Cancellation::SeatReleased
        };
        effects.push(Effect::notify_user(user_id, Message::CancellationConfirmed { event_id }));
        Ok(outcome)
    }

    /// Drop an unpaid reservation (and any stray waitlist entry) and hand the
    /// seat on.
    fn release(
        state: &mut EventLedger,
        user_id: UserId,
        effects: &mut Effects<DeskAction>,
    ) -> Result<(), EngineError> {
        write(state, effects, LedgerOp::DeleteRegistration { user_id })?;
        if state.is_waiting(user_id) {
            write(state, effects, LedgerOp::RemoveWaitlistEntry { user_id })?;
        }
        effects.push(Effect::Dispatch(DeskAction::PromoteNext { explicit: false }));
        Ok(())
    }
}
