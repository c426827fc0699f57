//! Capacity admission.
//!
//! Decides whether a request becomes a confirmed free seat, a paid
//! reservation, a waitlist entry, or a refusal. Pending reservations count
//! against capacity, so a paid event never holds more unpaid seats than it has
//! free ones.

use super::{DeskAction, DeskEnvironment, DeskReducer, write};
use crate::error::EngineError;
use eventdesk_core::effect::Effect;
use eventdesk_core::ledger::{EventLedger, LedgerOp};
use eventdesk_core::notifier::Message;
use eventdesk_core::reducer::Effects;
use eventdesk_core::types::{
    Admission, Registration, RejectReason, SeatState, UserId, WaitlistEntry,
};

impl DeskReducer {
    pub(super) fn admit(
        state: &mut EventLedger,
        user_id: UserId,
        env: &DeskEnvironment,
        effects: &mut Effects<DeskAction>,
    ) -> Result<Admission, EngineError> {
        if !state.event.active {
            return Ok(Admission::Rejected(RejectReason::EventUnavailable));
        }
        if state.registration(user_id).is_some() || state.is_waiting(user_id) {
            return Ok(Admission::Rejected(RejectReason::AlreadyRegistered));
        }

        let now = env.clock.now();
        let event_id = state.event.id;

        if !state.event.is_paid() {
            if state.event.capacity.is_filled_by(state.event.confirmed_count) {
                return Ok(Admission::Rejected(RejectReason::Full));
            }
            write(
                state,
                effects,
                LedgerOp::CreateRegistration(Registration {
                    user_id,
                    event_id,
                    created_at: now,
                    state: SeatState::Confirmed,
                }),
            )?;
            write(state, effects, LedgerOp::IncrementConfirmed)?;
            let order = state.registration_count();
            effects.push(Effect::notify_user(
                user_id,
                Message::RegistrationAccepted { event_id, order },
            ));
            Self::deactivate_if_filled(state, env, effects)?;
            return Ok(Admission::Accepted { order });
        }

        if state.has_vacancy() {
            write(
                state,
                effects,
                LedgerOp::CreateRegistration(Registration {
                    user_id,
                    event_id,
                    created_at: now,
                    state: SeatState::Reserved,
                }),
            )?;
            let amount = state.event.cost;
            let order = state.registration_count();
            effects.push(Effect::notify_user(
                user_id,
                Message::PaymentRequested {
                    event_id,
                    amount,
                    order,
                },
            ));
            return Ok(Admission::ReservedPendingPayment { amount, order });
        }

        if state.waitlist_len() >= env.waitlist_limit {
            return Ok(Admission::Rejected(RejectReason::CapacityAndWaitlistFull));
        }

        write(
            state,
            effects,
            LedgerOp::AddWaitlistEntry(WaitlistEntry {
                user_id,
                event_id,
                added_at: now,
            }),
        )?;
        let position = state.waitlist_len();
        effects.push(Effect::notify_user(
            user_id,
            Message::Waitlisted { event_id, position },
        ));
        Ok(Admission::Waitlisted { position })
    }
}
