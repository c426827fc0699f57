//! Waitlist promotion.
//!
//! Pops the oldest entry and turns it into a `Reserved` registration. The
//! vacancy check uses the same `pending < remaining` rule as admission, so a
//! promotion never creates more unpaid seats than there are free ones.
//!
//! An event that filled up keeps promoting into seats freed later. An event
//! an operator closed by hand does not: its waitlist waits for reactivation.

use super::{DeskAction, DeskEnvironment, DeskReducer, write};
use crate::error::EngineError;
use eventdesk_core::effect::Effect;
use eventdesk_core::ledger::{EventLedger, LedgerOp};
use eventdesk_core::notifier::Message;
use eventdesk_core::reducer::Effects;
use eventdesk_core::types::{Registration, SeatState, UserId};

impl DeskReducer {
    pub(super) fn promote_next(
        state: &mut EventLedger,
        explicit: bool,
        env: &DeskEnvironment,
        effects: &mut Effects<DeskAction>,
    ) -> Result<Option<UserId>, EngineError> {
        let event_id = state.event.id;
        let Some(user_id) = state.oldest_waiting().map(|entry| entry.user_id) else {
            if explicit {
                return Err(EngineError::InvalidState(format!(
                    "waitlist of event {event_id} is empty"
                )));
            }
            return Ok(None);
        };
        if state.event.is_closed_by_operator() {
            if explicit {
                return Err(EngineError::InvalidState(format!(
                    "event {event_id} was closed by an operator"
                )));
            }
            tracing::debug!(%event_id, "Event closed by operator, promotion skipped");
            return Ok(None);
        }
        if !state.has_vacancy() {
            if explicit {
                return Err(EngineError::InvalidState(format!(
                    "event {event_id} has no free seat to offer"
                )));
            }
            tracing::debug!(%event_id, "No vacancy, promotion skipped");
            return Ok(None);
        }

        write(state, effects, LedgerOp::RemoveWaitlistEntry { user_id })?;
        write(
            state,
            effects,
            LedgerOp::CreateRegistration(Registration {
                user_id,
                event_id,
                created_at: env.clock.now(),
                state: SeatState::Reserved,
            }),
        )?;
        let amount = state.event.cost;
        effects.push(Effect::notify_user(
            user_id,
            Message::PromotedFromWaitlist { event_id, amount },
        ));
        Ok(Some(user_id))
    }
}
