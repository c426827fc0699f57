//! Deactivation and reactivation.
//!
//! An event closes either automatically, when a bounded event's confirmed
//! count reaches capacity, or by operator request. Both publish the final
//! roster to the operator channel. Nothing closes or reopens an event
//! implicitly otherwise.

use super::{DeskAction, DeskEnvironment, DeskReducer, write};
use crate::error::EngineError;
use eventdesk_core::effect::Effect;
use eventdesk_core::ledger::{EventLedger, LedgerOp};
use eventdesk_core::notifier::Message;
use eventdesk_core::reducer::Effects;
use eventdesk_core::types::Deactivation;

impl DeskReducer {
    /// Close a bounded, still-active event whose seats are all confirmed.
    pub(super) fn deactivate_if_filled(
        state: &mut EventLedger,
        env: &DeskEnvironment,
        effects: &mut Effects<DeskAction>,
    ) -> Result<(), EngineError> {
        if state.event.active && state.event.capacity.is_filled_by(state.event.confirmed_count) {
            tracing::info!(event_id = %state.event.id, "Capacity filled, deactivating event");
            Self::close(state, Deactivation::CAPACITY_FILLED.to_string(), env, effects)?;
        }
        Ok(())
    }

    pub(super) fn deactivate(
        state: &mut EventLedger,
        reason: String,
        env: &DeskEnvironment,
        effects: &mut Effects<DeskAction>,
    ) -> Result<(), EngineError> {
        if !state.event.active {
            return Err(EngineError::InvalidState(format!(
                "event {} is already inactive",
                state.event.id
            )));
        }
        Self::close(state, reason, env, effects)
    }

    pub(super) fn reactivate(
        state: &mut EventLedger,
        effects: &mut Effects<DeskAction>,
    ) -> Result<(), EngineError> {
        if state.event.active {
            return Err(EngineError::InvalidState(format!(
                "event {} is already active",
                state.event.id
            )));
        }
        write(state, effects, LedgerOp::ReactivateEvent)
    }

    fn close(
        state: &mut EventLedger,
        reason: String,
        env: &DeskEnvironment,
        effects: &mut Effects<DeskAction>,
    ) -> Result<(), EngineError> {
        write(
            state,
            effects,
            LedgerOp::DeactivateEvent(Deactivation {
                reason: reason.clone(),
                at: env.clock.now(),
            }),
        )?;
        effects.push(Effect::notify_operators(Message::FinalRoster {
            event_id: state.event.id,
            reason,
            attendees: state.roster(),
        }));
        Ok(())
    }
}
