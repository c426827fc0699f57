//! Post-event ratings.
//!
//! Open once the event is inactive, for the configured window after
//! deactivation, to members who held a confirmed seat. One rating per member.

use super::{DeskAction, DeskEnvironment, DeskReducer, write};
use crate::error::EngineError;
use eventdesk_core::ledger::{EventLedger, LedgerOp};
use eventdesk_core::reducer::Effects;
use eventdesk_core::types::{Rating, RatingOutcome, RatingRejection, Score, UserId};

impl DeskReducer {
    pub(super) fn rate(
        state: &mut EventLedger,
        user_id: UserId,
        score: Score,
        env: &DeskEnvironment,
        effects: &mut Effects<DeskAction>,
    ) -> Result<RatingOutcome, EngineError> {
        if state.event.active {
            return Ok(RatingOutcome::Rejected(RatingRejection::EventStillActive));
        }
        let now = env.clock.now();
        let window_closed = state
            .event
            .deactivation
            .as_ref()
            .is_none_or(|deactivation| now > deactivation.at + env.rating_window);
        if window_closed {
            return Ok(RatingOutcome::Rejected(RatingRejection::WindowClosed));
        }
        if !state.registration(user_id).is_some_and(|r| r.state.is_confirmed()) {
            return Ok(RatingOutcome::Rejected(RatingRejection::NotAttended));
        }
        if state.ratings.contains_key(&user_id) {
            return Ok(RatingOutcome::Rejected(RatingRejection::AlreadyRated));
        }

        let event_id = state.event.id;
        write(
            state,
            effects,
            LedgerOp::RecordRating(Rating {
                user_id,
                event_id,
                score,
                rated_at: now,
            }),
        )?;
        Ok(RatingOutcome::Recorded(score))
    }
}
