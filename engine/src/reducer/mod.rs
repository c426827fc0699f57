//! The event desk reducer.
//!
//! One reducer owns every rule that touches an event's
//! `(confirmed_count, registrations, waitlist)` triple. It works on an
//! [`EventLedger`] snapshot and is synchronous and pure: the engine loads the
//! snapshot under the event's lock, reduces, and commits the emitted ops.
//!
//! Every op is applied to the snapshot the moment it is emitted, so a
//! follow-up action dispatched by [`Effect::Dispatch`] (waitlist promotion
//! after a release) sees the state the commit will produce.
//!
//! Rules are split by concern:
//!
//! - [`admission`]: the capacity admission decision
//! - [`payment`]: receipt submission, operator verdicts, user cancellation
//! - [`waitlist`]: promotion of the oldest waiting user
//! - [`deactivation`]: automatic and manual deactivation, reactivation
//! - [`rating`]: post-event ratings

use crate::error::EngineError;
use eventdesk_core::effect::Effect;
use eventdesk_core::environment::Clock;
use eventdesk_core::ledger::{EventLedger, LedgerOp};
use eventdesk_core::reducer::{Effects, Reducer, Reduction};
use eventdesk_core::types::{
    Admission, Cancellation, DecisionToken, PaymentDecision, RatingOutcome, Receipt, Score, UserId,
};
use std::sync::Arc;

pub mod admission;
pub mod deactivation;
pub mod payment;
pub mod rating;
pub mod waitlist;

/// Requests the desk reducer understands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeskAction {
    /// A member asks for a seat
    RequestAdmission {
        /// Requesting member
        user_id: UserId,
    },
    /// A member hands in a payment receipt for their reservation
    SubmitReceipt {
        /// Reservation holder
        user_id: UserId,
        /// Uploaded receipt reference
        receipt: Receipt,
        /// Fresh token to bind to the operator's buttons
        token: DecisionToken,
    },
    /// An operator rules on a receipt
    ResolvePayment {
        /// Operator (already checked against the directory)
        operator: UserId,
        /// Reservation holder
        user_id: UserId,
        /// Verdict
        decision: PaymentDecision,
        /// Token from the button, when the verdict came from one
        token: Option<DecisionToken>,
    },
    /// A member gives back their seat or waitlist entry
    CancelRegistration {
        /// Member
        user_id: UserId,
    },
    /// Offer a free seat to the oldest waiting user
    PromoteNext {
        /// Public request: an empty waitlist or a missing vacancy is an error
        /// instead of a no-op
        explicit: bool,
    },
    /// An operator closes registration
    Deactivate {
        /// Reason shown with the roster
        reason: String,
    },
    /// An operator reopens registration
    Reactivate,
    /// A member rates the event
    Rate {
        /// Member
        user_id: UserId,
        /// Validated score
        score: Score,
    },
}

/// What the caller of one action gets back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeskOutput {
    /// Result of [`DeskAction::RequestAdmission`]
    Admission(Admission),
    /// Receipt forwarded; the token identifies the review
    ReceiptSubmitted(DecisionToken),
    /// Operator verdict applied
    PaymentResolved(PaymentDecision),
    /// Result of [`DeskAction::CancelRegistration`]
    Cancellation(Cancellation),
    /// Promoted user, `None` when an internal promotion had nothing to do
    Promoted(Option<UserId>),
    /// Event deactivated
    Deactivated,
    /// Event reactivated
    Reactivated,
    /// Result of [`DeskAction::Rate`]
    Rating(RatingOutcome),
}

/// Injected dependencies and tunables for the desk reducer.
#[derive(Clone)]
pub struct DeskEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Maximum live waitlist entries per event
    pub waitlist_limit: u32,
    /// How long after deactivation ratings are accepted
    pub rating_window: chrono::Duration,
}

impl DeskEnvironment {
    /// Creates a new `DeskEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        waitlist_limit: u32,
        rating_window: chrono::Duration,
    ) -> Self {
        Self {
            clock,
            waitlist_limit,
            rating_window,
        }
    }
}

impl std::fmt::Debug for DeskEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeskEnvironment")
            .field("waitlist_limit", &self.waitlist_limit)
            .field("rating_window", &self.rating_window)
            .finish_non_exhaustive()
    }
}

/// Reducer for one event's ledger.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeskReducer;

/// Apply `op` to the snapshot and record it for commit.
fn write(
    ledger: &mut EventLedger,
    effects: &mut Effects<DeskAction>,
    op: LedgerOp,
) -> Result<(), EngineError> {
    ledger.apply(&op)?;
    effects.push(Effect::Write(op));
    Ok(())
}

impl Reducer for DeskReducer {
    type State = EventLedger;
    type Action = DeskAction;
    type Environment = DeskEnvironment;
    type Output = DeskOutput;
    type Error = EngineError;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<Reduction<Self::Action, Self::Output>, Self::Error> {
        let mut effects = Effects::new();
        let output = match action {
            DeskAction::RequestAdmission { user_id } => {
                DeskOutput::Admission(Self::admit(state, user_id, env, &mut effects)?)
            }
            DeskAction::SubmitReceipt {
                user_id,
                receipt,
                token,
            } => {
                Self::submit_receipt(state, user_id, receipt, token, env, &mut effects)?;
                DeskOutput::ReceiptSubmitted(token)
            }
            DeskAction::ResolvePayment {
                operator,
                user_id,
                decision,
                token,
            } => {
                Self::resolve_payment(
                    state,
                    operator,
                    user_id,
                    decision,
                    token,
                    env,
                    &mut effects,
                )?;
                DeskOutput::PaymentResolved(decision)
            }
            DeskAction::CancelRegistration { user_id } => {
                DeskOutput::Cancellation(Self::cancel(state, user_id, env, &mut effects)?)
            }
            DeskAction::PromoteNext { explicit } => {
                DeskOutput::Promoted(Self::promote_next(state, explicit, env, &mut effects)?)
            }
            DeskAction::Deactivate { reason } => {
                Self::deactivate(state, reason, env, &mut effects)?;
                DeskOutput::Deactivated
            }
            DeskAction::Reactivate => {
                Self::reactivate(state, &mut effects)?;
                DeskOutput::Reactivated
            }
            DeskAction::Rate { user_id, score } => {
                DeskOutput::Rating(Self::rate(state, user_id, score, env, &mut effects)?)
            }
        };
        Ok(Reduction::new(output, effects))
    }
}
