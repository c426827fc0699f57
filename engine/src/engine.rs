//! The admission engine: the imperative shell around [`DeskReducer`].
//!
//! Every operation that touches an event's ledger runs as one atomic unit:
//!
//! 1. acquire the event's async mutex (different events run in parallel)
//! 2. load the [`EventLedger`] snapshot
//! 3. reduce the action, then any actions it dispatched, on the snapshot
//! 4. commit all emitted ops with the snapshot's version
//! 5. release the mutex and deliver notifications
//!
//! A version conflict at step 4 means another process wrote the event in
//! between; the engine backs off, reloads and decides again, up to
//! `commit_attempts` times. Notifications are retried on transport errors and
//! otherwise dropped with a warning; they never undo a commit.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::metrics;
use crate::reducer::{DeskAction, DeskEnvironment, DeskOutput, DeskReducer};
use crate::retry::retry_with_predicate;
use eventdesk_core::effect::{Effect, Notification};
use eventdesk_core::environment::Clock;
use eventdesk_core::ledger::{EventLedger, LedgerError, LedgerOp, LedgerStore};
use eventdesk_core::notifier::{Message, Notifier, NotifyError, OperatorDirectory};
use eventdesk_core::reducer::Reducer;
use eventdesk_core::types::{
    Admission, Cancellation, DecisionToken, Event, EventId, NewEvent, PaymentDecision,
    RatingOutcome, Receipt, Registration, RejectReason, Score, UserId,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::sleep;

/// Upper bound on follow-up actions reduced inside one unit.
const MAX_DISPATCH_DEPTH: usize = 16;

/// Registry of per-event async mutexes.
#[derive(Debug, Default)]
struct EventLocks {
    locks: Mutex<HashMap<EventId, Arc<tokio::sync::Mutex<()>>>>,
}

impl EventLocks {
    fn lock_for(&self, event_id: EventId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Forget mutexes nobody holds or waits on
        locks.retain(|id, lock| *id == event_id || Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(event_id).or_default())
    }
}

/// Everything one atomic unit decided.
#[derive(Debug)]
struct Decision {
    output: DeskOutput,
    ops: Vec<LedgerOp>,
    notifications: Vec<Notification>,
}

/// Event admission and payment reservation engine.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
///
/// # Example
///
/// ```
/// use eventdesk_engine::{AdmissionEngine, EngineConfig};
/// use eventdesk_core::types::{Admission, Capacity, Money, NewEvent, UserId};
/// use eventdesk_testing::{InMemoryLedger, RecordingNotifier, StaticOperators, test_clock};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), eventdesk_engine::EngineError> {
/// let operator = UserId::new(1);
/// let engine = AdmissionEngine::new(
///     Arc::new(InMemoryLedger::new()),
///     Arc::new(RecordingNotifier::new()),
///     Arc::new(StaticOperators::new([operator])),
///     Arc::new(test_clock()),
///     EngineConfig::default(),
/// );
/// let event = engine
///     .create_event(
///         operator,
///         NewEvent {
///             title: "Brewery visit".to_string(),
///             capacity: Capacity::Bounded(2),
///             cost: Money::ZERO,
///             description: None,
///             location: None,
///             starts_at: None,
///         },
///     )
///     .await?;
/// let admission = engine.request_admission(UserId::new(7), event.id).await?;
/// assert_eq!(admission, Admission::Accepted { order: 1 });
/// # Ok(())
/// # }
/// ```
pub struct AdmissionEngine {
    ledger: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
    operators: Arc<dyn OperatorDirectory>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    env: DeskEnvironment,
    reducer: DeskReducer,
    locks: EventLocks,
}

impl std::fmt::Debug for AdmissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AdmissionEngine {
    /// Create an engine over the given collaborators.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
        operators: Arc<dyn OperatorDirectory>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let env = DeskEnvironment::new(
            Arc::clone(&clock),
            config.waitlist_limit,
            config.rating_window(),
        );
        Self {
            ledger,
            notifier,
            operators,
            clock,
            config,
            env,
            reducer: DeskReducer,
            locks: EventLocks::default(),
        }
    }

    // ========================================================================
    // Event catalogue
    // ========================================================================

    /// Create an active event.
    ///
    /// # Errors
    ///
    /// - `Unauthorized`: `operator` is not an operator
    /// - `InvalidInput`: blank title
    /// - `Ledger`: storage failure
    #[tracing::instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_event(
        &self,
        operator: UserId,
        request: NewEvent,
    ) -> Result<Event, EngineError> {
        self.ensure_operator(operator).await?;
        if request.title.trim().is_empty() {
            return Err(EngineError::InvalidInput("event title must not be blank".to_string()));
        }
        let event = Event::from_request(request, self.clock.now());
        self.ledger.create_event(event.clone()).await?;
        metrics::record_event_created();
        tracing::info!(event_id = %event.id, "Event created");
        Ok(event)
    }

    /// Fetch one event.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such event
    /// - `Ledger`: storage failure
    pub async fn get_event(&self, event_id: EventId) -> Result<Event, EngineError> {
        self.ledger
            .get_event(event_id)
            .await?
            .ok_or_else(|| event_not_found(event_id))
    }

    /// Active events ordered by start time, then creation.
    ///
    /// # Errors
    ///
    /// - `Ledger`: storage failure
    pub async fn list_active_events(&self) -> Result<Vec<Event>, EngineError> {
        Ok(self.ledger.list_active_events().await?)
    }

    /// A member's registrations across events, with their seat states.
    ///
    /// # Errors
    ///
    /// - `Ledger`: storage failure
    pub async fn registrations_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Registration>, EngineError> {
        Ok(self.ledger.registrations_for_user(user_id).await?)
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Decide a member's registration request.
    ///
    /// Refusals (unknown or inactive event, duplicate, full) come back as
    /// [`Admission::Rejected`].
    ///
    /// # Errors
    ///
    /// - `Ledger`: storage failure or persistent version conflicts
    #[tracing::instrument(skip(self))]
    pub async fn request_admission(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Admission, EngineError> {
        let action = DeskAction::RequestAdmission { user_id };
        let admission = match self.run(event_id, action).await? {
            Some(DeskOutput::Admission(admission)) => admission,
            None => Admission::Rejected(RejectReason::EventUnavailable),
            Some(other) => return Err(unexpected(&other)),
        };
        metrics::record_admission(&admission);
        tracing::debug!(?admission, "Admission decided");
        Ok(admission)
    }

    // ========================================================================
    // Payment reservations
    // ========================================================================

    /// Forward a payment receipt for operator review.
    ///
    /// Returns the token bound to the operator's decision buttons.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such event or no registration for the member
    /// - `InvalidState`: the registration is not a fresh reservation
    /// - `Ledger`: storage failure
    #[tracing::instrument(skip(self, receipt))]
    pub async fn submit_receipt(
        &self,
        user_id: UserId,
        event_id: EventId,
        receipt: Receipt,
    ) -> Result<DecisionToken, EngineError> {
        let action = DeskAction::SubmitReceipt {
            user_id,
            receipt,
            token: DecisionToken::new(),
        };
        match self.run(event_id, action).await? {
            Some(DeskOutput::ReceiptSubmitted(token)) => Ok(token),
            None => Err(event_not_found(event_id)),
            Some(other) => Err(unexpected(&other)),
        }
    }

    /// Apply an operator's verdict to a reservation under review.
    ///
    /// `Confirm` records the payment and confirms the seat. `Unclear` and
    /// `Cancel` release the seat and promote the oldest waiting user in the
    /// same commit.
    ///
    /// # Errors
    ///
    /// - `Unauthorized`: `operator` is not an operator (ledger untouched)
    /// - `NotFound`: no such event or reservation
    /// - `InvalidState`: the reservation is not awaiting review, or a confirm
    ///   would exceed capacity
    /// - `Ledger`: storage failure
    #[tracing::instrument(skip(self))]
    pub async fn resolve_payment(
        &self,
        operator: UserId,
        user_id: UserId,
        event_id: EventId,
        decision: PaymentDecision,
    ) -> Result<(), EngineError> {
        self.ensure_operator(operator).await?;
        self.resolve(operator, user_id, event_id, decision, None).await
    }

    /// Apply an operator's verdict delivered through a decision button.
    ///
    /// # Errors
    ///
    /// - `Unauthorized`: `operator` is not an operator (ledger untouched)
    /// - `NotFound`: the token matches no reservation under review
    /// - `InvalidState`: the reservation moved on since the token was issued
    /// - `Ledger`: storage failure
    #[tracing::instrument(skip(self))]
    pub async fn resolve_by_token(
        &self,
        operator: UserId,
        token: DecisionToken,
        decision: PaymentDecision,
    ) -> Result<(), EngineError> {
        self.ensure_operator(operator).await?;
        let (event_id, user_id) = self
            .ledger
            .locate_decision(token)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("decision token {token}")))?;
        self.resolve(operator, user_id, event_id, decision, Some(token)).await
    }

    async fn resolve(
        &self,
        operator: UserId,
        user_id: UserId,
        event_id: EventId,
        decision: PaymentDecision,
        token: Option<DecisionToken>,
    ) -> Result<(), EngineError> {
        let action = DeskAction::ResolvePayment {
            operator,
            user_id,
            decision,
            token,
        };
        match self.run(event_id, action).await? {
            Some(DeskOutput::PaymentResolved(_)) => {
                metrics::record_payment_decision(decision);
                tracing::info!(%user_id, %event_id, ?decision, "Payment resolved");
                Ok(())
            }
            None => Err(event_not_found(event_id)),
            Some(other) => Err(unexpected(&other)),
        }
    }

    /// Give back a member's seat or waitlist entry.
    ///
    /// Freed seats go to the oldest waiting user in the same commit.
    ///
    /// # Errors
    ///
    /// - `Ledger`: storage failure
    #[tracing::instrument(skip(self))]
    pub async fn cancel_registration(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Cancellation, EngineError> {
        let action = DeskAction::CancelRegistration { user_id };
        let cancellation = match self.run(event_id, action).await? {
            Some(DeskOutput::Cancellation(cancellation)) => cancellation,
            None => Cancellation::Rejected(RejectReason::NotRegistered),
            Some(other) => return Err(unexpected(&other)),
        };
        metrics::record_cancellation(&cancellation);
        Ok(cancellation)
    }

    // ========================================================================
    // Waitlist
    // ========================================================================

    /// Offer a free seat to the oldest waiting user.
    ///
    /// Releases promote automatically; this is for operators nudging an
    /// event whose seats were freed some other way.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such event
    /// - `InvalidState`: the waitlist is empty or no seat is free
    /// - `Ledger`: storage failure
    #[tracing::instrument(skip(self))]
    pub async fn promote_next(&self, event_id: EventId) -> Result<UserId, EngineError> {
        match self.run(event_id, DeskAction::PromoteNext { explicit: true }).await? {
            Some(DeskOutput::Promoted(Some(user_id))) => Ok(user_id),
            None => Err(event_not_found(event_id)),
            Some(other) => Err(unexpected(&other)),
        }
    }

    // ========================================================================
    // Activation
    // ========================================================================

    /// Close registration and publish the roster.
    ///
    /// # Errors
    ///
    /// - `Unauthorized`: `operator` is not an operator
    /// - `NotFound`: no such event
    /// - `InvalidState`: the event is already inactive
    /// - `Ledger`: storage failure
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_event(
        &self,
        operator: UserId,
        event_id: EventId,
        reason: &str,
    ) -> Result<(), EngineError> {
        self.ensure_operator(operator).await?;
        let action = DeskAction::Deactivate {
            reason: reason.to_string(),
        };
        match self.run(event_id, action).await? {
            Some(DeskOutput::Deactivated) => Ok(()),
            None => Err(event_not_found(event_id)),
            Some(other) => Err(unexpected(&other)),
        }
    }

    /// Reopen registration. Registrations are left as they are.
    ///
    /// # Errors
    ///
    /// - `Unauthorized`: `operator` is not an operator
    /// - `NotFound`: no such event
    /// - `InvalidState`: the event is already active
    /// - `Ledger`: storage failure
    #[tracing::instrument(skip(self))]
    pub async fn reactivate_event(
        &self,
        operator: UserId,
        event_id: EventId,
    ) -> Result<(), EngineError> {
        self.ensure_operator(operator).await?;
        match self.run(event_id, DeskAction::Reactivate).await? {
            Some(DeskOutput::Reactivated) => {
                tracing::info!(%event_id, "Event reactivated");
                Ok(())
            }
            None => Err(event_not_found(event_id)),
            Some(other) => Err(unexpected(&other)),
        }
    }

    // ========================================================================
    // Ratings
    // ========================================================================

    /// Rate an attended event on a 1-5 scale.
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: score outside `1..=5`
    /// - `NotFound`: no such event
    /// - `Ledger`: storage failure
    #[tracing::instrument(skip(self))]
    pub async fn rate_event(
        &self,
        user_id: UserId,
        event_id: EventId,
        score: u8,
    ) -> Result<RatingOutcome, EngineError> {
        let score = Score::new(score).ok_or_else(|| {
            EngineError::InvalidInput(format!(
                "score {score} outside {}..={}",
                Score::MIN,
                Score::MAX
            ))
        })?;
        let outcome = match self.run(event_id, DeskAction::Rate { user_id, score }).await? {
            Some(DeskOutput::Rating(outcome)) => outcome,
            None => return Err(event_not_found(event_id)),
            Some(other) => return Err(unexpected(&other)),
        };
        metrics::record_rating(&outcome);
        Ok(outcome)
    }

    // ========================================================================
    // Runtime
    // ========================================================================

    async fn ensure_operator(&self, user_id: UserId) -> Result<(), EngineError> {
        if self.operators.is_operator(user_id).await {
            Ok(())
        } else {
            tracing::warn!(%user_id, "Operator action refused");
            Err(EngineError::Unauthorized(user_id))
        }
    }

    /// Run one atomic unit for `event_id`. `None` when the event does not exist.
    async fn run(
        &self,
        event_id: EventId,
        action: DeskAction,
    ) -> Result<Option<DeskOutput>, EngineError> {
        let lock = self.locks.lock_for(event_id);
        let guard = lock.lock().await;

        let mut attempt: u32 = 1;
        let decision = loop {
            let Some(mut ledger) = self.ledger.load(event_id).await? else {
                return Ok(None);
            };
            let version = ledger.version;
            let decision = self.decide(&mut ledger, action.clone())?;
            if decision.ops.is_empty() {
                break decision;
            }

            match self.ledger.commit(event_id, version, decision.ops.clone()).await {
                Ok(committed) => {
                    tracing::debug!(
                        %event_id,
                        version = %committed,
                        ops = decision.ops.len(),
                        "Unit committed"
                    );
                    record_committed(&decision.ops, &decision.notifications);
                    break decision;
                }
                Err(LedgerError::ConcurrencyConflict { expected, actual, .. })
                    if attempt < self.config.commit_attempts =>
                {
                    metrics::record_commit_conflict();
                    let delay = self
                        .config
                        .commit_backoff
                        .delay_for_attempt(usize::try_from(attempt - 1).unwrap_or(usize::MAX));
                    tracing::debug!(
                        %event_id,
                        %expected,
                        %actual,
                        attempt,
                        "Version moved, deciding again"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    if matches!(error, LedgerError::ConcurrencyConflict { .. }) {
                        metrics::record_commit_conflict();
                    }
                    return Err(error.into());
                }
            }
        };
        drop(guard);

        self.deliver(decision.notifications).await;
        Ok(Some(decision.output))
    }

    /// Reduce `action` and everything it dispatches on one snapshot.
    fn decide(
        &self,
        ledger: &mut EventLedger,
        action: DeskAction,
    ) -> Result<Decision, EngineError> {
        let reduction = self.reducer.reduce(ledger, action, &self.env)?;
        let mut decision = Decision {
            output: reduction.output,
            ops: Vec::new(),
            notifications: Vec::new(),
        };
        let mut pending: VecDeque<Effect<DeskAction>> = reduction.effects.into_iter().collect();
        let mut dispatched = 0;

        while let Some(effect) = pending.pop_front() {
            match effect {
                Effect::Write(op) => decision.ops.push(op),
                Effect::Notify(notification) => decision.notifications.push(notification),
                Effect::Dispatch(follow_up) => {
                    dispatched += 1;
                    if dispatched > MAX_DISPATCH_DEPTH {
                        return Err(EngineError::InvalidState(format!(
                            "more than {MAX_DISPATCH_DEPTH} follow-up actions in one unit"
                        )));
                    }
                    let reduction = self.reducer.reduce(ledger, follow_up, &self.env)?;
                    pending.extend(reduction.effects);
                }
            }
        }
        Ok(decision)
    }

    /// Deliver notifications one by one; failures are logged and counted.
    async fn deliver(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            let result = retry_with_predicate(
                self.config.notify_retry.clone(),
                || self.send(&notification),
                |error: &NotifyError| matches!(error, NotifyError::Transport(_)),
            )
            .await;
            if let Err(error) = result {
                let recipient = match &notification {
                    Notification::User { .. } => "user",
                    Notification::Operators(_)
                    | Notification::OperatorsWithActions { .. } => "operators",
                };
                tracing::warn!(recipient, %error, ?notification, "Notification dropped");
                metrics::record_notification_failure(recipient);
            }
        }
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification {
            Notification::User { user_id, message } => {
                self.notifier.notify_user(*user_id, message.clone()).await
            }
            Notification::Operators(message) => {
                self.notifier.notify_operator_channel(message.clone()).await
            }
            Notification::OperatorsWithActions { message, actions } => {
                let posted = self
                    .notifier
                    .notify_operator_channel_with_actions(message.clone(), actions.clone())
                    .await?;
                tracing::debug!(message_ref = %posted.0, "Receipt posted for review");
                Ok(())
            }
        }
    }
}

fn record_committed(ops: &[LedgerOp], notifications: &[Notification]) {
    for op in ops {
        if let LedgerOp::DeactivateEvent(deactivation) = op {
            metrics::record_deactivation(deactivation);
        }
    }
    let promotions = notifications.iter().filter(|n| {
        matches!(
            n,
            Notification::User {
                message: Message::PromotedFromWaitlist { .. },
                ..
            }
        )
    });
    for _ in promotions {
        metrics::record_promotion();
    }
}

fn event_not_found(event_id: EventId) -> EngineError {
    EngineError::NotFound(format!("event {event_id}"))
}

fn unexpected(output: &DeskOutput) -> EngineError {
    EngineError::InvalidState(format!("unexpected outcome {output:?}"))
}
