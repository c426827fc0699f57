//! Business metrics for the admission engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `eventdesk_admissions_total{outcome}` - Admission requests by outcome
//! - `eventdesk_payment_decisions_total{decision}` - Operator verdicts
//! - `eventdesk_cancellations_total{outcome}` - User cancellations by outcome
//! - `eventdesk_promotions_total` - Waitlist promotions
//! - `eventdesk_deactivations_total{trigger}` - Deactivations (capacity or manual)
//! - `eventdesk_events_created_total` - Events created
//! - `eventdesk_ratings_total{outcome}` - Rating requests by outcome
//! - `eventdesk_notification_failures_total{recipient}` - Deliveries given up on
//! - `eventdesk_commit_conflicts_total` - Optimistic version conflicts

use eventdesk_core::types::{
    Admission, Cancellation, Deactivation, PaymentDecision, RatingOutcome, RatingRejection,
    RejectReason,
};
use metrics::describe_counter;

/// Register all metric descriptions.
///
/// Call once at startup, before any metrics are recorded.
pub fn register_engine_metrics() {
    describe_counter!("eventdesk_admissions_total", "Admission requests by outcome");
    describe_counter!(
        "eventdesk_payment_decisions_total",
        "Operator payment decisions (confirm, unclear, cancel)"
    );
    describe_counter!("eventdesk_cancellations_total", "User cancellations by outcome");
    describe_counter!("eventdesk_promotions_total", "Waitlisted users promoted to a reservation");
    describe_counter!(
        "eventdesk_deactivations_total",
        "Event deactivations by trigger (capacity, manual)"
    );
    describe_counter!("eventdesk_events_created_total", "Events created by operators");
    describe_counter!("eventdesk_ratings_total", "Rating requests by outcome");
    describe_counter!(
        "eventdesk_notification_failures_total",
        "Notifications dropped after exhausting retries"
    );
    describe_counter!(
        "eventdesk_commit_conflicts_total",
        "Commits rejected because the ledger version moved"
    );

    tracing::info!("Engine metrics registered");
}

const fn reject_label(reason: RejectReason) -> &'static str {
    match reason {
        RejectReason::EventUnavailable => "event_unavailable",
        RejectReason::AlreadyRegistered => "already_registered",
        RejectReason::Full => "full",
        RejectReason::CapacityAndWaitlistFull => "waitlist_full",
        RejectReason::NotRegistered => "not_registered",
        RejectReason::EventStarted => "event_started",
    }
}

/// Record the outcome of an admission request.
pub fn record_admission(admission: &Admission) {
    let outcome = match admission {
        Admission::Accepted { .. } => "accepted",
        Admission::ReservedPendingPayment { .. } => "reserved",
        Admission::Waitlisted { .. } => "waitlisted",
        Admission::Rejected(reason) => reject_label(*reason),
    };
    metrics::counter!("eventdesk_admissions_total", "outcome" => outcome).increment(1);
}

/// Record an operator verdict on a receipt.
pub fn record_payment_decision(decision: PaymentDecision) {
    let label = match decision {
        PaymentDecision::Confirm => "confirm",
        PaymentDecision::Unclear => "unclear",
        PaymentDecision::Cancel => "cancel",
    };
    metrics::counter!("eventdesk_payment_decisions_total", "decision" => label).increment(1);
}

/// Record the outcome of a user cancellation.
pub fn record_cancellation(cancellation: &Cancellation) {
    let outcome = match cancellation {
        Cancellation::ReservationReleased => "reservation_released",
        Cancellation::SeatReleased => "seat_released",
        Cancellation::LeftWaitlist => "left_waitlist",
        Cancellation::Rejected(reason) => reject_label(*reason),
    };
    metrics::counter!("eventdesk_cancellations_total", "outcome" => outcome).increment(1);
}

/// Record one waitlist promotion.
pub fn record_promotion() {
    metrics::counter!("eventdesk_promotions_total").increment(1);
}

/// Record a deactivation, labelled by what triggered it.
pub fn record_deactivation(deactivation: &Deactivation) {
    let trigger = if deactivation.reason == Deactivation::CAPACITY_FILLED {
        "capacity"
    } else {
        "manual"
    };
    metrics::counter!("eventdesk_deactivations_total", "trigger" => trigger).increment(1);
}

/// Record a newly created event.
pub fn record_event_created() {
    metrics::counter!("eventdesk_events_created_total").increment(1);
}

/// Record the outcome of a rating request.
pub fn record_rating(outcome: &RatingOutcome) {
    let label = match outcome {
        RatingOutcome::Recorded(_) => "recorded",
        RatingOutcome::Rejected(RatingRejection::EventStillActive) => "event_active",
        RatingOutcome::Rejected(RatingRejection::WindowClosed) => "window_closed",
        RatingOutcome::Rejected(RatingRejection::NotAttended) => "not_attended",
        RatingOutcome::Rejected(RatingRejection::AlreadyRated) => "already_rated",
    };
    metrics::counter!("eventdesk_ratings_total", "outcome" => label).increment(1);
}

/// Record a notification that was given up on.
pub fn record_notification_failure(recipient: &'static str) {
    metrics::counter!("eventdesk_notification_failures_total", "recipient" => recipient)
        .increment(1);
}

/// Record an optimistic concurrency conflict on commit.
pub fn record_commit_conflict() {
    metrics::counter!("eventdesk_commit_conflicts_total").increment(1);
}
