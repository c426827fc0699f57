//! End-to-end admission and payment flows against the in-memory ledger.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

mod common;

use common::{Harness, OPERATOR, user};
use eventdesk_core::notifier::Message;
use eventdesk_core::types::{
    Admission, Cancellation, Capacity, Deactivation, EventId, Money, NewEvent, PaymentDecision,
    RatingOutcome, RatingRejection, Receipt, RejectReason, SeatState,
};
use eventdesk_engine::EngineError;
use eventdesk_testing::{Recipient, test_epoch};

#[tokio::test]
async fn free_event_fills_and_closes() {
    let harness = Harness::new();
    let event = harness.event(2, 0).await;
    let engine = &harness.engine;

    assert_eq!(
        engine.request_admission(user(1), event.id).await.unwrap(),
        Admission::Accepted { order: 1 }
    );
    assert_eq!(
        engine.request_admission(user(2), event.id).await.unwrap(),
        Admission::Accepted { order: 2 }
    );

    let closed = engine.get_event(event.id).await.unwrap();
    assert!(!closed.active);
    assert_eq!(closed.confirmed_count, 2);
    assert_eq!(
        closed.deactivation.map(|d| d.reason),
        Some(Deactivation::CAPACITY_FILLED.to_string())
    );

    assert_eq!(
        engine.request_admission(user(3), event.id).await.unwrap(),
        Admission::Rejected(RejectReason::EventUnavailable)
    );

    let roster = harness.notifier.operator_posts().into_iter().find_map(|d| match d.message {
        Message::FinalRoster { attendees, .. } => Some(attendees),
        _ => None,
    });
    assert_eq!(roster, Some(vec![user(1), user(2)]));
}

#[tokio::test]
async fn second_request_is_idempotent() {
    let harness = Harness::new();
    let event = harness.event(5, 10_000).await;

    let first = harness.engine.request_admission(user(1), event.id).await.unwrap();
    let commits = harness.ledger.commit_count();
    let second = harness.engine.request_admission(user(1), event.id).await.unwrap();

    assert!(matches!(first, Admission::ReservedPendingPayment { .. }));
    assert_eq!(second, Admission::Rejected(RejectReason::AlreadyRegistered));
    assert_eq!(harness.ledger.commit_count(), commits);
    assert_eq!(harness.ledger.snapshot(event.id).unwrap().registration_count(), 1);
}

#[tokio::test]
async fn unknown_event_is_unavailable() {
    let harness = Harness::new();
    let admission = harness
        .engine
        .request_admission(user(1), EventId::new())
        .await
        .unwrap();
    assert_eq!(admission, Admission::Rejected(RejectReason::EventUnavailable));
}

#[tokio::test]
async fn operator_cancel_promotes_the_waitlist() {
    let harness = Harness::new();
    let event = harness.event(1, 10_000).await;
    let engine = &harness.engine;

    assert_eq!(
        engine.request_admission(user(1), event.id).await.unwrap(),
        Admission::ReservedPendingPayment {
            amount: Money::from_minor(10_000),
            order: 1
        }
    );
    assert_eq!(
        engine.request_admission(user(2), event.id).await.unwrap(),
        Admission::Waitlisted { position: 1 }
    );

    let token = engine
        .submit_receipt(user(1), event.id, Receipt("photo-1".to_string()))
        .await
        .unwrap();
    engine
        .resolve_by_token(OPERATOR, token, PaymentDecision::Cancel)
        .await
        .unwrap();

    let ledger = harness.ledger.snapshot(event.id).unwrap();
    assert!(ledger.registration(user(1)).is_none());
    assert_eq!(
        ledger.registration(user(2)).map(|r| r.state.clone()),
        Some(SeatState::Reserved)
    );
    assert_eq!(ledger.waitlist_len(), 0);
    assert_eq!(ledger.event.confirmed_count, 0);

    assert!(harness
        .notifier
        .messages_for(user(1))
        .contains(&Message::ReservationCancelled { event_id: event.id }));
    assert!(harness.notifier.messages_for(user(2)).contains(&Message::PromotedFromWaitlist {
        event_id: event.id,
        amount: Money::from_minor(10_000),
    }));
}

#[tokio::test]
async fn confirmed_payment_fills_the_event() {
    let harness = Harness::new();
    let event = harness.event(1, 10_000).await;
    let engine = &harness.engine;

    engine.request_admission(user(1), event.id).await.unwrap();
    let token = engine
        .submit_receipt(user(1), event.id, Receipt("photo-1".to_string()))
        .await
        .unwrap();

    let review = harness.notifier.operator_posts();
    assert_eq!(review.len(), 1);
    assert_eq!(review[0].actions.len(), 3);
    assert!(review[0].actions.iter().all(|action| action.token == token));

    engine
        .resolve_payment(OPERATOR, user(1), event.id, PaymentDecision::Confirm)
        .await
        .unwrap();

    let ledger = harness.ledger.snapshot(event.id).unwrap();
    let payment = ledger.payments.get(&user(1)).expect("payment recorded");
    assert_eq!(payment.amount, Money::from_minor(10_000));
    assert_eq!(payment.confirmed_by, OPERATOR);
    assert_eq!(payment.confirmed_at, test_epoch());
    assert_eq!(ledger.event.confirmed_count, 1);
    assert!(!ledger.event.active);

    // The button is spent
    let again = engine.resolve_by_token(OPERATOR, token, PaymentDecision::Confirm).await;
    assert!(matches!(again, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn unclear_receipt_releases_the_seat() {
    let harness = Harness::new();
    let event = harness.event(2, 500).await;
    let engine = &harness.engine;

    engine.request_admission(user(1), event.id).await.unwrap();
    engine
        .submit_receipt(user(1), event.id, Receipt("blurry".to_string()))
        .await
        .unwrap();
    engine
        .resolve_payment(OPERATOR, user(1), event.id, PaymentDecision::Unclear)
        .await
        .unwrap();

    assert_eq!(harness.ledger.snapshot(event.id).unwrap().registration_count(), 0);
    assert!(harness
        .notifier
        .messages_for(user(1))
        .contains(&Message::PaymentUnclear { event_id: event.id }));
    // The member may try again
    assert!(matches!(
        engine.request_admission(user(1), event.id).await.unwrap(),
        Admission::ReservedPendingPayment { .. }
    ));
}

#[tokio::test]
async fn resolving_before_receipt_is_invalid_and_leaves_the_ledger() {
    let harness = Harness::new();
    let event = harness.event(1, 500).await;
    harness.engine.request_admission(user(1), event.id).await.unwrap();
    let before = harness.ledger.snapshot(event.id).unwrap();

    let result = harness
        .engine
        .resolve_payment(OPERATOR, user(1), event.id, PaymentDecision::Confirm)
        .await;

    assert!(matches!(result, Err(EngineError::InvalidState(_))));
    assert_eq!(harness.ledger.snapshot(event.id).unwrap(), before);
}

#[tokio::test]
async fn non_operator_cannot_resolve() {
    let harness = Harness::new();
    let event = harness.event(1, 500).await;
    harness.engine.request_admission(user(1), event.id).await.unwrap();
    let token = harness
        .engine
        .submit_receipt(user(1), event.id, Receipt("r".to_string()))
        .await
        .unwrap();
    let before = harness.ledger.snapshot(event.id).unwrap();

    let by_id = harness
        .engine
        .resolve_payment(user(1), user(1), event.id, PaymentDecision::Confirm)
        .await;
    let by_token = harness
        .engine
        .resolve_by_token(user(2), token, PaymentDecision::Cancel)
        .await;

    assert_eq!(by_id, Err(EngineError::Unauthorized(user(1))));
    assert_eq!(by_token, Err(EngineError::Unauthorized(user(2))));
    assert_eq!(harness.ledger.snapshot(event.id).unwrap(), before);
}

#[tokio::test]
async fn member_cancellations() {
    let harness = Harness::new();
    let event = harness.event(1, 10_000).await;
    let engine = &harness.engine;

    engine.request_admission(user(1), event.id).await.unwrap();
    engine.request_admission(user(2), event.id).await.unwrap();
    engine.request_admission(user(3), event.id).await.unwrap();

    // Waiting member leaves the queue
    assert_eq!(
        engine.cancel_registration(user(3), event.id).await.unwrap(),
        Cancellation::LeftWaitlist
    );
    // Reservation holder steps back; the next in line takes over
    assert_eq!(
        engine.cancel_registration(user(1), event.id).await.unwrap(),
        Cancellation::ReservationReleased
    );
    let ledger = harness.ledger.snapshot(event.id).unwrap();
    assert!(ledger.registration(user(2)).is_some());
    assert_eq!(ledger.waitlist_len(), 0);

    assert_eq!(
        engine.cancel_registration(user(9), event.id).await.unwrap(),
        Cancellation::Rejected(RejectReason::NotRegistered)
    );
}

#[tokio::test]
async fn confirmed_seat_can_be_returned_until_the_event_starts() {
    let harness = Harness::new();
    let engine = &harness.engine;
    let event = engine
        .create_event(
            OPERATOR,
            NewEvent {
                title: "Concert".to_string(),
                capacity: Capacity::Bounded(3),
                cost: Money::from_minor(2_000),
                description: None,
                location: None,
                starts_at: Some(test_epoch() + chrono::Duration::days(2)),
            },
        )
        .await
        .unwrap();

    for member in [1, 2] {
        engine.request_admission(user(member), event.id).await.unwrap();
        engine
            .submit_receipt(user(member), event.id, Receipt(format!("r{member}")))
            .await
            .unwrap();
        engine
            .resolve_payment(OPERATOR, user(member), event.id, PaymentDecision::Confirm)
            .await
            .unwrap();
    }

    assert_eq!(
        engine.cancel_registration(user(1), event.id).await.unwrap(),
        Cancellation::SeatReleased
    );
    let ledger = harness.ledger.snapshot(event.id).unwrap();
    assert_eq!(ledger.event.confirmed_count, 1);
    assert!(!ledger.payments.contains_key(&user(1)));

    harness.clock.advance(chrono::Duration::days(3));
    assert_eq!(
        engine.cancel_registration(user(2), event.id).await.unwrap(),
        Cancellation::Rejected(RejectReason::EventStarted)
    );
}

#[tokio::test]
async fn returned_paid_seat_goes_to_the_waitlist() {
    let harness = Harness::new();
    let event = harness.event(1, 10_000).await;
    let engine = &harness.engine;

    engine.request_admission(user(1), event.id).await.unwrap();
    engine.request_admission(user(2), event.id).await.unwrap();
    let token = engine
        .submit_receipt(user(1), event.id, Receipt("r1".to_string()))
        .await
        .unwrap();
    engine
        .resolve_by_token(OPERATOR, token, PaymentDecision::Confirm)
        .await
        .unwrap();

    assert_eq!(
        engine.cancel_registration(user(1), event.id).await.unwrap(),
        Cancellation::SeatReleased
    );

    let ledger = harness.ledger.snapshot(event.id).unwrap();
    assert_eq!(ledger.event.confirmed_count, 0);
    assert!(!ledger.payments.contains_key(&user(1)));
    assert_eq!(
        ledger.registration(user(2)).map(|r| r.state.clone()),
        Some(SeatState::Reserved)
    );
    assert_eq!(ledger.waitlist_len(), 0);
    assert!(harness.notifier.messages_for(user(2)).contains(&Message::PromotedFromWaitlist {
        event_id: event.id,
        amount: Money::from_minor(10_000),
    }));
}

#[tokio::test]
async fn explicit_promotion() {
    let harness = Harness::new();
    let event = harness.event(1, 10_000).await;
    let engine = &harness.engine;

    assert!(matches!(
        engine.promote_next(event.id).await,
        Err(EngineError::InvalidState(_))
    ));

    engine.request_admission(user(1), event.id).await.unwrap();
    engine.request_admission(user(2), event.id).await.unwrap();
    // Seat still held by the first reservation
    assert!(matches!(
        engine.promote_next(event.id).await,
        Err(EngineError::InvalidState(_))
    ));
}

#[tokio::test]
async fn manual_deactivation_and_reactivation() {
    let harness = Harness::new();
    let event = harness.event(10, 0).await;
    let engine = &harness.engine;
    engine.request_admission(user(1), event.id).await.unwrap();

    assert_eq!(
        engine.deactivate_event(user(1), event.id, "cancelled").await,
        Err(EngineError::Unauthorized(user(1)))
    );
    engine
        .deactivate_event(OPERATOR, event.id, "speaker ill")
        .await
        .unwrap();
    assert!(matches!(
        engine.deactivate_event(OPERATOR, event.id, "again").await,
        Err(EngineError::InvalidState(_))
    ));
    assert!(engine.list_active_events().await.unwrap().is_empty());

    engine.reactivate_event(OPERATOR, event.id).await.unwrap();
    let reopened = engine.get_event(event.id).await.unwrap();
    assert!(reopened.active);
    assert!(reopened.deactivation.is_none());
    assert_eq!(reopened.confirmed_count, 1);
    assert!(matches!(
        engine.reactivate_event(OPERATOR, event.id).await,
        Err(EngineError::InvalidState(_))
    ));
}

#[tokio::test]
async fn manual_closure_holds_the_waitlist_until_reactivation() {
    let harness = Harness::new();
    let event = harness.event(1, 10_000).await;
    let engine = &harness.engine;
    engine.request_admission(user(1), event.id).await.unwrap();
    engine.request_admission(user(2), event.id).await.unwrap();
    engine
        .deactivate_event(OPERATOR, event.id, "venue closed")
        .await
        .unwrap();

    assert_eq!(
        engine.cancel_registration(user(1), event.id).await.unwrap(),
        Cancellation::ReservationReleased
    );
    let ledger = harness.ledger.snapshot(event.id).unwrap();
    assert_eq!(ledger.registration_count(), 0);
    assert_eq!(ledger.waitlist_len(), 1);
    assert!(!harness
        .notifier
        .messages_for(user(2))
        .iter()
        .any(|m| matches!(m, Message::PromotedFromWaitlist { .. })));

    engine.reactivate_event(OPERATOR, event.id).await.unwrap();
    assert_eq!(engine.promote_next(event.id).await.unwrap(), user(2));
    let ledger = harness.ledger.snapshot(event.id).unwrap();
    assert_eq!(
        ledger.registration(user(2)).map(|r| r.state.clone()),
        Some(SeatState::Reserved)
    );
}

#[tokio::test]
async fn catalogue_queries() {
    let harness = Harness::new();
    let engine = &harness.engine;
    let first = harness.event(3, 0).await;
    let second = harness.event(3, 700).await;

    assert_eq!(
        engine.create_event(user(5), first_request()).await,
        Err(EngineError::Unauthorized(user(5)))
    );
    let mut blank = first_request();
    blank.title = "  ".to_string();
    assert!(matches!(
        engine.create_event(OPERATOR, blank).await,
        Err(EngineError::InvalidInput(_))
    ));

    let workshop = engine.create_event(OPERATOR, first_request()).await.unwrap();
    let stored = engine.get_event(workshop.id).await.unwrap();
    assert_eq!(stored.description.as_deref(), Some("Soldering for beginners"));
    assert_eq!(stored.location.as_deref(), Some("Room 4"));

    let active: Vec<_> = engine
        .list_active_events()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(active.len(), 3);
    assert!(active.contains(&first.id) && active.contains(&second.id));

    engine.request_admission(user(1), first.id).await.unwrap();
    engine.request_admission(user(1), second.id).await.unwrap();
    let registrations = engine.registrations_for_user(user(1)).await.unwrap();
    assert_eq!(registrations.len(), 2);
    assert!(
        registrations
            .iter()
            .any(|r| r.event_id == second.id && r.state == SeatState::Reserved)
    );

    assert!(matches!(
        engine.get_event(EventId::new()).await,
        Err(EngineError::NotFound(_))
    ));
}

fn first_request() -> NewEvent {
    NewEvent {
        title: "Workshop".to_string(),
        capacity: Capacity::Unlimited,
        cost: Money::ZERO,
        description: Some("Soldering for beginners".to_string()),
        location: Some("Room 4".to_string()),
        starts_at: None,
    }
}

#[tokio::test]
async fn ratings_follow_attendance_and_window() {
    let harness = Harness::new();
    let event = harness.event(2, 0).await;
    let engine = &harness.engine;
    engine.request_admission(user(1), event.id).await.unwrap();

    assert!(matches!(
        engine.rate_event(user(1), event.id, 6).await,
        Err(EngineError::InvalidInput(_))
    ));
    assert_eq!(
        engine.rate_event(user(1), event.id, 4).await.unwrap(),
        RatingOutcome::Rejected(
            RatingRejection::EventStillActive
        )
    );

    engine.deactivate_event(OPERATOR, event.id, "done").await.unwrap();
    harness.clock.advance(chrono::Duration::days(1));
    assert!(matches!(
        engine.rate_event(user(1), event.id, 4).await.unwrap(),
        RatingOutcome::Recorded(_)
    ));
    assert_eq!(
        engine.rate_event(user(2), event.id, 4).await.unwrap(),
        RatingOutcome::Rejected(RatingRejection::NotAttended)
    );

    harness.clock.advance(chrono::Duration::days(7));
    assert_eq!(
        engine.rate_event(user(1), event.id, 2).await.unwrap(),
        RatingOutcome::Rejected(RatingRejection::WindowClosed)
    );
}

#[tokio::test]
async fn operator_channel_sees_receipts_not_member_messages() {
    let harness = Harness::new();
    let event = harness.event(1, 10_000).await;
    harness.engine.request_admission(user(1), event.id).await.unwrap();
    harness
        .engine
        .submit_receipt(user(1), event.id, Receipt("scan".to_string()))
        .await
        .unwrap();

    let deliveries = harness.notifier.deliveries();
    assert_eq!(deliveries.iter().filter(|d| d.to == Recipient::Operators).count(), 1);
    assert_eq!(
        harness.notifier.messages_for(user(1)),
        vec![
            Message::PaymentRequested {
                event_id: event.id,
                amount: Money::from_minor(10_000),
                order: 1
            },
            Message::ReceiptUnderReview { event_id: event.id },
        ]
    );
}
