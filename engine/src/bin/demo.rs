//! Eventdesk demo
//!
//! Walks a paid event through reservation, waitlist, operator review and
//! automatic deactivation against the in-memory ledger. Messages that would
//! go to users and operators are written to the log instead.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info,eventdesk_engine=debug cargo run --bin eventdesk-demo
//! ```

use eventdesk_core::environment::SystemClock;
use eventdesk_core::notifier::{Message, MessageRef, Notifier, NotifyFuture, OperatorAction};
use eventdesk_core::types::{Capacity, Money, NewEvent, PaymentDecision, Receipt, UserId};
use eventdesk_engine::{AdmissionEngine, EngineConfig};
use eventdesk_testing::{InMemoryLedger, StaticOperators};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Notifier that logs every message.
#[derive(Debug, Default)]
struct LoggingNotifier {
    posts: AtomicUsize,
}

impl Notifier for LoggingNotifier {
    fn notify_user(&self, user_id: UserId, message: Message) -> NotifyFuture<'_, ()> {
        Box::pin(async move {
            tracing::info!(%user_id, ?message, "-> user");
            Ok(())
        })
    }

    fn notify_operator_channel(&self, message: Message) -> NotifyFuture<'_, ()> {
        Box::pin(async move {
            tracing::info!(?message, "-> operators");
            Ok(())
        })
    }

    fn notify_operator_channel_with_actions(
        &self,
        message: Message,
        actions: Vec<OperatorAction>,
    ) -> NotifyFuture<'_, MessageRef> {
        Box::pin(async move {
            let n = self.posts.fetch_add(1, Ordering::SeqCst) + 1;
            let buttons: Vec<_> = actions.iter().map(|a| a.decision).collect();
            tracing::info!(?message, ?buttons, "-> operators (review #{n})");
            Ok(MessageRef(format!("review-{n}")))
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,eventdesk_engine=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    eventdesk_engine::metrics::register_engine_metrics();

    let config = EngineConfig::from_env();
    tracing::info!(
        waitlist_limit = config.waitlist_limit,
        commit_attempts = config.commit_attempts,
        "Configuration loaded"
    );

    let operator = UserId::new(1000);
    let alice = UserId::new(1);
    let bob = UserId::new(2);

    let ledger = Arc::new(InMemoryLedger::new());
    let engine = AdmissionEngine::new(
        ledger.clone(),
        Arc::new(LoggingNotifier::default()),
        Arc::new(StaticOperators::new([operator])),
        Arc::new(SystemClock),
        config,
    );

    let event = engine
        .create_event(
            operator,
            NewEvent {
                title: "Observatory night".to_string(),
                capacity: Capacity::Bounded(1),
                cost: Money::from_minor(10_000),
                description: Some("Telescopes provided".to_string()),
                location: Some("Hilltop observatory".to_string()),
                starts_at: None,
            },
        )
        .await?;
    tracing::info!(event_id = %event.id, title = %event.title, "Event open");

    let first = engine.request_admission(alice, event.id).await?;
    tracing::info!(user = %alice, ?first, "Admission");
    let second = engine.request_admission(bob, event.id).await?;
    tracing::info!(user = %bob, ?second, "Admission");

    let token = engine
        .submit_receipt(alice, event.id, Receipt("receipt-alice".to_string()))
        .await?;
    engine
        .resolve_by_token(operator, token, PaymentDecision::Cancel)
        .await?;
    tracing::info!("Operator cancelled the first reservation");

    let token = engine
        .submit_receipt(bob, event.id, Receipt("receipt-bob".to_string()))
        .await?;
    engine
        .resolve_by_token(operator, token, PaymentDecision::Confirm)
        .await?;
    tracing::info!("Operator confirmed the promoted reservation");

    let event = engine.get_event(event.id).await?;
    tracing::info!(
        active = event.active,
        confirmed = event.confirmed_count,
        reason = ?event.deactivation.map(|d| d.reason),
        commits = ledger.commit_count(),
        "Final state"
    );

    Ok(())
}
