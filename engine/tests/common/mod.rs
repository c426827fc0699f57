//! Shared fixtures for engine integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)] // Not every test uses every fixture

use eventdesk_core::types::{Capacity, Event, Money, NewEvent, UserId};
use eventdesk_engine::{AdmissionEngine, EngineConfig};
use eventdesk_testing::{
    InMemoryLedger, ManualClock, RecordingNotifier, StaticOperators, test_epoch,
};
use std::sync::Arc;

pub const OPERATOR: UserId = UserId::new(1000);

/// Engine plus handles on every collaborator it was built with.
pub struct Harness {
    pub engine: Arc<AdmissionEngine>,
    pub ledger: InMemoryLedger,
    pub notifier: RecordingNotifier,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default().without_delays())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let ledger = InMemoryLedger::new();
        let notifier = RecordingNotifier::new();
        let clock = ManualClock::new(test_epoch());
        let engine = AdmissionEngine::new(
            Arc::new(ledger.clone()),
            Arc::new(notifier.clone()),
            Arc::new(StaticOperators::new([OPERATOR])),
            Arc::new(clock.clone()),
            config,
        );
        Self {
            engine: Arc::new(engine),
            ledger,
            notifier,
            clock,
        }
    }

    pub async fn event(&self, capacity: u32, cost: u64) -> Event {
        self.engine
            .create_event(
                OPERATOR,
                NewEvent {
                    title: "Open lab evening".to_string(),
                    capacity: Capacity::from_stored(capacity),
                    cost: Money::from_minor(cost),
                    description: None,
                    location: None,
                    starts_at: None,
                },
            )
            .await
            .expect("operator can create events")
    }
}

pub const fn user(id: i64) -> UserId {
    UserId::new(id)
}
