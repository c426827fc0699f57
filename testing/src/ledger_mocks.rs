//! In-memory ledger for fast, deterministic tests.
//!
//! [`InMemoryLedger`] keeps one [`EventLedger`] per event behind a lock and
//! applies committed ops with the same [`EventLedger::apply`] the reducers
//! use, so its constraint checks match the durable ledger's.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use eventdesk_core::ledger::{
    EventLedger, LedgerError, LedgerFuture, LedgerOp, LedgerStore, Version,
};
use eventdesk_core::types::{DecisionToken, Event, EventId, Registration, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory ledger store.
///
/// Commits are all-or-nothing: ops are applied to a copy of the event's
/// ledger, and the copy replaces the stored one only if every op succeeds.
///
/// # Example
///
/// ```
/// use eventdesk_testing::InMemoryLedger;
/// use eventdesk_core::ledger::LedgerStore;
/// use eventdesk_core::types::{Capacity, Event, Money, NewEvent};
/// use chrono::Utc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let ledger = InMemoryLedger::new();
/// let event = Event::from_request(
///     NewEvent {
///         title: "Lab tour".to_string(),
///         capacity: Capacity::Bounded(10),
///         cost: Money::ZERO,
///         description: None,
///         location: None,
///         starts_at: None,
///     },
///     Utc::now(),
/// );
/// ledger.create_event(event.clone()).await?;
/// assert!(ledger.load(event.id).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    ledgers: Arc<RwLock<HashMap<EventId, EventLedger>>>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryLedger {
    /// Create a new empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot of one event, bypassing the async interface
    #[must_use]
    pub fn snapshot(&self, event_id: EventId) -> Option<EventLedger> {
        self.ledgers.read().unwrap().get(&event_id).cloned()
    }

    /// Number of successful commits across all events
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Simulate a write from another process: bump the version without ops
    pub fn bump_version(&self, event_id: EventId) {
        if let Some(ledger) = self.ledgers.write().unwrap().get_mut(&event_id) {
            ledger.version = ledger.version.next();
        }
    }

    fn commit_sync(
        &self,
        event_id: EventId,
        expected_version: Version,
        ops: &[LedgerOp],
    ) -> Result<Version, LedgerError> {
        let mut ledgers = self.ledgers.write().unwrap();
        let stored = ledgers
            .get_mut(&event_id)
            .ok_or(LedgerError::EventNotFound(event_id))?;

        if stored.version != expected_version {
            return Err(LedgerError::ConcurrencyConflict {
                event_id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        let mut working = stored.clone();
        for op in ops {
            working.apply(op)?;
        }
        working.version = stored.version.next();
        *stored = working;

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(stored.version)
    }
}

impl LedgerStore for InMemoryLedger {
    fn create_event(&self, event: Event) -> LedgerFuture<'_, ()> {
        Box::pin(async move {
            let mut ledgers = self.ledgers.write().unwrap();
            if ledgers.contains_key(&event.id) {
                return Err(LedgerError::Constraint(format!(
                    "event {} already exists",
                    event.id
                )));
            }
            ledgers.insert(event.id, EventLedger::new(event));
            Ok(())
        })
    }

    fn get_event(&self, event_id: EventId) -> LedgerFuture<'_, Option<Event>> {
        Box::pin(async move {
            Ok(self
                .ledgers
                .read()
                .unwrap()
                .get(&event_id)
                .map(|ledger| ledger.event.clone()))
        })
    }

    fn list_active_events(&self) -> LedgerFuture<'_, Vec<Event>> {
        Box::pin(async move {
            let mut events: Vec<Event> = self
                .ledgers
                .read()
                .unwrap()
                .values()
                .filter(|ledger| ledger.event.active)
                .map(|ledger| ledger.event.clone())
                .collect();
            // Unscheduled events sort last
            events.sort_by_key(|event| {
                (event.starts_at.is_none(), event.starts_at, event.created_at)
            });
            Ok(events)
        })
    }

    fn load(&self, event_id: EventId) -> LedgerFuture<'_, Option<EventLedger>> {
        Box::pin(async move { Ok(self.snapshot(event_id)) })
    }

    fn commit(
        &self,
        event_id: EventId,
        expected_version: Version,
        ops: Vec<LedgerOp>,
    ) -> LedgerFuture<'_, Version> {
        Box::pin(async move { self.commit_sync(event_id, expected_version, &ops) })
    }

    fn registrations_for_user(&self, user_id: UserId) -> LedgerFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            let mut registrations: Vec<Registration> = self
                .ledgers
                .read()
                .unwrap()
                .values()
                .filter_map(|ledger| ledger.registration(user_id).cloned())
                .collect();
            registrations.sort_by_key(|registration| registration.created_at);
            Ok(registrations)
        })
    }

    fn locate_decision(&self, token: DecisionToken) -> LedgerFuture<'_, Option<(EventId, UserId)>> {
        Box::pin(async move {
            Ok(self.ledgers.read().unwrap().values().find_map(|ledger| {
                ledger
                    .registration_for_token(token)
                    .map(|registration| (ledger.event.id, registration.user_id))
            }))
        })
    }
}
