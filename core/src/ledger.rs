//! Ledger store trait and the per-event ledger snapshot.
//!
//! The ledger owns every durable row the admission engine cares about: events,
//! registrations, payments, waitlist entries and ratings. It exposes a narrow
//! transactional interface:
//!
//! - [`LedgerStore::load`] returns an [`EventLedger`], the complete
//!   `(event, registrations, payments, waitlist, ratings)` state of one event
//!   together with its [`Version`]
//! - [`LedgerStore::commit`] applies a batch of [`LedgerOp`]s for one event
//!   atomically, guarded by optimistic concurrency on that version
//!
//! Reads such as "count pending reservations" or "pop the oldest waitlist
//! entry" are answered from the snapshot; writes are expressed as ops. The
//! same [`EventLedger::apply`] is used by reducers to keep their working copy
//! current and by the in-memory ledger to persist, so both agree on the
//! semantics of every op.
//!
//! # Implementations
//!
//! - `PostgresLedger` (in `eventdesk-postgres`): durable storage
//! - `InMemoryLedger` (in `eventdesk-testing`): fast, deterministic tests

use crate::types::{
    Capacity, DecisionToken, Deactivation, Event, EventId, Payment, Rating, Registration,
    SeatState, UserId, WaitlistEntry,
};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`LedgerStore`] methods.
pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

/// Monotonic write counter of one event's ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    /// Create a version from its raw value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The version after one more commit
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Optimistic concurrency conflict: another writer committed first.
    #[error(
        "Concurrency conflict on event {event_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// The event whose ledger moved
        event_id: EventId,
        /// The version the caller loaded
        expected: Version,
        /// The version found at commit time
        actual: Version,
    },

    /// Event not found in the ledger.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// An op violated a uniqueness or counter constraint.
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// Storage backend failure.
    #[error("Database error: {0}")]
    Database(String),
}

/// One atomic write against an event's ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerOp {
    /// Insert a registration; `(user, event)` must be free
    CreateRegistration(Registration),
    /// Remove a user's registration
    DeleteRegistration {
        /// Holder
        user_id: UserId,
    },
    /// Move a registration to another payment state
    SetSeatState {
        /// Holder
        user_id: UserId,
        /// New state
        state: SeatState,
    },
    /// `confirmed_count += 1`, never past a bounded capacity
    IncrementConfirmed,
    /// `confirmed_count -= 1`, never below zero
    DecrementConfirmed,
    /// Record an operator-confirmed payment
    CreatePayment(Payment),
    /// Remove a user's payment row
    DeletePayment {
        /// Payer
        user_id: UserId,
    },
    /// Append to the waitlist
    AddWaitlistEntry(WaitlistEntry),
    /// Remove a user's waitlist entry (used to pop the head)
    RemoveWaitlistEntry {
        /// Waiting user
        user_id: UserId,
    },
    /// Mark the event inactive
    DeactivateEvent(Deactivation),
    /// Mark the event active again and clear the reason
    ReactivateEvent,
    /// Store a rating
    RecordRating(Rating),
}

/// Complete state of one event as seen inside an atomic unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventLedger {
    /// The event row
    pub event: Event,
    /// Registrations in the order they were created
    pub registrations: Vec<Registration>,
    /// Payments keyed by payer
    pub payments: HashMap<UserId, Payment>,
    /// Waitlist, oldest first
    pub waitlist: VecDeque<WaitlistEntry>,
    /// Ratings keyed by rater
    pub ratings: HashMap<UserId, Rating>,
    /// Version this snapshot was loaded at
    pub version: Version,
}

impl EventLedger {
    /// Fresh ledger for a newly created event
    #[must_use]
    pub fn new(event: Event) -> Self {
        Self {
            event,
            registrations: Vec::new(),
            payments: HashMap::new(),
            waitlist: VecDeque::new(),
            ratings: HashMap::new(),
            version: Version::default(),
        }
    }

    /// The user's registration, if any
    #[must_use]
    pub fn registration(&self, user_id: UserId) -> Option<&Registration> {
        self.registrations.iter().find(|r| r.user_id == user_id)
    }

    /// Whether the user sits on the waitlist
    #[must_use]
    pub fn is_waiting(&self, user_id: UserId) -> bool {
        self.waitlist.iter().any(|w| w.user_id == user_id)
    }

    /// Registrations holding a seat without a confirmed payment
    #[must_use]
    pub fn pending_reservations(&self) -> u32 {
        let pending = self
            .registrations
            .iter()
            .filter(|r| r.state.is_pending())
            .count();
        u32::try_from(pending).unwrap_or(u32::MAX)
    }

    /// Number of live waitlist entries
    #[must_use]
    pub fn waitlist_len(&self) -> u32 {
        u32::try_from(self.waitlist.len()).unwrap_or(u32::MAX)
    }

    /// Number of registrations of any state
    #[must_use]
    pub fn registration_count(&self) -> u32 {
        u32::try_from(self.registrations.len()).unwrap_or(u32::MAX)
    }

    /// Head of the waitlist
    #[must_use]
    pub fn oldest_waiting(&self) -> Option<&WaitlistEntry> {
        self.waitlist.front()
    }

    /// Whether a new reservation fits: `pending < capacity - confirmed`
    #[must_use]
    pub fn has_vacancy(&self) -> bool {
        self.event
            .capacity
            .remaining(self.event.confirmed_count)
            .is_none_or(|remaining| self.pending_reservations() < remaining)
    }

    /// Confirmed registrants in registration order (the roster)
    #[must_use]
    pub fn roster(&self) -> Vec<UserId> {
        self.registrations
            .iter()
            .filter(|r| r.state.is_confirmed())
            .map(|r| r.user_id)
            .collect()
    }

    /// Find the registration bound to a decision token
    #[must_use]
    pub fn registration_for_token(&self, token: DecisionToken) -> Option<&Registration> {
        self.registrations.iter().find(|r| {
            matches!(&r.state, SeatState::AwaitingReview { token: t, .. } if *t == token)
        })
    }

    /// Apply one op, enforcing the ledger's constraints.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Constraint`] when the op would duplicate a
    /// `(user, event)` row, touch a missing row, or move `confirmed_count`
    /// outside `0..=capacity`.
    pub fn apply(&mut self, op: &LedgerOp) -> Result<(), LedgerError> {
        match op {
            LedgerOp::CreateRegistration(registration) => {
                if self.registration(registration.user_id).is_some() {
                    return Err(LedgerError::Constraint(format!(
                        "user {} already registered for event {}",
                        registration.user_id, self.event.id
                    )));
                }
                self.registrations.push(registration.clone());
            }
            LedgerOp::DeleteRegistration { user_id } => {
                let before = self.registrations.len();
                self.registrations.retain(|r| r.user_id != *user_id);
                if self.registrations.len() == before {
                    return Err(missing("registration", *user_id));
                }
            }
            LedgerOp::SetSeatState { user_id, state } => {
                let registration = self
                    .registrations
                    .iter_mut()
                    .find(|r| r.user_id == *user_id)
                    .ok_or_else(|| missing("registration", *user_id))?;
                registration.state = state.clone();
            }
            LedgerOp::IncrementConfirmed => {
                let next = self.event.confirmed_count + 1;
                if let Capacity::Bounded(limit) = self.event.capacity {
                    if next > limit {
                        return Err(LedgerError::Constraint(format!(
                            "confirmed count {next} exceeds capacity {limit} of event {}",
                            self.event.id
                        )));
                    }
                }
                self.event.confirmed_count = next;
            }
            LedgerOp::DecrementConfirmed => {
                self.event.confirmed_count =
                    self.event.confirmed_count.checked_sub(1).ok_or_else(|| {
                        LedgerError::Constraint(format!(
                            "confirmed count of event {} is already zero",
                            self.event.id
                        ))
                    })?;
            }
            LedgerOp::CreatePayment(payment) => {
                if self.payments.contains_key(&payment.user_id) {
                    return Err(LedgerError::Constraint(format!(
                        "payment for user {} already recorded",
                        payment.user_id
                    )));
                }
                self.payments.insert(payment.user_id, payment.clone());
            }
            LedgerOp::DeletePayment { user_id } => {
                self.payments
                    .remove(user_id)
                    .ok_or_else(|| missing("payment", *user_id))?;
            }
            LedgerOp::AddWaitlistEntry(entry) => {
                if self.is_waiting(entry.user_id) {
                    return Err(LedgerError::Constraint(format!(
                        "user {} already on the waitlist",
                        entry.user_id
                    )));
                }
                self.waitlist.push_back(entry.clone());
            }
            LedgerOp::RemoveWaitlistEntry { user_id } => {
                let before = self.waitlist.len();
                self.waitlist.retain(|w| w.user_id != *user_id);
                if self.waitlist.len() == before {
                    return Err(missing("waitlist entry", *user_id));
                }
            }
            LedgerOp::DeactivateEvent(deactivation) => {
                self.event.active = false;
                self.event.deactivation = Some(deactivation.clone());
            }
            LedgerOp::ReactivateEvent => {
                self.event.active = true;
                self.event.deactivation = None;
            }
            LedgerOp::RecordRating(rating) => {
                if self.ratings.contains_key(&rating.user_id) {
                    return Err(LedgerError::Constraint(format!(
                        "user {} already rated event {}",
                        rating.user_id, self.event.id
                    )));
                }
                self.ratings.insert(rating.user_id, rating.clone());
            }
        }
        Ok(())
    }
}

fn missing(what: &str, user_id: UserId) -> LedgerError {
    LedgerError::Constraint(format!("no {what} for user {user_id}"))
}

/// Durable storage for event ledgers.
///
/// # Atomicity
///
/// [`commit`](LedgerStore::commit) must apply all ops or none. The
/// `expected_version` check makes the whole load-decide-commit sequence
/// serializable per event: if anything was committed for the event since the
/// snapshot was loaded, the commit fails with
/// [`LedgerError::ConcurrencyConflict`] and the caller reloads.
///
/// # Dyn Compatibility
///
/// Methods return [`LedgerFuture`] instead of using `async fn` so the engine
/// can hold an `Arc<dyn LedgerStore>`.
pub trait LedgerStore: Send + Sync {
    /// Persist a new event with an empty ledger.
    ///
    /// # Errors
    ///
    /// - `Constraint`: an event with this id exists
    /// - `Database`: storage failure
    fn create_event(&self, event: Event) -> LedgerFuture<'_, ()>;

    /// Fetch one event row.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn get_event(&self, event_id: EventId) -> LedgerFuture<'_, Option<Event>>;

    /// Active events ordered by start time, then creation.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn list_active_events(&self) -> LedgerFuture<'_, Vec<Event>>;

    /// Load the full ledger of one event.
    ///
    /// Returns `None` when the event does not exist.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn load(&self, event_id: EventId) -> LedgerFuture<'_, Option<EventLedger>>;

    /// Apply `ops` atomically and return the new version.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: the ledger moved past `expected_version`
    /// - `EventNotFound`: no such event
    /// - `Constraint`: an op violated a ledger constraint (nothing applied)
    /// - `Database`: storage failure
    fn commit(
        &self,
        event_id: EventId,
        expected_version: Version,
        ops: Vec<LedgerOp>,
    ) -> LedgerFuture<'_, Version>;

    /// All registrations held by a user, across events.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn registrations_for_user(&self, user_id: UserId) -> LedgerFuture<'_, Vec<Registration>>;

    /// Map a decision token back to the reservation it was issued for.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn locate_decision(&self, token: DecisionToken) -> LedgerFuture<'_, Option<(EventId, UserId)>>;
}
