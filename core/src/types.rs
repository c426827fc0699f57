//! Domain types for event admission.
//!
//! Value objects, entities and decision results shared by the ledger, the
//! engine and the collaborators. Everything here is plain data: no I/O and no
//! clocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a member (the messenger account id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    /// Wrap a raw account id
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw account id
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque server-side handle for a reservation under operator review.
///
/// Operators never see user or event ids in their action payloads, only this
/// token. The ledger maps it back to the reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionToken(Uuid);

impl DecisionToken {
    /// Creates a new random token
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a token from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DecisionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DecisionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money and capacity
// ============================================================================

/// Amount in minor currency units. Zero means the event is free.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Free of charge
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor(units: u64) -> Self {
        Self(units)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seat capacity of an event.
///
/// Stored as an integer where `0` means unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capacity {
    /// No seat limit; never auto-deactivates
    Unlimited,
    /// At most this many confirmed seats
    Bounded(u32),
}

impl Capacity {
    /// Interpret the stored integer form (`0` = unlimited)
    #[must_use]
    pub const fn from_stored(value: u32) -> Self {
        if value == 0 {
            Self::Unlimited
        } else {
            Self::Bounded(value)
        }
    }

    /// The stored integer form (`0` = unlimited)
    #[must_use]
    pub const fn to_stored(self) -> u32 {
        match self {
            Self::Unlimited => 0,
            Self::Bounded(n) => n,
        }
    }

    /// Seats still free given `confirmed` seats taken. `None` when unlimited.
    #[must_use]
    pub const fn remaining(self, confirmed: u32) -> Option<u32> {
        match self {
            Self::Unlimited => None,
            Self::Bounded(n) => Some(n.saturating_sub(confirmed)),
        }
    }

    /// Whether `confirmed` seats fill this capacity
    #[must_use]
    pub const fn is_filled_by(self, confirmed: u32) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Bounded(n) => confirmed >= n,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Why and when an event stopped accepting registrations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deactivation {
    /// Operator-supplied reason, or [`Deactivation::CAPACITY_FILLED`]
    pub reason: String,
    /// When the event was deactivated
    pub at: DateTime<Utc>,
}

impl Deactivation {
    /// Reason recorded by the automatic trigger
    pub const CAPACITY_FILLED: &'static str = "capacity filled";
}

/// An event members can register for
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Display title
    pub title: String,
    /// Seat limit
    pub capacity: Capacity,
    /// Seats backed by a free or paid-confirmed registration
    pub confirmed_count: u32,
    /// Price per seat
    pub cost: Money,
    /// Free-form description shown in the catalogue
    pub description: Option<String>,
    /// Where the event takes place
    pub location: Option<String>,
    /// Whether new registrations are admitted
    pub active: bool,
    /// Set while the event is inactive
    pub deactivation: Option<Deactivation>,
    /// When the event begins, if scheduled
    pub starts_at: Option<DateTime<Utc>>,
    /// When the event was created
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Build an active event from an operator request
    #[must_use]
    pub fn from_request(request: NewEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            title: request.title,
            capacity: request.capacity,
            confirmed_count: 0,
            cost: request.cost,
            description: request.description,
            location: request.location,
            active: true,
            deactivation: None,
            starts_at: request.starts_at,
            created_at,
        }
    }

    /// Whether registration requires an operator-confirmed payment
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        !self.cost.is_zero()
    }

    /// Whether an operator closed the event by hand.
    ///
    /// Seats freed on such an event stay free until it is reactivated.
    #[must_use]
    pub fn is_closed_by_operator(&self) -> bool {
        self.deactivation
            .as_ref()
            .is_some_and(|d| d.reason != Deactivation::CAPACITY_FILLED)
    }

    /// Whether the event has begun at `now`
    #[must_use]
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.is_some_and(|start| start <= now)
    }
}

/// Operator request to create an event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Display title
    pub title: String,
    /// Seat limit
    pub capacity: Capacity,
    /// Price per seat (zero for free events)
    pub cost: Money,
    /// Free-form description
    pub description: Option<String>,
    /// Venue
    pub location: Option<String>,
    /// When the event begins
    pub starts_at: Option<DateTime<Utc>>,
}

/// Opaque reference to an uploaded payment receipt (file id in the messenger)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt(pub String);

/// Where a seat stands in the payment lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeatState {
    /// Paid seat held, no receipt yet
    Reserved,
    /// Receipt forwarded to operators, waiting for a decision
    AwaitingReview {
        /// Token bound to the operator's action buttons
        token: DecisionToken,
        /// The submitted receipt
        receipt: Receipt,
        /// When the receipt arrived
        submitted_at: DateTime<Utc>,
    },
    /// Free seat, or paid seat with a recorded payment
    Confirmed,
}

impl SeatState {
    /// Whether this seat counts towards `confirmed_count`
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }

    /// Whether this seat is a pending reservation (held but unpaid)
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        !self.is_confirmed()
    }
}

/// A user's seat at an event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Holder
    pub user_id: UserId,
    /// Event
    pub event_id: EventId,
    /// When the seat was taken
    pub created_at: DateTime<Utc>,
    /// Payment lifecycle state
    pub state: SeatState,
}

/// Operator-confirmed payment for a seat
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Payer
    pub user_id: UserId,
    /// Event
    pub event_id: EventId,
    /// Amount received
    pub amount: Money,
    /// When the operator confirmed it
    pub confirmed_at: DateTime<Utc>,
    /// Operator who confirmed it
    pub confirmed_by: UserId,
}

/// A user waiting for a seat to free up
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Waiting user
    pub user_id: UserId,
    /// Event
    pub event_id: EventId,
    /// When the user joined the waitlist (FIFO key)
    pub added_at: DateTime<Utc>,
}

/// Rating score, always within `1..=5`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Score(u8);

impl Score {
    /// Lowest accepted score
    pub const MIN: u8 = 1;
    /// Highest accepted score
    pub const MAX: u8 = 5;

    /// Validate a raw score
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if value >= Self::MIN && value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    /// The raw score
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }
}

/// A post-event rating
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    /// Rater
    pub user_id: UserId,
    /// Event
    pub event_id: EventId,
    /// Score
    pub score: Score,
    /// When the rating was given
    pub rated_at: DateTime<Utc>,
}

// ============================================================================
// Decisions
// ============================================================================

/// Operator verdict on a submitted receipt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentDecision {
    /// Payment verified
    Confirm,
    /// Receipt could not be verified; the seat is released
    Unclear,
    /// Reservation cancelled by the operator; the seat is released
    Cancel,
}

impl PaymentDecision {
    /// All decisions offered to operators, in button order
    pub const ALL: [Self; 3] = [Self::Confirm, Self::Unclear, Self::Cancel];
}

/// Why a request was turned down. These are business results, not faults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Event does not exist or is inactive
    EventUnavailable,
    /// User already holds a seat or a waitlist entry
    AlreadyRegistered,
    /// Free event has no seats left
    Full,
    /// Paid event has no seats and the waitlist is at its limit
    CapacityAndWaitlistFull,
    /// Cancellation requested but the user holds nothing
    NotRegistered,
    /// Confirmed seat can no longer be cancelled
    EventStarted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EventUnavailable => "event not found/inactive",
            Self::AlreadyRegistered => "already registered",
            Self::Full => "full",
            Self::CapacityAndWaitlistFull => "capacity and waitlist full",
            Self::NotRegistered => "not registered",
            Self::EventStarted => "event already started",
        };
        f.write_str(text)
    }
}

/// Result of an admission request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    /// Free seat taken
    Accepted {
        /// Display order number (registrations after insert)
        order: u32,
    },
    /// Paid seat held until an operator confirms the payment
    ReservedPendingPayment {
        /// Amount to pay
        amount: Money,
        /// Display order number (registrations after insert)
        order: u32,
    },
    /// Added to the waitlist
    Waitlisted {
        /// 1-based position in the queue
        position: u32,
    },
    /// Turned down
    Rejected(RejectReason),
}

/// Result of a user cancellation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cancellation {
    /// Unpaid reservation released
    ReservationReleased,
    /// Confirmed seat given back
    SeatReleased,
    /// Waitlist entry removed
    LeftWaitlist,
    /// Turned down
    Rejected(RejectReason),
}

/// Why a rating was not recorded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatingRejection {
    /// Ratings open only once the event is deactivated
    EventStillActive,
    /// The rating window has passed
    WindowClosed,
    /// User held no confirmed seat
    NotAttended,
    /// User already rated this event
    AlreadyRated,
}

/// Result of a rating request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatingOutcome {
    /// Rating stored
    Recorded(Score),
    /// Rating refused
    Rejected(RatingRejection),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_zero_means_unlimited() {
        assert_eq!(Capacity::from_stored(0), Capacity::Unlimited);
        assert_eq!(Capacity::from_stored(3), Capacity::Bounded(3));
        assert_eq!(Capacity::Bounded(3).to_stored(), 3);
        assert_eq!(Capacity::Unlimited.remaining(100), None);
        assert_eq!(Capacity::Bounded(3).remaining(1), Some(2));
        assert_eq!(Capacity::Bounded(3).remaining(5), Some(0));
        assert!(Capacity::Bounded(2).is_filled_by(2));
        assert!(!Capacity::Unlimited.is_filled_by(u32::MAX));
    }

    #[test]
    fn score_bounds() {
        assert!(Score::new(0).is_none());
        assert!(Score::new(6).is_none());
        assert_eq!(Score::new(5).map(|s| s.value()), Some(5));
    }

    #[test]
    fn reject_reason_display_matches_operator_wording() {
        assert_eq!(RejectReason::EventUnavailable.to_string(), "event not found/inactive");
        assert_eq!(RejectReason::AlreadyRegistered.to_string(), "already registered");
        assert_eq!(
            RejectReason::CapacityAndWaitlistFull.to_string(),
            "capacity and waitlist full"
        );
    }
}
