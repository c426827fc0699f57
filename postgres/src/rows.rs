//! Table rows and their conversion to ledger types.

use chrono::{DateTime, Utc};
use eventdesk_core::ledger::{LedgerError, Version};
use eventdesk_core::types::{
    Capacity, DecisionToken, Deactivation, Event, EventId, Money, Payment, Rating, Receipt,
    Registration, Score, SeatState, UserId, WaitlistEntry,
};
use uuid::Uuid;

pub(crate) const EVENT_COLUMNS: &str = "id, title, capacity, confirmed_count, cost, description, \
     location, active, deactivation_reason, deactivated_at, starts_at, created_at, version";

pub(crate) const REGISTRATION_COLUMNS: &str =
    "user_id, event_id, created_at, state, decision_token, receipt, submitted_at";

fn corrupt(what: impl std::fmt::Display) -> LedgerError {
    LedgerError::Database(format!("Corrupt ledger row: {what}"))
}

fn out_of_range(value: impl std::fmt::Display) -> LedgerError {
    LedgerError::Constraint(format!("{value} does not fit the ledger"))
}

fn to_money(value: i64, column: &str) -> Result<Money, LedgerError> {
    u64::try_from(value)
        .map(Money::from_minor)
        .map_err(|_| corrupt(format_args!("{column} = {value}")))
}

pub(crate) fn to_u32(value: i32, column: &str) -> Result<u32, LedgerError> {
    u32::try_from(value).map_err(|_| corrupt(format_args!("{column} = {value}")))
}

pub(crate) fn to_i32(value: u32) -> Result<i32, LedgerError> {
    i32::try_from(value).map_err(|_| out_of_range(value))
}

pub(crate) fn to_i64(value: u64) -> Result<i64, LedgerError> {
    i64::try_from(value).map_err(|_| out_of_range(value))
}

pub(crate) fn version_from(value: i64) -> Result<Version, LedgerError> {
    u64::try_from(value)
        .map(Version::new)
        .map_err(|_| corrupt(format_args!("version = {value}")))
}

#[derive(sqlx::FromRow)]
pub(crate) struct EventRow {
    id: Uuid,
    title: String,
    capacity: i32,
    confirmed_count: i32,
    cost: i64,
    description: Option<String>,
    location: Option<String>,
    active: bool,
    deactivation_reason: Option<String>,
    deactivated_at: Option<DateTime<Utc>>,
    starts_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    pub(crate) version: i64,
}

impl TryFrom<EventRow> for Event {
    type Error = LedgerError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let deactivation = match (row.deactivation_reason, row.deactivated_at) {
            (Some(reason), Some(at)) => Some(Deactivation { reason, at }),
            _ => None,
        };
        Ok(Self {
            id: EventId::from_uuid(row.id),
            title: row.title,
            capacity: Capacity::from_stored(to_u32(row.capacity, "capacity")?),
            confirmed_count: to_u32(row.confirmed_count, "confirmed_count")?,
            cost: to_money(row.cost, "cost")?,
            description: row.description,
            location: row.location,
            active: row.active,
            deactivation,
            starts_at: row.starts_at,
            created_at: row.created_at,
        })
    }
}

/// Column values encoding a [`SeatState`]
pub(crate) struct SeatColumns<'a> {
    pub state: &'static str,
    pub token: Option<Uuid>,
    pub receipt: Option<&'a str>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a SeatState> for SeatColumns<'a> {
    fn from(state: &'a SeatState) -> Self {
        match state {
            SeatState::Reserved => Self {
                state: "reserved",
                token: None,
                receipt: None,
                submitted_at: None,
            },
            SeatState::AwaitingReview {
                token,
                receipt,
                submitted_at,
            } => Self {
                state: "awaiting_review",
                token: Some(*token.as_uuid()),
                receipt: Some(receipt.0.as_str()),
                submitted_at: Some(*submitted_at),
            },
            SeatState::Confirmed => Self {
                state: "confirmed",
                token: None,
                receipt: None,
                submitted_at: None,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RegistrationRow {
    user_id: i64,
    event_id: Uuid,
    created_at: DateTime<Utc>,
    state: String,
    decision_token: Option<Uuid>,
    receipt: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = LedgerError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        let columns = (row.state.as_str(), row.decision_token, row.receipt, row.submitted_at);
        let state = match columns {
            ("reserved", ..) => SeatState::Reserved,
            ("confirmed", ..) => SeatState::Confirmed,
            ("awaiting_review", Some(token), Some(receipt), Some(submitted_at)) => {
                SeatState::AwaitingReview {
                    token: DecisionToken::from_uuid(token),
                    receipt: Receipt(receipt),
                    submitted_at,
                }
            }
            (other, ..) => return Err(corrupt(format_args!("registration state {other}"))),
        };
        Ok(Self {
            user_id: UserId::new(row.user_id),
            event_id: EventId::from_uuid(row.event_id),
            created_at: row.created_at,
            state,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PaymentRow {
    user_id: i64,
    event_id: Uuid,
    amount: i64,
    confirmed_at: DateTime<Utc>,
    confirmed_by: i64,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = LedgerError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: UserId::new(row.user_id),
            event_id: EventId::from_uuid(row.event_id),
            amount: to_money(row.amount, "amount")?,
            confirmed_at: row.confirmed_at,
            confirmed_by: UserId::new(row.confirmed_by),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct WaitlistRow {
    user_id: i64,
    event_id: Uuid,
    added_at: DateTime<Utc>,
}

impl From<WaitlistRow> for WaitlistEntry {
    fn from(row: WaitlistRow) -> Self {
        Self {
            user_id: UserId::new(row.user_id),
            event_id: EventId::from_uuid(row.event_id),
            added_at: row.added_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RatingRow {
    user_id: i64,
    event_id: Uuid,
    score: i16,
    rated_at: DateTime<Utc>,
}

impl TryFrom<RatingRow> for Rating {
    type Error = LedgerError;

    fn try_from(row: RatingRow) -> Result<Self, Self::Error> {
        let score = u8::try_from(row.score)
            .ok()
            .and_then(Score::new)
            .ok_or_else(|| corrupt(format_args!("score = {}", row.score)))?;
        Ok(Self {
            user_id: UserId::new(row.user_id),
            event_id: EventId::from_uuid(row.event_id),
            score,
            rated_at: row.rated_at,
        })
    }
}
