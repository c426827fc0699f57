//! Engine error taxonomy.
//!
//! Business refusals (duplicate registration, full event, closed waitlist)
//! are values inside [`Admission`](eventdesk_core::types::Admission),
//! [`Cancellation`](eventdesk_core::types::Cancellation) and
//! [`RatingOutcome`](eventdesk_core::types::RatingOutcome). The variants here
//! are hard failures; every one of them leaves the ledger untouched.

use eventdesk_core::ledger::LedgerError;
use eventdesk_core::types::UserId;
use thiserror::Error;

/// Errors returned by [`AdmissionEngine`](crate::AdmissionEngine) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Event, registration or decision token does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request does not fit the current state of the reservation or event
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Caller is not in the operator directory
    #[error("User {0} is not an operator")]
    Unauthorized(UserId),

    /// Malformed request data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Ledger store failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
