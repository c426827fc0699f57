//! # Eventdesk Engine
//!
//! Admission, payment reservation and waitlist engine for membership events.
//!
//! For a fixed-capacity event the engine decides whether a registration is
//! accepted, turned into a payment reservation, wait-listed or refused, and
//! keeps capacity counters, registrations, payments and the waitlist
//! consistent under concurrent requests.
//!
//! ## Structure
//!
//! - [`reducer`]: the pure rules, one [`reducer::DeskReducer`] per event ledger
//! - [`AdmissionEngine`]: per-event serialization, atomic commits,
//!   notification delivery
//! - [`EngineConfig`]: tunables, loadable from the environment
//! - [`metrics`]: business counters
//!
//! ## Guarantees
//!
//! - A bounded event never confirms more seats than its capacity
//! - At most one registration per member and event
//! - The waitlist is FIFO and never longer than the configured limit
//! - A freed seat is offered to exactly one waiting member
//! - A failed notification never undoes a committed decision

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod reducer;
pub mod retry;

pub use config::EngineConfig;
pub use engine::AdmissionEngine;
pub use error::EngineError;
