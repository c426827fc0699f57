//! # Eventdesk Testing
//!
//! Testing utilities and helpers for the eventdesk admission engine.
//!
//! This crate provides:
//! - In-memory implementations of the collaborator traits
//!   ([`InMemoryLedger`], [`RecordingNotifier`], [`StaticOperators`])
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - A Given-When-Then harness for reducers ([`ReducerTest`])
//!
//! ## Example
//!
//! ```ignore
//! use eventdesk_testing::{InMemoryLedger, RecordingNotifier, StaticOperators, test_clock};
//!
//! #[tokio::test]
//! async fn test_free_admission() {
//!     let engine = AdmissionEngine::new(
//!         Arc::new(InMemoryLedger::new()),
//!         Arc::new(RecordingNotifier::new()),
//!         Arc::new(StaticOperators::new([operator])),
//!         Arc::new(test_clock()),
//!         EngineConfig::default(),
//!     );
//!     let outcome = engine.request_admission(user, event).await?;
//!     assert!(matches!(outcome, Admission::Accepted { .. }));
//! }
//! ```

use chrono::{DateTime, Utc};
use eventdesk_core::environment::Clock;

pub mod ledger_mocks;
pub mod notifier_mocks;
pub mod reducer_test;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use eventdesk_testing::mocks::FixedClock;
    /// use eventdesk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test tells it to.
    ///
    /// Clones share the same time, so a test can keep one handle and hand
    /// another to the engine.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move forward by `by`
        ///
        /// # Panics
        ///
        /// Panics if the lock was poisoned by a panicking test.
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }
    }

    impl Clock for ManualClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Never in practice; see [`test_epoch`].
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// The instant [`test_clock`] is frozen at
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is a literal.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

// Re-export commonly used items
pub use ledger_mocks::InMemoryLedger;
pub use mocks::{FixedClock, ManualClock, test_clock, test_epoch};
pub use notifier_mocks::{Delivery, Recipient, RecordingNotifier, StaticOperators};
pub use reducer_test::ReducerTest;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn test_manual_clock_shares_time() {
        let clock = ManualClock::new(test_epoch());
        let handle = clock.clone();
        handle.advance(chrono::Duration::hours(2));
        assert_eq!(clock.now(), test_epoch() + chrono::Duration::hours(2));
    }
}
