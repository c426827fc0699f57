//! # Eventdesk Core
//!
//! Domain types and collaborator traits for the eventdesk admission engine.
//!
//! This crate holds everything the engine, the ledgers and the test doubles
//! agree on:
//!
//! - **Types**: events, registrations, payments, waitlist entries, ratings and
//!   the decision results returned to callers ([`types`])
//! - **Ledger**: the per-event snapshot, the atomic write ops and the
//!   [`ledger::LedgerStore`] trait ([`ledger`])
//! - **Notifier**: typed outbound messages plus the [`notifier::Notifier`] and
//!   [`notifier::OperatorDirectory`] collaborator traits ([`notifier`])
//! - **Reducer**: pure decision functions over a ledger snapshot ([`reducer`],
//!   [`effect`])
//! - **Environment**: injected clock ([`environment`])
//!
//! ## Architecture Principles
//!
//! - Functional core, imperative shell: reducers decide, the engine performs
//! - Explicit effects: ledger writes and notifications are values
//! - Dependency injection via traits

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ledger;
pub mod notifier;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - the core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → Result<(Output, Effects), Error>`.
/// They contain all admission rules and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Effects produced by one reduction
    pub type Effects<A> = SmallVec<[Effect<A>; 4]>;

    /// What a successful reduction returns: the caller-facing result plus the
    /// effects the runtime must perform.
    #[derive(Debug)]
    pub struct Reduction<A, O> {
        /// Result handed back to the caller
        pub output: O,
        /// Ledger writes, notifications and follow-up actions
        pub effects: Effects<A>,
    }

    impl<A, O> Reduction<A, O> {
        /// A reduction with the given output and effects
        #[must_use]
        pub const fn new(output: O, effects: Effects<A>) -> Self {
            Self { output, effects }
        }
    }

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    /// - `Output`: What the caller receives
    /// - `Error`: Hard failures that must leave the ledger untouched
    ///
    /// # Contract
    ///
    /// A reducer that returns `Err` must not have changed anything the runtime
    /// will persist. A reducer that returns `Ok` has already applied its
    /// ledger ops to `state`, so follow-up actions see the updated snapshot.
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Caller-facing result
        type Output;

        /// Hard failure type
        type Error;

        /// Reduce an action into state changes and effects
        ///
        /// # Errors
        ///
        /// Returns `Self::Error` when the action is not allowed in the current
        /// state; nothing is committed in that case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<Reduction<Self::Action, Self::Output>, Self::Error>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe work for the runtime. They are values, not execution:
/// ledger writes are committed together in one atomic unit, notifications are
/// delivered after the commit, and dispatched actions are fed back into the
/// reducer inside the same unit.
pub mod effect {
    use crate::ledger::LedgerOp;
    use crate::notifier::{Message, OperatorAction};
    use crate::types::UserId;

    /// Outbound notification description
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Notification {
        /// Direct message to a user
        User {
            /// Recipient
            user_id: UserId,
            /// Content
            message: Message,
        },
        /// Post to the operator channel
        Operators(Message),
        /// Post to the operator channel with decision buttons
        OperatorsWithActions {
            /// Content
            message: Message,
            /// Buttons
            actions: Vec<OperatorAction>,
        },
    }

    /// Effect type - describes a side effect to be executed
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Effect<Action> {
        /// Ledger write, committed atomically with the rest of the unit
        Write(LedgerOp),
        /// Notification, delivered best-effort after commit
        Notify(Notification),
        /// Follow-up action reduced in the same atomic unit
        Dispatch(Action),
    }

    impl<Action> Effect<Action> {
        /// Direct message to a user
        #[must_use]
        pub const fn notify_user(user_id: UserId, message: crate::notifier::Message) -> Self {
            Self::Notify(Notification::User { user_id, message })
        }

        /// Post to the operator channel
        #[must_use]
        pub const fn notify_operators(message: crate::notifier::Message) -> Self {
            Self::Notify(Notification::Operators(message))
        }
    }
}

/// Environment module - Dependency injection traits
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use eventdesk_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
