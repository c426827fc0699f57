//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use eventdesk_core::effect::Effect;
use eventdesk_core::reducer::Reducer;

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for output assertion functions
type OutputAssertion<O> = Box<dyn FnOnce(&O)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Type alias for error assertion functions
type ErrorAssertion<Err> = Box<dyn FnOnce(&Err)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use eventdesk_testing::ReducerTest;
///
/// ReducerTest::new(DeskReducer)
///     .with_env(test_environment())
///     .given_state(paid_event_ledger(1))
///     .when_action(DeskAction::RequestAdmission { user_id })
///     .then_output(|outcome| {
///         assert!(matches!(
///             outcome,
///             DeskOutput::Admission(Admission::ReservedPendingPayment { .. })
///         ));
///     })
///     .then_state(|ledger| {
///         assert_eq!(ledger.pending_reservations(), 1);
///     })
///     .run();
/// ```
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    environment: Option<R::Environment>,
    initial_state: Option<R::State>,
    action: Option<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
    output_assertions: Vec<OutputAssertion<R::Output>>,
    effect_assertions: Vec<EffectAssertion<R::Action>>,
    error_assertions: Vec<ErrorAssertion<R::Error>>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::Error: std::fmt::Debug,
    R::Output: std::fmt::Debug,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            action: None,
            state_assertions: Vec::new(),
            output_assertions: Vec::new(),
            effect_assertions: Vec::new(),
            error_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    ///
    /// State assertions run whether the reduction succeeded or failed, so they
    /// can also check that a failed action left the state untouched.
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the caller-facing output (Then)
    #[must_use]
    pub fn then_output<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::Output) + 'static,
    {
        self.output_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<R::Action>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the reduction to fail and inspect the error (Then)
    #[must_use]
    pub fn then_error<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::Error) + 'static,
    {
        self.error_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set, if the
    /// reduction result does not match the kind of assertions registered, or
    /// if any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        // Execute reducer
        let result = self.reducer.reduce(&mut state, action, &env);

        // Run state assertions
        for assertion in self.state_assertions {
            assertion(&state);
        }

        match result {
            Ok(reduction) => {
                assert!(
                    self.error_assertions.is_empty(),
                    "Expected an error, but the reducer returned {:?}",
                    reduction.output
                );
                for assertion in self.output_assertions {
                    assertion(&reduction.output);
                }
                for assertion in self.effect_assertions {
                    assertion(&reduction.effects);
                }
            }
            Err(error) => {
                assert!(
                    !self.error_assertions.is_empty(),
                    "Reducer failed unexpectedly: {error:?}"
                );
                for assertion in self.error_assertions {
                    assertion(&error);
                }
            }
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use eventdesk_core::effect::{Effect, Notification};
    use eventdesk_core::ledger::LedgerOp;

    /// Ledger writes among the effects, in order
    #[must_use]
    pub fn writes<A>(effects: &[Effect<A>]) -> Vec<&LedgerOp> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Write(op) => Some(op),
                _ => None,
            })
            .collect()
    }

    /// Notifications among the effects, in order
    #[must_use]
    pub fn notifications<A>(effects: &[Effect<A>]) -> Vec<&Notification> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Assert that there are no ledger writes
    ///
    /// # Panics
    ///
    /// Panics if any effect is a ledger write.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_writes<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            writes(effects).is_empty(),
            "Expected no ledger writes, but found: {effects:?}"
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one dispatched follow-up action
    ///
    /// # Panics
    ///
    /// Panics if no `Dispatch` effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_dispatch<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Dispatch(_))),
            "Expected at least one Dispatch effect, but none found"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventdesk_core::reducer::Reduction;
    use eventdesk_core::smallvec;

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Increment,
        Decrement,
    }

    struct TestReducer;

    struct TestEnv;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;
        type Output = i32;
        type Error = String;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Result<Reduction<Self::Action, Self::Output>, Self::Error> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    Ok(Reduction::new(state.count, smallvec![]))
                }
                TestAction::Decrement if state.count == 0 => Err("already zero".to_string()),
                TestAction::Decrement => {
                    state.count -= 1;
                    Ok(Reduction::new(
                        state.count,
                        smallvec![Effect::Dispatch(TestAction::Increment)],
                    ))
                }
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_output(|output| assert_eq!(*output, 1))
            .then_effects(|effects| {
                assertions::assert_no_writes(effects);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_dispatch() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 5 })
            .when_action(TestAction::Decrement)
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_dispatch(effects);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_error() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Decrement)
            .then_state(|state| assert_eq!(state.count, 0))
            .then_error(|error| assert_eq!(error, "already zero"))
            .run();
    }
}
