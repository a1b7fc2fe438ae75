//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use netsaga_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion = Box<dyn FnOnce(&[Effect])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```
/// use netsaga_core::aggregate::{Aggregate, AggregateStatus};
/// use netsaga_core::saga::{NetworkSaga, SagaAction};
/// use netsaga_testing::{ReducerTest, assertions, fixtures};
///
/// ReducerTest::new(NetworkSaga)
///     .with_env(fixtures::create_subjects())
///     .given_state(Aggregate::new("svc-1", vec![]))
///     .when_action(SagaAction::Submit)
///     .then_state(|state| {
///         assert_eq!(state.status, AggregateStatus::Completed);
///     })
///     .then_effects(|effects| {
///         assertions::assert_published(effects, &["networks.create.done"]);
///     })
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Apply an action before the one under test (Given)
    ///
    /// Effects of these actions are discarded.
    #[must_use]
    pub fn given_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Set the action to test (When)
    ///
    /// Effect assertions see only the effects of this action.
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(!self.actions.is_empty(), "Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let mut effects = Vec::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env);
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use netsaga_core::effect::{Effect, OutboundEvent};

    /// Subjects published by `effects`, flattened in order.
    #[must_use]
    pub fn published_subjects(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .flat_map(Effect::publications)
            .map(|(subject, _)| subject.to_string())
            .collect()
    }

    /// Names of the items provisioned by `effects`, in order.
    #[must_use]
    pub fn provisioned_items(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .flat_map(Effect::publications)
            .filter_map(|(_, event)| match event {
                OutboundEvent::Provision(event) => Some(event.network_name.clone()),
                OutboundEvent::Aggregate(_) => None,
            })
            .collect()
    }

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if any effect publishes something.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects(effects: &[Effect]) {
        assert!(
            published_subjects(effects).is_empty(),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count(effects: &[Effect], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert the exact subjects published, in order
    ///
    /// # Panics
    ///
    /// Panics if the published subjects differ.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_published(effects: &[Effect], expected: &[&str]) {
        assert_eq!(published_subjects(effects), expected, "Unexpected published subjects");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use netsaga_core::aggregate::{AggregateStatus, ItemStatus, Resolution};
    use netsaga_core::saga::{NetworkSaga, SagaAction};

    #[test]
    fn sequential_aggregate_advances_one_item_at_a_time() {
        ReducerTest::new(NetworkSaga)
            .with_env(fixtures::create_subjects())
            .given_state(fixtures::aggregate("svc-1", 3).sequential())
            .given_action(SagaAction::Submit)
            .when_action(SagaAction::Resolve {
                name: "net-0".to_string(),
                resolution: Resolution::Completed,
            })
            .then_state(|state| {
                assert_eq!(state.status, AggregateStatus::Processing);
                assert_eq!(state.items[1].status, ItemStatus::Processing);
                assert_eq!(state.items[2].status, ItemStatus::Pending);
            })
            .then_effects(|effects| {
                assert_eq!(assertions::provisioned_items(effects), vec!["net-1"]);
            })
            .run();
    }

    #[test]
    fn unknown_item_outcome_has_no_effects() {
        ReducerTest::new(NetworkSaga)
            .with_env(fixtures::create_subjects())
            .given_state(fixtures::aggregate("svc-1", 2))
            .given_action(SagaAction::Submit)
            .when_action(SagaAction::Resolve {
                name: "nope".to_string(),
                resolution: Resolution::Completed,
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
                assertions::assert_effects_count(effects, 0);
            })
            .run();
    }

    #[test]
    fn validation_failure_publishes_request_error() {
        let mut state = fixtures::aggregate("svc-1", 2);
        state.items[0].name.clear();

        ReducerTest::new(NetworkSaga)
            .with_env(fixtures::create_subjects())
            .given_state(state)
            .when_action(SagaAction::Submit)
            .then_state(|state| {
                assert_eq!(state.status, AggregateStatus::Error);
                assert_eq!(state.error_message, "Network name can not be empty");
            })
            .then_effects(|effects| {
                assertions::assert_published(effects, &["networks.create.error"]);
            })
            .run();
    }
}
