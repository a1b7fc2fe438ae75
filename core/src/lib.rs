//! # Netsaga Core
//!
//! Core types, wire codec and the pure saga reducer for the networks
//! coordinator.
//!
//! The coordinator drives a multi-item provisioning operation (creating or
//! deleting a set of networks) to completion by reacting to bus events. This
//! crate holds everything that can be decided without I/O:
//!
//! - **Data model**: [`aggregate::Aggregate`] and its [`aggregate::Item`]s
//! - **Address planning**: netmask, gateway and usable range from a CIDR
//! - **Scheduling**: which items to dispatch next, and when the aggregate is done
//! - **Reducer**: `(Aggregate, SagaAction, Subjects) → Vec<Effect>`
//! - **Seams**: the [`event_bus::EventBus`] and [`kv::KeyValueStore`] traits
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Explicit Effects (no hidden I/O)
//! - Dependency Injection through trait objects
//!
//! ## Example
//!
//! ```
//! use netsaga_core::aggregate::{Aggregate, AggregateStatus, Item};
//! use netsaga_core::reducer::Reducer;
//! use netsaga_core::saga::{NetworkSaga, SagaAction};
//! use netsaga_core::subject::{Operation, ResourceKind, Subjects};
//!
//! let subjects = Subjects::new(&ResourceKind::networks(), Operation::Create);
//! let mut aggregate = Aggregate::new("svc-1", vec![Item::new("web", "dc-1")]);
//!
//! let effects = NetworkSaga.reduce(&mut aggregate, SagaAction::Submit, &subjects);
//!
//! assert_eq!(aggregate.status, AggregateStatus::Processing);
//! assert_eq!(effects.len(), 1);
//! ```

pub mod address;
pub mod aggregate;
pub mod codec;
pub mod event_bus;
pub mod kv;
pub mod saga;
pub mod schedule;
pub mod subject;

pub use serde::{Deserialize, Serialize};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// # Returns
        ///
        /// A vector of effects to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Vec<Effect>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe what the runtime must publish. They are values, not
/// execution: the reducer returns them and the executor runs them after the
/// aggregate has been persisted.
pub mod effect {
    use crate::aggregate::Aggregate;
    use crate::codec::{CodecError, JsonCodec, ProvisionEvent};

    /// Payload of a publish effect.
    #[derive(Clone, Debug, PartialEq)]
    pub enum OutboundEvent {
        /// Instruction to provision one item
        Provision(Box<ProvisionEvent>),
        /// Terminal aggregate notification
        Aggregate(Box<Aggregate>),
    }

    impl OutboundEvent {
        /// Encode the payload to JSON bytes.
        ///
        /// # Errors
        ///
        /// Returns [`CodecError::Encode`] if serialization fails.
        pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
            match self {
                Self::Provision(event) => event.to_json_bytes(),
                Self::Aggregate(aggregate) => aggregate.to_json_bytes(),
            }
        }
    }

    /// Effect type - describes a side effect to be executed
    #[derive(Clone, Debug, PartialEq)]
    pub enum Effect {
        /// No-op effect
        None,

        /// Publish an event on a subject
        Publish {
            /// Destination subject
            subject: String,
            /// Payload
            event: OutboundEvent,
        },

        /// Run effects in parallel
        Parallel(Vec<Effect>),

        /// Run effects sequentially
        Sequential(Vec<Effect>),
    }

    impl Effect {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect>) -> Effect {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect>) -> Effect {
            Effect::Sequential(effects)
        }

        /// Publish a provision event.
        #[must_use]
        pub fn provision(subject: impl Into<String>, event: ProvisionEvent) -> Effect {
            Effect::Publish {
                subject: subject.into(),
                event: OutboundEvent::Provision(Box::new(event)),
            }
        }

        /// Publish a snapshot of the aggregate.
        #[must_use]
        pub fn notify(subject: impl Into<String>, aggregate: &Aggregate) -> Effect {
            Effect::Publish {
                subject: subject.into(),
                event: OutboundEvent::Aggregate(Box::new(aggregate.clone())),
            }
        }

        /// Every publication this effect describes, flattened in order.
        #[must_use]
        pub fn publications(&self) -> Vec<(&str, &OutboundEvent)> {
            match self {
                Effect::None => Vec::new(),
                Effect::Publish { subject, event } => vec![(subject.as_str(), event)],
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.iter().flat_map(Effect::publications).collect()
                },
            }
        }
    }
}
