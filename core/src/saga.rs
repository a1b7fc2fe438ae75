//! The network provisioning saga.
//!
//! [`NetworkSaga`] is the pure decision core shared by request and response
//! processing. It mutates the aggregate and describes what must be published;
//! persistence and publishing are left to the runtime.
//!
//! # Flow
//!
//! ```text
//! networks.create ──► Submit ──► validate ──► schedule ──► network.create (×N)
//!                                    │
//!                                    └─ invalid ──► networks.create.error (0001)
//!
//! network.create.done|error ──► Resolve ──► schedule next ──► network.create
//!                                              │
//!                                              └─ all terminal ──► networks.create.done
//!                                                                  networks.create.error (0002)
//! ```

use crate::aggregate::{Aggregate, AggregateStatus, ErrorCode, PARTIAL_FAILURE_MESSAGE, Resolution};
use crate::codec::ProvisionEvent;
use crate::effect::Effect;
use crate::reducer::Reducer;
use crate::schedule::{Outcome, outcome, schedule};
use crate::subject::Subjects;

/// Inputs of the saga.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SagaAction {
    /// A new aggregate request arrived
    Submit,
    /// The provisioner reported the outcome for one item
    Resolve {
        /// Item name
        name: String,
        /// How provisioning ended
        resolution: Resolution,
    },
}

/// Reducer driving an aggregate from request to terminal notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NetworkSaga;

impl Reducer for NetworkSaga {
    type State = Aggregate;
    type Action = SagaAction;
    type Environment = Subjects;

    fn reduce(&self, state: &mut Aggregate, action: SagaAction, env: &Subjects) -> Vec<Effect> {
        match action {
            SagaAction::Submit => submit(state, env),
            SagaAction::Resolve { name, resolution } => resolve(state, &name, resolution, env),
        }
    }
}

fn submit(state: &mut Aggregate, env: &Subjects) -> Vec<Effect> {
    if state.items.is_empty() || state.status == AggregateStatus::Completed {
        state.complete();
        return vec![Effect::notify(&env.request_done, state)];
    }

    if let Err(error) = state.validate() {
        state.fail(ErrorCode::Validation, error.to_string());
        return vec![Effect::notify(&env.request_error, state)];
    }

    advance(state, env)
}

fn resolve(state: &mut Aggregate, name: &str, resolution: Resolution, env: &Subjects) -> Vec<Effect> {
    if state.is_terminal() {
        tracing::debug!(service = %state.service_id, item = %name, "Aggregate already settled");
        return Vec::new();
    }

    let Some(item) = state.item_mut(name) else {
        tracing::warn!(service = %state.service_id, item = %name, "Outcome for unknown item");
        return Vec::new();
    };

    if !item.resolve(resolution) {
        let status = item.status;
        tracing::debug!(service = %state.service_id, item = %name, %status, "Duplicate item outcome");
        return Vec::new();
    }

    advance(state, env)
}

/// Schedule what can run next, or settle the aggregate when nothing can.
fn advance(state: &mut Aggregate, env: &Subjects) -> Vec<Effect> {
    let picked = schedule(&mut state.items, state.sequential_processing);

    if picked.is_empty() {
        return settle(state, env);
    }

    state.start();
    let provisions: Vec<Effect> = picked
        .into_iter()
        .filter_map(|index| state.items.get(index))
        .map(|item| Effect::provision(&env.provision, ProvisionEvent::from_item(&env.provision, &state.service_id, item)))
        .collect();

    if provisions.len() == 1 {
        provisions
    } else {
        vec![Effect::merge(provisions)]
    }
}

fn settle(state: &mut Aggregate, env: &Subjects) -> Vec<Effect> {
    match outcome(&state.items) {
        None => Vec::new(),
        Some(Outcome::Succeeded) => {
            state.complete();
            vec![Effect::notify(&env.request_done, state)]
        },
        Some(Outcome::Failed) => {
            state.fail(ErrorCode::PartialFailure, PARTIAL_FAILURE_MESSAGE);
            vec![Effect::notify(&env.request_error, state)]
        },
    }
}
