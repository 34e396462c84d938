//! Engine error types.

use crate::core::{Event, State, TransitionKey};
use crate::hooks::HookError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors raised while building, loading or driving a [`Machine`](super::Machine).
#[derive(Debug, Error)]
pub enum FsmError {
    /// Two or more table entries share a `(from, event)` pair
    #[error("{}", describe_duplicates(.duplicates))]
    DuplicateTransition { duplicates: Vec<TransitionKey> },

    /// No transitions are defined from the current state
    #[error("no transitions defined from state {state}")]
    InvalidTransition { state: State },

    #[error("event {event} is not defined for state {state}")]
    InvalidEvent { state: State, event: Event },

    #[error("transition from state {from} on event {event} denied by guard")]
    TransitionDenied { from: State, event: Event },

    #[error("exit action for state {state} failed: {source}")]
    ExitAction {
        state: State,
        #[source]
        source: HookError,
    },

    #[error("transition callback from state {from} on event {event} failed: {source}")]
    Callback {
        from: State,
        event: Event,
        #[source]
        source: HookError,
    },

    #[error("entry action for state {state} failed: {source}")]
    EntryAction {
        state: State,
        #[source]
        source: HookError,
    },

    #[error("persistence failed for machine '{machine_id}': {source}")]
    Persistence {
        machine_id: String,
        #[source]
        source: StoreError,
    },

    /// Persisting failed and the rollback that followed failed too
    #[error("persisting machine '{machine_id}' failed: {source}; rollback also failed: {rollback}")]
    RollbackFailed {
        machine_id: String,
        #[source]
        source: StoreError,
        rollback: StoreError,
    },

    #[error("failed to load machine '{machine_id}': {source}")]
    LoadFailed {
        machine_id: String,
        #[source]
        source: StoreError,
    },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("machine '{machine_id}' not found")]
    NotFound { machine_id: String },
}

fn describe_duplicates(duplicates: &[TransitionKey]) -> String {
    let describe = |key: &TransitionKey| format!("from state {} for event {}", key.from, key.event);
    match duplicates {
        [single] => format!("duplicate transition defined {}", describe(single)),
        many => {
            let listed: Vec<String> = many.iter().map(describe).collect();
            format!("duplicate transitions defined {}", listed.join(", "))
        }
    }
}

impl FsmError {
    /// Two table entries share a from state and event.
    pub fn is_duplicate_transition(&self) -> bool {
        matches!(self, Self::DuplicateTransition { .. })
    }

    /// The current state has no outgoing transitions.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    /// The event is not defined for the current state.
    pub fn is_invalid_event(&self) -> bool {
        matches!(self, Self::InvalidEvent { .. })
    }

    /// A guard rejected the transition.
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::TransitionDenied { .. })
    }

    /// An entry, exit or callback hook returned an error.
    pub fn is_hook_failure(&self) -> bool {
        matches!(
            self,
            Self::ExitAction { .. } | Self::Callback { .. } | Self::EntryAction { .. }
        )
    }

    /// Any failure of the store, during load or during a transition.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Persistence { .. } | Self::RollbackFailed { .. } | Self::LoadFailed { .. }
        )
    }

    /// The store rollback failed after a persistence error.
    pub fn is_rollback_failure(&self) -> bool {
        matches!(self, Self::RollbackFailed { .. })
    }

    /// A required argument or collaborator was missing.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }

    /// No persisted record exists for the machine id.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The underlying store error, for persistence failures.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Persistence { source, .. }
            | Self::RollbackFailed { source, .. }
            | Self::LoadFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The store error raised by the rollback itself, if it failed.
    pub fn rollback_error(&self) -> Option<&StoreError> {
        match self {
            Self::RollbackFailed { rollback, .. } => Some(rollback),
            _ => None,
        }
    }
}
