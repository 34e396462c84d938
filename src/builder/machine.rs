//! Builder for constructing machines.

use crate::core::{Context, Event, State, Transition, TransitionTable};
use crate::machine::{check_initial, FsmError, Machine, Persistence};
use crate::store::Store;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builder for [`Machine`] with a fluent API.
///
/// Persistence is enabled only when both a non-empty machine id and a store
/// are supplied; otherwise the machine lives in memory.
#[derive(Default)]
pub struct MachineBuilder {
    initial: Option<State>,
    transitions: Vec<Transition>,
    machine_id: Option<String>,
    store: Option<Arc<dyn Store>>,
}

impl MachineBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial state (required by [`build`](Self::build)).
    pub fn initial(mut self, state: impl Into<State>) -> Self {
        self.initial = Some(state.into());
        self
    }

    /// Add a single `(from, event) -> to` transition.
    pub fn transition(
        mut self,
        from: impl Into<State>,
        event: impl Into<Event>,
        to: impl Into<State>,
    ) -> Self {
        self.transitions.push(Transition::new(from, event, to));
        self
    }

    /// Add a pre-built transition.
    pub fn add_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Add multiple transitions at once.
    pub fn transitions(mut self, transitions: impl IntoIterator<Item = Transition>) -> Self {
        self.transitions.extend(transitions);
        self
    }

    /// Identifier correlating the machine with its persisted record. An
    /// empty id means no persistence.
    pub fn machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = Some(machine_id.into()).filter(|id| !id.is_empty());
        self
    }

    /// Store holding the machine record and its history.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the machine.
    ///
    /// The transition table is validated before the store is touched. With
    /// persistence configured, an existing record overrides the initial
    /// state; a missing one is created in the initial state.
    ///
    /// # Errors
    /// - [`FsmError::Precondition`] if no initial state was set, or it is
    ///   empty
    /// - [`FsmError::DuplicateTransition`] for an invalid table
    /// - [`FsmError::LoadFailed`] if the store fails, including when a
    ///   concurrent builder created the same id first
    pub fn build(self, ctx: &Context) -> Result<Machine, FsmError> {
        let initial = self.initial.ok_or_else(|| {
            FsmError::Precondition(
                "initial state not specified; call .initial(state) before .build()".to_string(),
            )
        })?;
        check_initial(&initial)?;
        let table = TransitionTable::build(self.transitions)?;

        match (self.machine_id, self.store) {
            (Some(machine_id), Some(store)) => {
                let persistence = Persistence { machine_id, store };
                Machine::open(ctx, initial, table, persistence)
            }
            (machine_id, store) => {
                if machine_id.is_some() || store.is_some() {
                    debug!(
                        has_machine_id = machine_id.is_some(),
                        has_store = store.is_some(),
                        "persistence needs a machine id and a store; building in-memory machine"
                    );
                }
                Ok(Machine::assemble(initial, table, None))
            }
        }
    }

    /// Load an existing machine; never creates. The initial state, if set,
    /// is ignored.
    ///
    /// # Errors
    /// - [`FsmError::Precondition`] without a machine id or a store
    /// - [`FsmError::NotFound`] if no record exists for the id
    /// - see [`Machine::load_existing`]
    pub fn load(self, ctx: &Context) -> Result<Machine, FsmError> {
        match (self.machine_id, self.store) {
            (Some(machine_id), Some(store)) => {
                Machine::load_existing(ctx, store, &machine_id, self.transitions)
            }
            _ => Err(FsmError::Precondition(
                "a machine id and a store are required to load an existing machine".to_string(),
            )),
        }
    }
}

impl fmt::Debug for MachineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineBuilder")
            .field("initial", &self.initial)
            .field("transitions", &self.transitions.len())
            .field("machine_id", &self.machine_id)
            .field("store", &self.store.is_some())
            .finish()
    }
}
