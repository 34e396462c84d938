//! The state machine engine.
//!
//! A [`Machine`] owns a validated [`TransitionTable`], a [`HookRegistry`]
//! and its current state. Every transition runs under the machine's write
//! lock in a fixed order:
//!
//! 1. resolve `(current, event)` in the table
//! 2. evaluate the guard, if any
//! 3. run the exit action of the current state
//! 4. run the transition callback
//! 5. move to the target state
//! 6. run the entry action of the target state
//! 7. persist history and state in one store transaction
//!
//! Failures in steps 1-4 leave the state untouched. Failures in steps 6-7
//! revert the state before the error is returned, so the in-memory state
//! always equals the last committed one.

mod error;
mod pending;

pub use error::FsmError;

use crate::core::{Context, Event, History, State, Transition, TransitionKey, TransitionTable};
use crate::hooks::{Action, Args, Guard, HookError, HookRegistry};
use crate::store::{HistoryIter, Store, StoreError};
use pending::{PendingTransition, StateSlot};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

pub(crate) fn check_initial(initial: &State) -> Result<(), FsmError> {
    if initial.is_empty() {
        return Err(FsmError::Precondition(
            "initial state must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub(crate) struct Persistence {
    pub(crate) machine_id: String,
    pub(crate) store: Arc<dyn Store>,
}

#[derive(Debug)]
struct Inner {
    slot: StateSlot,
    hooks: HookRegistry,
}

/// A finite state machine with optional transactional persistence.
///
/// `Machine` is `Send + Sync`; share it with `Arc` or scoped threads.
/// Transitions and hook registration take the write lock, reads of the
/// current state take the read lock. Hooks run while the write lock is held
/// and must not call back into the same machine.
///
/// # Example
///
/// ```rust
/// use statekeep::{Context, Machine, State, Transition};
///
/// let machine = Machine::new(
///     "LOCKED",
///     vec![
///         Transition::new("LOCKED", "COIN", "UNLOCKED"),
///         Transition::new("UNLOCKED", "PUSH", "LOCKED"),
///     ],
/// )
/// .unwrap();
///
/// let ctx = Context::background();
/// assert!(machine.transition(&ctx, &"PUSH".into()).unwrap_err().is_invalid_event());
/// assert_eq!(machine.transition(&ctx, &"COIN".into()).unwrap(), State::from("UNLOCKED"));
/// assert_eq!(machine.current_state(), State::from("UNLOCKED"));
/// ```
pub struct Machine {
    table: TransitionTable,
    persistence: Option<Persistence>,
    inner: RwLock<Inner>,
}

impl Machine {
    /// Build an in-memory machine with no persistence.
    ///
    /// # Errors
    /// - [`FsmError::Precondition`] for an empty initial state or label
    /// - [`FsmError::DuplicateTransition`] if two transitions share a
    ///   `(from, event)` pair
    pub fn new(initial: impl Into<State>, transitions: Vec<Transition>) -> Result<Self, FsmError> {
        let initial = initial.into();
        check_initial(&initial)?;
        let table = TransitionTable::build(transitions)?;
        Ok(Self::assemble(initial, table, None))
    }

    /// Load a machine that must already exist in `store`. Never creates.
    ///
    /// # Errors
    /// - [`FsmError::Precondition`] if `machine_id` is empty
    /// - [`FsmError::DuplicateTransition`] for an invalid table
    /// - [`FsmError::NotFound`] if the store has no record for the id
    /// - [`FsmError::LoadFailed`] for any other store failure
    pub fn load_existing(
        ctx: &Context,
        store: Arc<dyn Store>,
        machine_id: &str,
        transitions: Vec<Transition>,
    ) -> Result<Self, FsmError> {
        if machine_id.is_empty() {
            return Err(FsmError::Precondition(
                "a machine id and a store are required to load an existing machine".to_string(),
            ));
        }
        let table = TransitionTable::build(transitions)?;

        let record = store
            .find_machine(ctx, machine_id)
            .map_err(|source| FsmError::LoadFailed {
                machine_id: machine_id.to_string(),
                source,
            })?
            .ok_or_else(|| FsmError::NotFound {
                machine_id: machine_id.to_string(),
            })?;

        info!(machine_id, state = %record.current_state, "machine loaded");
        let persistence = Persistence {
            machine_id: machine_id.to_string(),
            store,
        };
        let current = record.current_state;
        Ok(Self::assemble(current, table, Some(persistence)))
    }

    /// Load `machine_id` from `store`, creating it in `initial` if absent.
    /// A persisted state always wins over `initial`.
    pub(crate) fn open(
        ctx: &Context,
        initial: State,
        table: TransitionTable,
        persistence: Persistence,
    ) -> Result<Self, FsmError> {
        let Persistence { machine_id, store } = &persistence;
        let load_failed = |source: StoreError| FsmError::LoadFailed {
            machine_id: machine_id.clone(),
            source,
        };

        let current = match store.find_machine(ctx, machine_id).map_err(load_failed)? {
            Some(record) => {
                info!(machine_id = %machine_id, state = %record.current_state, "machine loaded");
                record.current_state
            }
            None => {
                let record = store
                    .create_machine(ctx, machine_id, &initial)
                    .map_err(load_failed)?;
                info!(machine_id = %machine_id, state = %record.current_state, "machine created");
                record.current_state
            }
        };
        Ok(Self::assemble(current, table, Some(persistence)))
    }

    pub(crate) fn assemble(
        current: State,
        table: TransitionTable,
        persistence: Option<Persistence>,
    ) -> Self {
        Self {
            table,
            persistence,
            inner: RwLock::new(Inner {
                slot: StateSlot::new(current),
                hooks: HookRegistry::new(),
            }),
        }
    }

    fn log_id(&self) -> &str {
        self.persistence
            .as_ref()
            .map_or("", |p| p.machine_id.as_str())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let mut guard = poisoned.into_inner();
                match guard.slot.recover() {
                    Some(abandoned) => warn!(
                        machine_id = self.log_id(),
                        abandoned = %abandoned,
                        restored = %guard.slot.current(),
                        "recovered machine lock poisoned mid-transition"
                    ),
                    None => warn!(
                        machine_id = self.log_id(),
                        "recovered poisoned machine lock"
                    ),
                }
                self.inner.clear_poison();
                guard
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        if self.inner.is_poisoned() {
            drop(self.write());
        }
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gate `(from, event)` with `guard`, replacing any previous guard.
    ///
    /// # Errors
    /// Fails with [`FsmError::InvalidTransition`] or
    /// [`FsmError::InvalidEvent`] if the pair is not in the table.
    pub fn register_guard<F>(
        &self,
        from: impl Into<State>,
        event: impl Into<Event>,
        guard: F,
    ) -> Result<(), FsmError>
    where
        F: Fn(&Context, &Args) -> bool + Send + Sync + 'static,
    {
        let (from, event) = (from.into(), event.into());
        self.table.resolve(&from, &event)?;
        debug!(machine_id = self.log_id(), %from, %event, "guard registered");
        let key = TransitionKey::new(&from, &event);
        self.write().hooks.set_guard(key, Guard::new(guard));
        Ok(())
    }

    /// Run `action` alongside the `(from, event)` transition, after the exit
    /// action and before the state changes.
    ///
    /// # Errors
    /// Same as [`register_guard`](Self::register_guard).
    pub fn register_transition_callback<F>(
        &self,
        from: impl Into<State>,
        event: impl Into<Event>,
        action: F,
    ) -> Result<(), FsmError>
    where
        F: Fn(&Context, &Args) -> Result<(), HookError> + Send + Sync + 'static,
    {
        let (from, event) = (from.into(), event.into());
        self.table.resolve(&from, &event)?;
        debug!(machine_id = self.log_id(), %from, %event, "transition callback registered");
        let key = TransitionKey::new(&from, &event);
        self.write().hooks.set_callback(key, Action::new(action));
        Ok(())
    }

    /// Run `action` whenever the machine enters `state`. Any label is
    /// accepted, including terminal states.
    pub fn register_entry_action<F>(&self, state: impl Into<State>, action: F)
    where
        F: Fn(&Context, &Args) -> Result<(), HookError> + Send + Sync + 'static,
    {
        let state = state.into();
        debug!(machine_id = self.log_id(), %state, "entry action registered");
        self.write().hooks.set_entry(state, Action::new(action));
    }

    /// Run `action` whenever the machine leaves `state`.
    pub fn register_exit_action<F>(&self, state: impl Into<State>, action: F)
    where
        F: Fn(&Context, &Args) -> Result<(), HookError> + Send + Sync + 'static,
    {
        let state = state.into();
        debug!(machine_id = self.log_id(), %state, "exit action registered");
        self.write().hooks.set_exit(state, Action::new(action));
    }

    /// Fire `event` with no arguments.
    pub fn transition(&self, ctx: &Context, event: &Event) -> Result<State, FsmError> {
        self.transition_with(ctx, event, &Args::new())
    }

    /// Fire `event`, passing `args` to every hook. Returns the new state.
    pub fn transition_with(
        &self,
        ctx: &Context,
        event: &Event,
        args: &Args,
    ) -> Result<State, FsmError> {
        let machine_id = self.log_id();
        let mut inner = self.write();
        let Inner { slot, hooks } = &mut *inner;
        let from = slot.current().clone();

        let target = match self.table.resolve(&from, event) {
            Ok(target) => target.clone(),
            Err(err) => {
                debug!(machine_id, %from, %event, error = %err, "transition rejected");
                return Err(err);
            }
        };

        if let Some(guard) = hooks.guard(&from, event) {
            if !guard.check(ctx, args) {
                debug!(machine_id, %from, %event, "transition denied by guard");
                return Err(FsmError::TransitionDenied {
                    from,
                    event: event.clone(),
                });
            }
        }

        if let Some(exit) = hooks.exit(&from) {
            debug!(machine_id, state = %from, "running exit action");
            exit.run(ctx, args).map_err(|source| FsmError::ExitAction {
                state: from.clone(),
                source,
            })?;
        }

        if let Some(callback) = hooks.callback(&from, event) {
            debug!(machine_id, %from, %event, "running transition callback");
            callback.run(ctx, args).map_err(|source| FsmError::Callback {
                from: from.clone(),
                event: event.clone(),
                source,
            })?;
        }

        let pending = PendingTransition::apply(slot, target, event.clone());

        if let Some(entry) = hooks.entry(pending.target()) {
            debug!(machine_id, state = %pending.target(), "running entry action");
            if let Err(source) = entry.run(ctx, args) {
                warn!(
                    machine_id,
                    from = %pending.previous(),
                    to = %pending.target(),
                    %event,
                    error = %source,
                    "entry action failed, reverting"
                );
                let state = pending.revert();
                return Err(FsmError::EntryAction { state, source });
            }
        }

        if let Some(persistence) = &self.persistence {
            let store = persistence.store.as_ref();
            if let Err(err) = pending.persist(ctx, store, machine_id) {
                warn!(
                    machine_id,
                    from = %pending.previous(),
                    to = %pending.target(),
                    %event,
                    error = %err,
                    "persisting transition failed, reverting"
                );
                pending.revert();
                return Err(err);
            }
        }

        let to = pending.commit();
        info!(machine_id, %from, %to, %event, "transition committed");
        Ok(to)
    }

    /// Snapshot of the current state.
    pub fn current_state(&self) -> State {
        self.read().slot.current().clone()
    }

    /// Persistence identifier, if the machine is persistent.
    pub fn machine_id(&self) -> Option<&str> {
        self.persistence.as_ref().map(|p| p.machine_id.as_str())
    }

    /// Whether transitions are written to a store.
    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }

    /// The validated transition table.
    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Whether `event` is defined for the current state. Guards are not
    /// evaluated.
    pub fn can_fire(&self, event: &Event) -> bool {
        self.table.contains(self.read().slot.current(), event)
    }

    /// Events defined for the current state, sorted.
    pub fn available_events(&self) -> Vec<Event> {
        let inner = self.read();
        self.table
            .events_from(inner.slot.current())
            .into_iter()
            .cloned()
            .collect()
    }

    fn require_persistence(&self) -> Result<&Persistence, FsmError> {
        self.persistence.as_ref().ok_or_else(|| {
            FsmError::Precondition("history requires a persistent machine".to_string())
        })
    }

    fn history_error(machine_id: &str, source: StoreError) -> FsmError {
        if source.is_not_found() {
            FsmError::NotFound {
                machine_id: machine_id.to_string(),
            }
        } else {
            FsmError::Persistence {
                machine_id: machine_id.to_string(),
                source,
            }
        }
    }

    /// Lazily stream the committed history, oldest first.
    ///
    /// # Errors
    /// Fails with [`FsmError::Precondition`] for a machine without
    /// persistence.
    pub fn history_iter(&self, ctx: &Context) -> Result<HistoryIter<'_>, FsmError> {
        let Persistence { machine_id, store } = self.require_persistence()?;
        store
            .query_history(ctx, machine_id)
            .map_err(|source| Self::history_error(machine_id, source))
    }

    /// Collect the committed history.
    pub fn history(&self, ctx: &Context) -> Result<History, FsmError> {
        let machine_id = self.log_id();
        self.history_iter(ctx)?
            .map(|record| {
                record.map_err(|e| Self::history_error(machine_id, e))
            })
            .collect()
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("machine_id", &self.machine_id())
            .field("current_state", &self.current_state())
            .field("transitions", &self.table.len())
            .finish()
    }
}
