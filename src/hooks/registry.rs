//! Per-machine hook tables.

use super::{Action, Guard};
use crate::core::{Event, State, TransitionKey};
use std::collections::HashMap;

/// Guards, entry/exit actions and transition callbacks of one machine.
///
/// Guards and callbacks are keyed by `(from, event)`; entry and exit
/// actions by state. Registering under an existing key replaces the
/// previous hook. Validation against the transition table is done by the
/// machine, not here.
#[derive(Debug, Default)]
pub struct HookRegistry {
    guards: HashMap<TransitionKey, Guard>,
    callbacks: HashMap<TransitionKey, Action>,
    entry: HashMap<State, Action>,
    exit: HashMap<State, Action>,
}

impl HookRegistry {
    /// Create a registry with no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the replaced guard, if any.
    pub fn set_guard(&mut self, key: TransitionKey, guard: Guard) -> Option<Guard> {
        self.guards.insert(key, guard)
    }

    /// Returns the replaced transition callback, if any.
    pub fn set_callback(&mut self, key: TransitionKey, action: Action) -> Option<Action> {
        self.callbacks.insert(key, action)
    }

    /// Returns the replaced entry action, if any.
    pub fn set_entry(&mut self, state: State, action: Action) -> Option<Action> {
        self.entry.insert(state, action)
    }

    /// Returns the replaced exit action, if any.
    pub fn set_exit(&mut self, state: State, action: Action) -> Option<Action> {
        self.exit.insert(state, action)
    }

    /// Guard for `(from, event)`.
    pub fn guard(&self, from: &State, event: &Event) -> Option<&Guard> {
        self.guards.get(&TransitionKey::new(from, event))
    }

    /// Transition callback for `(from, event)`.
    pub fn callback(&self, from: &State, event: &Event) -> Option<&Action> {
        self.callbacks.get(&TransitionKey::new(from, event))
    }

    /// Entry action of `state`.
    pub fn entry(&self, state: &State) -> Option<&Action> {
        self.entry.get(state)
    }

    /// Exit action of `state`.
    pub fn exit(&self, state: &State) -> Option<&Action> {
        self.exit.get(state)
    }

    /// Whether no hook of any kind is registered.
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
            && self.callbacks.is_empty()
            && self.entry.is_empty()
            && self.exit.is_empty()
    }
}
