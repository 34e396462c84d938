//! Transition definitions and the validated transition table.

use super::label::{Event, State};
use crate::machine::FsmError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::iter;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// A single `(from, event) -> to` edge of the machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: State,
    pub event: Event,
    pub to: State,
}

impl Transition {
    /// Create a `from --event--> to` edge.
    pub fn new(from: impl Into<State>, event: impl Into<Event>, to: impl Into<State>) -> Self {
        Self {
            from: from.into(),
            event: event.into(),
            to: to.into(),
        }
    }

    /// The `(from, event)` pair this edge is looked up by.
    pub fn key(&self) -> TransitionKey {
        TransitionKey::new(self.from.clone(), self.event.clone())
    }

    fn has_empty_label(&self) -> bool {
        self.from.is_empty() || self.event.is_empty() || self.to.is_empty()
    }
}

/// Composite `(from, event)` key used by the table and the hook registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransitionKey {
    pub from: State,
    pub event: Event,
}

impl TransitionKey {
    /// Key for `event` fired from `from`.
    pub fn new(from: impl Into<State>, event: impl Into<Event>) -> Self {
        Self {
            from: from.into(),
            event: event.into(),
        }
    }
}

impl fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --{}-->", self.from, self.event)
    }
}

/// Static `(state, event) -> state` mapping, validated at construction.
///
/// Lookups are two-level: first by the source state, then by event, so the
/// engine can tell an unknown state apart from an unknown event.
#[derive(Clone, Debug, Default)]
pub struct TransitionTable {
    edges: HashMap<State, HashMap<Event, State>>,
    len: usize,
}

impl TransitionTable {
    /// Check every transition, accumulating ALL duplicate `(from, event)`
    /// pairs rather than stopping at the first one.
    pub fn validate(transitions: &[Transition]) -> Validation<(), NonEmptyVec<TransitionKey>> {
        let mut seen = HashSet::with_capacity(transitions.len());
        let checks: Vec<Validation<(), NonEmptyVec<TransitionKey>>> = transitions
            .iter()
            .map(|t| {
                let key = t.key();
                if seen.insert(key.clone()) {
                    Validation::success(())
                } else {
                    Validation::fail(key)
                }
            })
            .collect();

        Validation::all_vec(checks).map(|_| ())
    }

    /// Build the table, failing with [`FsmError::DuplicateTransition`] if
    /// any `(from, event)` pair appears more than once.
    ///
    /// Labels must be non-empty; a transition with an empty state or event
    /// fails with [`FsmError::Precondition`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use statekeep::{Transition, TransitionTable};
    ///
    /// let table = TransitionTable::build(vec![
    ///     Transition::new("LOCKED", "COIN", "UNLOCKED"),
    ///     Transition::new("UNLOCKED", "PUSH", "LOCKED"),
    /// ])
    /// .unwrap();
    ///
    /// let to = table.target(&"LOCKED".into(), &"COIN".into()).unwrap();
    /// assert_eq!(to.as_str(), "UNLOCKED");
    ///
    /// let err = TransitionTable::build(vec![
    ///     Transition::new("LOCKED", "COIN", "UNLOCKED"),
    ///     Transition::new("LOCKED", "COIN", "LOCKED"),
    /// ])
    /// .unwrap_err();
    /// assert!(err.is_duplicate_transition());
    /// ```
    pub fn build(transitions: Vec<Transition>) -> Result<Self, FsmError> {
        if let Some(t) = transitions.iter().find(|t| t.has_empty_label()) {
            let message = format!("empty label in transition '{} {}'", t.key(), t.to);
            return Err(FsmError::Precondition(message));
        }
        if let Validation::Failure(duplicates) = Self::validate(&transitions) {
            return Err(FsmError::DuplicateTransition {
                duplicates: duplicates.into_vec(),
            });
        }

        let len = transitions.len();
        let mut edges: HashMap<State, HashMap<Event, State>> = HashMap::new();
        for Transition { from, event, to } in transitions {
            edges.entry(from).or_default().insert(event, to);
        }
        Ok(Self { edges, len })
    }

    /// All events defined from `from`, mapped to their targets.
    pub fn targets(&self, from: &State) -> Option<&HashMap<Event, State>> {
        self.edges.get(from)
    }

    /// Target of `(from, event)`, if defined.
    pub fn target(&self, from: &State, event: &Event) -> Option<&State> {
        self.edges.get(from).and_then(|events| events.get(event))
    }

    /// Whether `event` is defined from `from`.
    pub fn contains(&self, from: &State, event: &Event) -> bool {
        self.target(from, event).is_some()
    }

    /// Resolve a key the way the engine does, reporting which half is unknown.
    pub(crate) fn resolve(&self, from: &State, event: &Event) -> Result<&State, FsmError> {
        let events = self
            .edges
            .get(from)
            .ok_or_else(|| FsmError::InvalidTransition {
                state: from.clone(),
            })?;
        events.get(event).ok_or_else(|| FsmError::InvalidEvent {
            state: from.clone(),
            event: event.clone(),
        })
    }

    /// Every state named by the table, as a source or a target, sorted.
    pub fn states(&self) -> Vec<&State> {
        let mut states: Vec<&State> = self
            .edges
            .iter()
            .flat_map(|(from, events)| iter::once(from).chain(events.values()))
            .collect();
        states.sort();
        states.dedup();
        states
    }

    /// Events accepted from `state`, sorted. Empty for unknown or terminal states.
    pub fn events_from(&self, state: &State) -> Vec<&Event> {
        let mut events: Vec<&Event> = self
            .edges
            .get(state)
            .map(|events| events.keys().collect())
            .unwrap_or_default();
        events.sort();
        events
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the table has no transitions.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow() -> Vec<Transition> {
        vec![
            Transition::new("idle", "start", "running"),
            Transition::new("running", "pause", "paused"),
            Transition::new("paused", "resume", "running"),
            Transition::new("running", "stop", "stopped"),
            Transition::new("paused", "stop", "stopped"),
        ]
    }

    #[test]
    fn build_indexes_by_state_then_event() {
        let table = TransitionTable::build(workflow()).unwrap();

        assert_eq!(table.len(), 5);
        assert_eq!(
            table.target(&"running".into(), &"pause".into()),
            Some(&State::from("paused"))
        );
        assert_eq!(table.targets(&"paused".into()).map(|t| t.len()), Some(2));
        assert!(table.targets(&"stopped".into()).is_none());
    }

    #[test]
    fn duplicate_pair_is_rejected() {
        let err = TransitionTable::build(vec![
            Transition::new("idle", "start", "running"),
            Transition::new("idle", "start", "paused"),
        ])
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "duplicate transition defined from state idle for event start"
        );
    }

    #[test]
    fn all_duplicates_are_accumulated() {
        let err = TransitionTable::build(vec![
            Transition::new("a", "x", "b"),
            Transition::new("a", "x", "c"),
            Transition::new("b", "y", "c"),
            Transition::new("b", "y", "a"),
            Transition::new("c", "z", "a"),
        ])
        .unwrap_err();

        match err {
            FsmError::DuplicateTransition { duplicates } => {
                assert_eq!(
                    duplicates,
                    vec![TransitionKey::new("a", "x"), TransitionKey::new("b", "y")]
                );
            }
            other => panic!("expected duplicate transition error, got {other:?}"),
        }
    }

    #[test]
    fn same_event_from_different_states_is_not_a_duplicate() {
        let table = TransitionTable::build(vec![
            Transition::new("running", "stop", "stopped"),
            Transition::new("paused", "stop", "stopped"),
        ])
        .unwrap();

        assert_eq!(table.len(), 2);
    }

    #[test]
    fn resolve_distinguishes_unknown_state_from_unknown_event() {
        let table = TransitionTable::build(workflow()).unwrap();

        let err = table.resolve(&"stopped".into(), &"start".into()).unwrap_err();
        assert!(err.is_invalid_transition());

        let err = table.resolve(&"idle".into(), &"pause".into()).unwrap_err();
        assert!(err.is_invalid_event());

        let to = table.resolve(&"idle".into(), &"start".into()).unwrap();
        assert_eq!(to, &State::from("running"));
    }

    #[test]
    fn states_include_terminal_targets() {
        let table = TransitionTable::build(workflow()).unwrap();
        let names: Vec<&str> = table.states().iter().map(|s| s.as_str()).collect();

        assert_eq!(names, vec!["idle", "paused", "running", "stopped"]);
    }

    #[test]
    fn events_from_lists_sorted_events() {
        let table = TransitionTable::build(workflow()).unwrap();
        let events: Vec<&str> = table
            .events_from(&"running".into())
            .iter()
            .map(|e| e.as_str())
            .collect();

        assert_eq!(events, vec!["pause", "stop"]);
        assert!(table.events_from(&"stopped".into()).is_empty());
    }

    #[test]
    fn empty_labels_are_rejected() {
        for transition in [
            Transition::new("", "start", "running"),
            Transition::new("idle", "", "running"),
            Transition::new("idle", "start", ""),
        ] {
            let err = TransitionTable::build(vec![transition]).unwrap_err();
            assert!(err.is_precondition(), "unexpected error: {err}");
        }
    }

    #[test]
    fn empty_table_is_valid() {
        let table = TransitionTable::build(Vec::new()).unwrap();
        assert!(table.is_empty());
        assert!(table.states().is_empty());
    }
}
