//! Speculative state change with an explicit commit or revert.
//!
//! A transition mutates the in-memory state before its entry action runs
//! and before the store has committed. [`PendingTransition`] owns that
//! window: it is created by [`PendingTransition::apply`] and must end in
//! exactly one of [`commit`](PendingTransition::commit) or
//! [`revert`](PendingTransition::revert).

use super::FsmError;
use crate::core::{Context, Event, HistoryEntry, State};
use crate::store::{Store, StoreError, StoreTransaction};
use std::mem;
use tracing::{debug, warn};

/// The machine's current state plus the state to restore while a
/// transition is in flight.
#[derive(Debug)]
pub(crate) struct StateSlot {
    current: State,
    restore: Option<State>,
}

impl StateSlot {
    pub(crate) fn new(current: State) -> Self {
        Self {
            current,
            restore: None,
        }
    }

    pub(crate) fn current(&self) -> &State {
        &self.current
    }

    /// Undo a transition abandoned mid-flight (a hook panicked while the
    /// lock was held). Returns the abandoned target.
    pub(crate) fn recover(&mut self) -> Option<State> {
        let previous = self.restore.take()?;
        Some(mem::replace(&mut self.current, previous))
    }
}

#[must_use = "a pending transition must be committed or reverted"]
pub(crate) struct PendingTransition<'s> {
    slot: &'s mut StateSlot,
    entry: HistoryEntry,
}

impl<'s> PendingTransition<'s> {
    /// Move the slot to `target`, remembering where it was.
    pub(crate) fn apply(slot: &'s mut StateSlot, target: State, event: Event) -> Self {
        let previous = mem::replace(&mut slot.current, target.clone());
        slot.restore = Some(previous.clone());
        Self {
            slot,
            entry: HistoryEntry::now(previous, target, event),
        }
    }

    pub(crate) fn previous(&self) -> &State {
        &self.entry.from
    }

    pub(crate) fn target(&self) -> &State {
        &self.entry.to
    }

    /// Write the history record and the new current state in one store
    /// transaction. On failure the transaction is rolled back; the
    /// in-memory side is left for the caller to revert.
    pub(crate) fn persist(
        &self,
        ctx: &Context,
        store: &dyn Store,
        machine_id: &str,
    ) -> Result<(), FsmError> {
        let mut tx = store.begin(ctx).map_err(|source| FsmError::Persistence {
            machine_id: machine_id.to_string(),
            source,
        })?;

        let written = write(tx.as_mut(), ctx, machine_id, &self.entry)
            .and_then(|()| tx.commit());
        match written {
            Ok(()) => Ok(()),
            Err(source) => Err(roll_back(tx.as_mut(), machine_id, source)),
        }
    }

    pub(crate) fn commit(self) -> State {
        self.slot.restore = None;
        self.slot.current.clone()
    }

    /// Restore the previous state. Returns the abandoned target.
    pub(crate) fn revert(self) -> State {
        match self.slot.recover() {
            Some(abandoned) => abandoned,
            None => self.entry.to,
        }
    }
}

fn write(
    tx: &mut dyn StoreTransaction,
    ctx: &Context,
    machine_id: &str,
    entry: &HistoryEntry,
) -> Result<(), StoreError> {
    let record = tx
        .find_machine(ctx, machine_id)?
        .ok_or_else(|| StoreError::NotFound(machine_id.to_string()))?;
    tx.append_history(ctx, &record, entry)?;
    tx.update_state(ctx, &record, &entry.to)
}

fn roll_back(tx: &mut dyn StoreTransaction, machine_id: &str, source: StoreError) -> FsmError {
    debug!(machine_id, error = %source, "rolling back store transaction");
    match tx.rollback() {
        Ok(()) => FsmError::Persistence {
            machine_id: machine_id.to_string(),
            source,
        },
        Err(rollback) => {
            warn!(machine_id, error = %source, rollback_error = %rollback, "store rollback failed");
            FsmError::RollbackFailed {
                machine_id: machine_id.to_string(),
                source,
                rollback,
            }
        }
    }
}
