//! Persistence adapter for machine state and transition history.
//!
//! The engine only talks to storage through the [`Store`] and
//! [`StoreTransaction`] traits. A store keeps, per machine id, one durable
//! record holding the current state, plus an append-only list of history
//! records. The state update and the history append for one transition are
//! written inside a single store transaction.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`]: in-process, with fault injection for tests
//! - [`SqliteStore`]: SQLite via `rusqlite` (feature `sqlite`)

mod error;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use error::StoreError;
pub use memory::{FailPoint, MemoryStore};
pub(crate) use memory::Tables;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use crate::core::{Context, HistoryEntry, HistoryRecord, State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Durable mirror of a machine's current state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRecord {
    /// Store-assigned row identifier
    pub id: i64,
    /// Caller-chosen unique machine identifier
    pub machine_id: String,
    pub current_state: State,
}

/// Lazy, finite sequence of history records ordered by sequence number.
///
/// Once exhausted it stays exhausted; query again to re-read.
pub type HistoryIter<'a> = Box<dyn Iterator<Item = Result<HistoryRecord, StoreError>> + Send + 'a>;

/// Storage collaborator consumed by the engine.
///
/// Implementations must make `create_machine` fail with
/// [`StoreError::AlreadyExists`] when the id is taken, and must make the
/// writes of one [`StoreTransaction`] visible atomically on commit.
pub trait Store: Send + Sync {
    /// Look up the record for `machine_id`.
    fn find_machine(
        &self,
        ctx: &Context,
        machine_id: &str,
    ) -> Result<Option<MachineRecord>, StoreError>;

    /// Insert a new record in state `initial`.
    fn create_machine(
        &self,
        ctx: &Context,
        machine_id: &str,
        initial: &State,
    ) -> Result<MachineRecord, StoreError>;

    /// Open a transaction. Dropping it without committing discards its writes.
    fn begin<'a>(&'a self, ctx: &Context) -> Result<Box<dyn StoreTransaction + 'a>, StoreError>;

    /// History of one machine, oldest first. Fails with
    /// [`StoreError::NotFound`] for an unknown id.
    fn query_history<'a>(
        &'a self,
        ctx: &Context,
        machine_id: &str,
    ) -> Result<HistoryIter<'a>, StoreError>;
}

/// A unit of work against a [`Store`].
pub trait StoreTransaction {
    /// Read a machine record, including this transaction's own writes.
    fn find_machine(
        &mut self,
        ctx: &Context,
        machine_id: &str,
    ) -> Result<Option<MachineRecord>, StoreError>;

    /// Stage one history record for `record`'s machine.
    fn append_history(
        &mut self,
        ctx: &Context,
        record: &MachineRecord,
        entry: &HistoryEntry,
    ) -> Result<(), StoreError>;

    /// Stage a new current state for `record`'s machine.
    fn update_state(
        &mut self,
        ctx: &Context,
        record: &MachineRecord,
        new_state: &State,
    ) -> Result<(), StoreError>;

    /// Make every staged write visible at once.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard every staged write.
    fn rollback(&mut self) -> Result<(), StoreError>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn find_machine(
        &self,
        ctx: &Context,
        machine_id: &str,
    ) -> Result<Option<MachineRecord>, StoreError> {
        (**self).find_machine(ctx, machine_id)
    }

    fn create_machine(
        &self,
        ctx: &Context,
        machine_id: &str,
        initial: &State,
    ) -> Result<MachineRecord, StoreError> {
        (**self).create_machine(ctx, machine_id, initial)
    }

    fn begin<'a>(&'a self, ctx: &Context) -> Result<Box<dyn StoreTransaction + 'a>, StoreError> {
        (**self).begin(ctx)
    }

    fn query_history<'a>(
        &'a self,
        ctx: &Context,
        machine_id: &str,
    ) -> Result<HistoryIter<'a>, StoreError> {
        (**self).query_history(ctx, machine_id)
    }
}
