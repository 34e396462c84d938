//! In-process store with fault injection.

use super::{HistoryIter, MachineRecord, Store, StoreError, StoreTransaction};
use crate::core::{Context, HistoryEntry, HistoryRecord, State};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Store operation that can be made to fail on purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailPoint {
    FindMachine,
    CreateMachine,
    Begin,
    /// `find_machine` inside a transaction
    TxFindMachine,
    AppendHistory,
    UpdateState,
    Commit,
    Rollback,
    QueryHistory,
}

impl fmt::Display for FailPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FindMachine => "find_machine",
            Self::CreateMachine => "create_machine",
            Self::Begin => "begin",
            Self::TxFindMachine => "tx_find_machine",
            Self::AppendHistory => "append_history",
            Self::UpdateState => "update_state",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::QueryHistory => "query_history",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) machines: HashMap<String, MachineRecord>,
    pub(crate) history: HashMap<String, Vec<HistoryRecord>>,
    pub(crate) next_machine_id: i64,
    pub(crate) next_seq: i64,
}

/// Store keeping everything in memory.
///
/// Transactions are serialized by a writer lock and stage their writes
/// until commit, where they are applied in one step. Any operation can be
/// made to fail with [`MemoryStore::inject`], which is how the engine's
/// rollback paths are exercised in tests.
///
/// # Example
///
/// ```rust
/// use statekeep::{Context, FailPoint, MemoryStore, Store};
///
/// let store = MemoryStore::new();
/// let ctx = Context::background();
///
/// store.create_machine(&ctx, "door-1", &"closed".into()).unwrap();
/// assert!(store.create_machine(&ctx, "door-1", &"open".into()).unwrap_err().is_already_exists());
///
/// store.inject(FailPoint::FindMachine);
/// assert!(store.find_machine(&ctx, "door-1").is_err());
/// store.clear_faults();
/// assert!(store.find_machine(&ctx, "door-1").unwrap().is_some());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    writer: Mutex<()>,
    faults: Mutex<HashSet<FailPoint>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn non_empty(state: &State) -> Result<(), StoreError> {
    if state.is_empty() {
        return Err(StoreError::Backend("state must not be empty".to_string()));
    }
    Ok(())
}

impl MemoryStore {
    /// Create an empty store with no faults injected.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_tables(tables: Tables) -> Self {
        Self {
            tables: Mutex::new(tables),
            ..Self::default()
        }
    }

    pub(crate) fn with_tables<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        f(&lock(&self.tables))
    }

    /// Make every call at `point` fail until cleared.
    pub fn inject(&self, point: FailPoint) {
        lock(&self.faults).insert(point);
    }

    /// Stop failing at `point`.
    pub fn clear(&self, point: FailPoint) {
        lock(&self.faults).remove(&point);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        lock(&self.faults).clear();
    }

    /// Number of committed history records for `machine_id`.
    pub fn history_len(&self, machine_id: &str) -> usize {
        lock(&self.tables)
            .history
            .get(machine_id)
            .map_or(0, Vec::len)
    }

    /// Number of machine records.
    pub fn machine_count(&self) -> usize {
        lock(&self.tables).machines.len()
    }

    fn trip(&self, ctx: &Context, point: FailPoint) -> Result<(), StoreError> {
        ctx.check()?;
        if lock(&self.faults).contains(&point) {
            debug!(%point, "memory store: injected failure");
            return Err(StoreError::Backend(format!("injected failure at {point}")));
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn find_machine(
        &self,
        ctx: &Context,
        machine_id: &str,
    ) -> Result<Option<MachineRecord>, StoreError> {
        self.trip(ctx, FailPoint::FindMachine)?;
        Ok(lock(&self.tables).machines.get(machine_id).cloned())
    }

    fn create_machine(
        &self,
        ctx: &Context,
        machine_id: &str,
        initial: &State,
    ) -> Result<MachineRecord, StoreError> {
        self.trip(ctx, FailPoint::CreateMachine)?;
        if machine_id.is_empty() {
            return Err(StoreError::Backend(
                "machine id must not be empty".to_string(),
            ));
        }
        non_empty(initial)?;

        let mut tables = lock(&self.tables);
        if tables.machines.contains_key(machine_id) {
            return Err(StoreError::AlreadyExists(machine_id.to_string()));
        }
        tables.next_machine_id += 1;
        let record = MachineRecord {
            id: tables.next_machine_id,
            machine_id: machine_id.to_string(),
            current_state: initial.clone(),
        };
        let key = machine_id.to_string();
        tables.machines.insert(key, record.clone());
        Ok(record)
    }

    fn begin<'a>(&'a self, ctx: &Context) -> Result<Box<dyn StoreTransaction + 'a>, StoreError> {
        self.trip(ctx, FailPoint::Begin)?;
        Ok(Box::new(MemoryTransaction {
            store: self,
            _writer: lock(&self.writer),
            staged: Vec::new(),
            finished: false,
        }))
    }

    fn query_history<'a>(
        &'a self,
        ctx: &Context,
        machine_id: &str,
    ) -> Result<HistoryIter<'a>, StoreError> {
        self.trip(ctx, FailPoint::QueryHistory)?;
        if !lock(&self.tables).machines.contains_key(machine_id) {
            return Err(StoreError::NotFound(machine_id.to_string()));
        }
        Ok(Box::new(MemoryHistoryIter {
            store: self,
            ctx: ctx.clone(),
            machine_id: machine_id.to_string(),
            position: 0,
            done: false,
        }))
    }
}

enum Staged {
    Append {
        machine_id: String,
        entry: HistoryEntry,
    },
    Update { machine_id: String, state: State },
}

impl Staged {
    fn machine_id(&self) -> &str {
        match self {
            Self::Append { machine_id, .. } | Self::Update { machine_id, .. } => machine_id,
        }
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    _writer: MutexGuard<'a, ()>,
    staged: Vec<Staged>,
    finished: bool,
}

impl MemoryTransaction<'_> {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::TransactionFinished);
        }
        Ok(())
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn find_machine(
        &mut self,
        ctx: &Context,
        machine_id: &str,
    ) -> Result<Option<MachineRecord>, StoreError> {
        self.ensure_open()?;
        self.store.trip(ctx, FailPoint::TxFindMachine)?;

        let mut record = lock(&self.store.tables).machines.get(machine_id).cloned();
        if let Some(record) = record.as_mut() {
            for staged in &self.staged {
                if let Staged::Update { machine_id: id, state } = staged {
                    if id == machine_id {
                        record.current_state = state.clone();
                    }
                }
            }
        }
        Ok(record)
    }

    fn append_history(
        &mut self,
        ctx: &Context,
        record: &MachineRecord,
        entry: &HistoryEntry,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.store.trip(ctx, FailPoint::AppendHistory)?;
        self.staged.push(Staged::Append {
            machine_id: record.machine_id.clone(),
            entry: entry.clone(),
        });
        Ok(())
    }

    fn update_state(
        &mut self,
        ctx: &Context,
        record: &MachineRecord,
        new_state: &State,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.store.trip(ctx, FailPoint::UpdateState)?;
        non_empty(new_state)?;
        self.staged.push(Staged::Update {
            machine_id: record.machine_id.clone(),
            state: new_state.clone(),
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.store.trip(&Context::background(), FailPoint::Commit)?;

        let mut tables = lock(&self.store.tables);
        if let Some(missing) = self
            .staged
            .iter()
            .find(|s| !tables.machines.contains_key(s.machine_id()))
        {
            return Err(StoreError::NotFound(missing.machine_id().to_string()));
        }

        for staged in self.staged.drain(..) {
            match staged {
                Staged::Append { machine_id, entry } => {
                    tables.next_seq += 1;
                    let record = HistoryRecord {
                        seq: tables.next_seq,
                        machine_id: machine_id.clone(),
                        from: entry.from,
                        to: entry.to,
                        event: entry.event,
                        timestamp: entry.timestamp,
                    };
                    tables.history.entry(machine_id).or_default().push(record);
                }
                Staged::Update { machine_id, state } => {
                    if let Some(record) = tables.machines.get_mut(&machine_id) {
                        record.current_state = state;
                    }
                }
            }
        }
        self.finished = true;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.store.trip(&Context::background(), FailPoint::Rollback)?;
        self.staged.clear();
        self.finished = true;
        Ok(())
    }
}

struct MemoryHistoryIter<'a> {
    store: &'a MemoryStore,
    ctx: Context,
    machine_id: String,
    position: usize,
    done: bool,
}

impl Iterator for MemoryHistoryIter<'_> {
    type Item = Result<HistoryRecord, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(err) = self.ctx.check() {
            self.done = true;
            return Some(Err(err.into()));
        }

        let next = lock(&self.store.tables)
            .history
            .get(&self.machine_id)
            .and_then(|records| records.get(self.position).cloned());
        match next {
            Some(record) => {
                self.position += 1;
                Some(Ok(record))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}
