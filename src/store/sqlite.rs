//! SQLite-backed store.
//!
//! Schema:
//! - `state_machines`: one row per machine, unique non-empty `machine_id`
//! - `state_transitions`: append-only history, referencing its machine row

use super::{HistoryIter, MachineRecord, Store, StoreError, StoreTransaction};
use crate::core::{Context, HistoryEntry, HistoryRecord, State};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

const HISTORY_PAGE_SIZE: i64 = 128;

/// Store persisting machines and history in a SQLite database.
///
/// A single connection is shared behind a mutex; a transaction holds the
/// connection until it is committed, rolled back or dropped.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and apply the schema.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database (for tests and demos).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an already open connection, applying the schema first.
    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS state_machines (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            machine_id    TEXT NOT NULL UNIQUE CHECK (machine_id <> ''),
            current_state TEXT NOT NULL CHECK (current_state <> '')
        );

        CREATE TABLE IF NOT EXISTS state_transitions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            machine_ref INTEGER NOT NULL REFERENCES state_machines(id),
            from_state  TEXT NOT NULL,
            to_state    TEXT NOT NULL,
            event       TEXT NOT NULL,
            timestamp   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_state_transitions_machine
            ON state_transitions(machine_ref, id);",
    )
}

fn select_machine(
    conn: &Connection,
    machine_id: &str,
) -> Result<Option<MachineRecord>, StoreError> {
    let record = conn
        .query_row(
            "SELECT id, machine_id, current_state FROM state_machines WHERE machine_id = ?1",
            params![machine_id],
            |row| {
                Ok(MachineRecord {
                    id: row.get(0)?,
                    machine_id: row.get(1)?,
                    current_state: State::from(row.get::<_, String>(2)?),
                })
            },
        )
        .optional()?;
    Ok(record)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl Store for SqliteStore {
    fn find_machine(
        &self,
        ctx: &Context,
        machine_id: &str,
    ) -> Result<Option<MachineRecord>, StoreError> {
        ctx.check()?;
        select_machine(&self.conn(), machine_id)
    }

    fn create_machine(
        &self,
        ctx: &Context,
        machine_id: &str,
        initial: &State,
    ) -> Result<MachineRecord, StoreError> {
        ctx.check()?;
        let conn = self.conn();
        match conn.execute(
            "INSERT INTO state_machines (machine_id, current_state) VALUES (?1, ?2)",
            params![machine_id, initial.as_str()],
        ) {
            Ok(_) => Ok(MachineRecord {
                id: conn.last_insert_rowid(),
                machine_id: machine_id.to_string(),
                current_state: initial.clone(),
            }),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::AlreadyExists(machine_id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn begin<'a>(&'a self, ctx: &Context) -> Result<Box<dyn StoreTransaction + 'a>, StoreError> {
        ctx.check()?;
        let conn = self.conn();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTransaction {
            conn,
            finished: false,
        }))
    }

    fn query_history<'a>(
        &'a self,
        ctx: &Context,
        machine_id: &str,
    ) -> Result<HistoryIter<'a>, StoreError> {
        ctx.check()?;
        let record = select_machine(&self.conn(), machine_id)?
            .ok_or_else(|| StoreError::NotFound(machine_id.to_string()))?;
        Ok(Box::new(SqliteHistoryIter {
            store: self,
            ctx: ctx.clone(),
            machine_ref: record.id,
            machine_id: record.machine_id,
            after: 0,
            buffer: VecDeque::new(),
            done: false,
        }))
    }
}

struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl SqliteTransaction<'_> {
    fn ensure_open(&self, ctx: &Context) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::TransactionFinished);
        }
        ctx.check()?;
        Ok(())
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn find_machine(
        &mut self,
        ctx: &Context,
        machine_id: &str,
    ) -> Result<Option<MachineRecord>, StoreError> {
        self.ensure_open(ctx)?;
        select_machine(&self.conn, machine_id)
    }

    fn append_history(
        &mut self,
        ctx: &Context,
        record: &MachineRecord,
        entry: &HistoryEntry,
    ) -> Result<(), StoreError> {
        self.ensure_open(ctx)?;
        self.conn.execute(
            "INSERT INTO state_transitions (machine_ref, from_state, to_state, event, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                entry.from.as_str(),
                entry.to.as_str(),
                entry.event.as_str(),
                entry.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            ],
        )?;
        Ok(())
    }

    fn update_state(
        &mut self,
        ctx: &Context,
        record: &MachineRecord,
        new_state: &State,
    ) -> Result<(), StoreError> {
        self.ensure_open(ctx)?;
        let changed = self.conn.execute(
            "UPDATE state_machines SET current_state = ?1 WHERE id = ?2",
            params![new_state.as_str(), record.id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(record.machine_id.clone()));
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::TransactionFinished);
        }
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::TransactionFinished);
        }
        self.conn.execute_batch("ROLLBACK")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        debug!("rolling back unfinished sqlite transaction");
        if let Err(err) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %err, "failed to roll back dropped sqlite transaction");
        }
    }
}

struct SqliteHistoryIter<'a> {
    store: &'a SqliteStore,
    ctx: Context,
    machine_ref: i64,
    machine_id: String,
    after: i64,
    buffer: VecDeque<HistoryRecord>,
    done: bool,
}

impl SqliteHistoryIter<'_> {
    fn fetch_page(&mut self) -> Result<(), StoreError> {
        self.ctx.check()?;
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, from_state, to_state, event, timestamp
             FROM state_transitions
             WHERE machine_ref = ?1 AND id > ?2
             ORDER BY id
             LIMIT ?3",
        )?;

        let machine_id = &self.machine_id;
        let rows = stmt.query_map(params![self.machine_ref, self.after, HISTORY_PAGE_SIZE], |row| {
            let raw: String = row.get(4)?;
            Ok(HistoryRecord {
                seq: row.get(0)?,
                machine_id: machine_id.clone(),
                from: State::from(row.get::<_, String>(1)?),
                to: State::from(row.get::<_, String>(2)?),
                event: row.get::<_, String>(3)?.into(),
                timestamp: parse_timestamp(4, &raw)?,
            })
        })?;

        let mut fetched = 0;
        for row in rows {
            let record = row?;
            self.after = record.seq;
            self.buffer.push_back(record);
            fetched += 1;
        }
        if fetched < HISTORY_PAGE_SIZE {
            self.done = true;
        }
        Ok(())
    }
}

impl Iterator for SqliteHistoryIter<'_> {
    type Item = Result<HistoryRecord, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(err) = self.fetch_page() {
                self.done = true;
                self.buffer.clear();
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
