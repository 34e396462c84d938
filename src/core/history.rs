//! Transition history records.
//!
//! History is an append-only audit trail: one record per committed
//! transition, ordered by the sequence number the store assigns.

use super::label::{Event, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A transition about to be appended to a machine's history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub from: State,
    pub to: State,
    pub event: Event,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// An entry stamped with the current time.
    pub fn now(from: State, to: State, event: Event) -> Self {
        Self {
            from,
            to,
            event,
            timestamp: Utc::now(),
        }
    }
}

/// Record of a single committed transition, as read back from a store.
///
/// Records are immutable facts. The engine only ever appends them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Store-assigned sequence number, increasing in append order
    pub seq: i64,
    /// Identifier of the machine the transition belongs to
    pub machine_id: String,
    /// The state being transitioned from
    pub from: State,
    /// The state being transitioned to
    pub to: State,
    /// The event that caused the transition
    pub event: Event,
    /// When the transition was committed
    pub timestamp: DateTime<Utc>,
}

/// Ordered history of a machine's committed transitions.
///
/// # Example
///
/// ```rust
/// use statekeep::{History, HistoryRecord};
/// use chrono::Utc;
///
/// let history: History = vec![
///     HistoryRecord {
///         seq: 1,
///         machine_id: "turnstile-01".into(),
///         from: "LOCKED".into(),
///         to: "UNLOCKED".into(),
///         event: "COIN".into(),
///         timestamp: Utc::now(),
///     },
///     HistoryRecord {
///         seq: 2,
///         machine_id: "turnstile-01".into(),
///         from: "UNLOCKED".into(),
///         to: "LOCKED".into(),
///         event: "PUSH".into(),
///         timestamp: Utc::now(),
///     },
/// ]
/// .into_iter()
/// .collect();
///
/// let path: Vec<&str> = history.path().iter().map(|s| s.as_str()).collect();
/// assert_eq!(path, vec!["LOCKED", "UNLOCKED", "LOCKED"]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    records: Vec<HistoryRecord>,
}

impl History {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the path of states traversed.
    ///
    /// Returns the `from` state of the first record, then the `to` state of
    /// every record in order.
    pub fn path(&self) -> Vec<&State> {
        let mut path = Vec::with_capacity(self.records.len() + 1);
        if let Some(first) = self.records.first() {
            path.push(&first.from);
        }
        for record in &self.records {
            path.push(&record.to);
        }
        path
    }

    /// Time between the first and last record, `None` when empty.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.records.first()?, self.records.last()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    /// Records in sequence order.
    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    /// Most recent record.
    pub fn last(&self) -> Option<&HistoryRecord> {
        self.records.last()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no transitions were recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<HistoryRecord> for History {
    fn from_iter<I: IntoIterator<Item = HistoryRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for History {
    type Item = HistoryRecord;
    type IntoIter = std::vec::IntoIter<HistoryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
