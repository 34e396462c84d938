//! Checkpoint and restore for the in-memory store.
//!
//! A [`StoreCheckpoint`] captures every machine record and every committed
//! history record of a [`MemoryStore`], so an in-process store can survive
//! a restart by round-tripping through JSON or a compact binary encoding.
//! Staged (uncommitted) writes and injected faults are not captured.

use crate::core::HistoryRecord;
use crate::store::{MachineRecord, MemoryStore, Tables};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

pub mod error;

pub use error::CheckpointError;

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serializable snapshot of a [`MemoryStore`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreCheckpoint {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: String,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Machine records, ordered by row id
    pub machines: Vec<MachineRecord>,

    /// History of all machines, ordered by sequence number
    pub history: Vec<HistoryRecord>,
}

impl StoreCheckpoint {
    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    /// Deserialize from JSON, rejecting other format versions.
    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_json::from_str(json)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.check_version()?;
        Ok(checkpoint)
    }

    /// Serialize to bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    /// Deserialize from bincode, rejecting other format versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self = bincode::deserialize(bytes)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.check_version()?;
        Ok(checkpoint)
    }

    fn check_version(&self) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        Ok(())
    }

    /// Check internal consistency, reporting every problem found.
    pub fn validate(&self) -> Result<(), CheckpointError> {
        self.check_version()?;

        let mut problems = Vec::new();
        let mut ids = HashSet::new();
        let mut rows = HashSet::new();
        for machine in &self.machines {
            let id = &machine.machine_id;
            if id.is_empty() {
                problems.push(format!("machine row {} has an empty id", machine.id));
            }
            if machine.current_state.is_empty() {
                problems.push(format!("machine '{id}' has an empty state"));
            }
            if !ids.insert(id.as_str()) {
                problems.push(format!("machine '{id}' appears more than once"));
            }
            if !rows.insert(machine.id) {
                problems.push(format!("machine row id {} is reused", machine.id));
            }
        }

        let mut seqs = HashSet::new();
        for record in &self.history {
            if !ids.contains(record.machine_id.as_str()) {
                problems.push(format!(
                    "history record {} references unknown machine '{}'",
                    record.seq, record.machine_id
                ));
            }
            if !seqs.insert(record.seq) {
                problems.push(format!("history sequence {} is reused", record.seq));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CheckpointError::ValidationFailed(problems.join("; ")))
        }
    }
}

impl MemoryStore {
    /// Snapshot all committed machines and history.
    pub fn checkpoint(&self) -> StoreCheckpoint {
        let (mut machines, mut history) = self.with_tables(|tables| {
            let machines: Vec<MachineRecord> = tables.machines.values().cloned().collect();
            let history: Vec<HistoryRecord> = tables.history.values().flatten().cloned().collect();
            (machines, history)
        });
        machines.sort_by_key(|m| m.id);
        history.sort_by_key(|r| r.seq);

        let checkpoint = StoreCheckpoint {
            version: CHECKPOINT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            machines,
            history,
        };
        info!(
            checkpoint_id = %checkpoint.id,
            machines = checkpoint.machines.len(),
            history = checkpoint.history.len(),
            "memory store checkpointed"
        );
        checkpoint
    }

    /// Build a fresh store holding exactly the checkpointed data.
    ///
    /// # Errors
    /// Fails with [`CheckpointError`] if the checkpoint is from another
    /// format version or is internally inconsistent.
    pub fn from_checkpoint(checkpoint: StoreCheckpoint) -> Result<Self, CheckpointError> {
        checkpoint.validate()?;

        let next_machine_id = checkpoint
            .machines
            .iter()
            .map(|m| m.id)
            .max()
            .unwrap_or(0);
        let next_seq = checkpoint.history.iter().map(|r| r.seq).max().unwrap_or(0);

        let mut history: HashMap<String, Vec<HistoryRecord>> = HashMap::new();
        for record in checkpoint.history {
            history
                .entry(record.machine_id.clone())
                .or_default()
                .push(record);
        }
        let machines = checkpoint
            .machines
            .into_iter()
            .map(|m| (m.machine_id.clone(), m))
            .collect();

        info!(checkpoint_id = %checkpoint.id, "memory store restored from checkpoint");
        Ok(Self::from_tables(Tables {
            machines,
            history,
            next_machine_id,
            next_seq,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Context, HistoryEntry, State};
    use crate::store::Store;

    fn populated() -> MemoryStore {
        let store = MemoryStore::new();
        let ctx = Context::background();
        let door = store.create_machine(&ctx, "door", &"closed".into()).unwrap();
        store
            .create_machine(&ctx, "gate", &"LOCKED".into())
            .unwrap();

        let mut tx = store.begin(&ctx).unwrap();
        tx.append_history(
            &ctx,
            &door,
            &HistoryEntry::now("closed".into(), "open".into(), "push".into()),
        )
        .unwrap();
        tx.update_state(&ctx, &door, &"open".into()).unwrap();
        tx.commit().unwrap();
        drop(tx);
        store
    }

    #[test]
    fn json_round_trip_restores_store() {
        let store = populated();
        let checkpoint = store.checkpoint();
        assert_eq!(checkpoint.version, CHECKPOINT_VERSION);
        assert!(uuid::Uuid::parse_str(&checkpoint.id).is_ok());

        let json = checkpoint.to_json().unwrap();
        let decoded = StoreCheckpoint::from_json(&json).unwrap();
        let restored = MemoryStore::from_checkpoint(decoded).unwrap();

        let ctx = Context::background();
        let door = restored.find_machine(&ctx, "door").unwrap().unwrap();
        assert_eq!(door.current_state, State::from("open"));
        assert_eq!(restored.history_len("door"), 1);
        assert_eq!(restored.machine_count(), 2);
    }

    #[test]
    fn binary_round_trip_preserves_records() {
        let checkpoint = populated().checkpoint();
        let bytes = checkpoint.to_bytes().unwrap();
        assert_eq!(StoreCheckpoint::from_bytes(&bytes).unwrap(), checkpoint);
    }

    #[test]
    fn restored_store_continues_numbering() {
        let checkpoint = populated().checkpoint();
        let restored = MemoryStore::from_checkpoint(checkpoint).unwrap();
        let ctx = Context::background();

        let created = restored
            .create_machine(&ctx, "hatch", &"shut".into())
            .unwrap();
        assert_eq!(created.id, 3);

        let door = restored.find_machine(&ctx, "door").unwrap().unwrap();
        let mut tx = restored.begin(&ctx).unwrap();
        tx.append_history(
            &ctx,
            &door,
            &HistoryEntry::now("open".into(), "closed".into(), "pull".into()),
        )
        .unwrap();
        tx.commit().unwrap();
        drop(tx);

        let seqs: Vec<i64> = restored
            .query_history(&ctx, "door")
            .unwrap()
            .map(|r| r.unwrap().seq)
            .collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut checkpoint = populated().checkpoint();
        checkpoint.version = 99;
        let json = serde_json::to_string(&checkpoint).unwrap();

        let err = StoreCheckpoint::from_json(&json).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::UnsupportedVersion {
                found: 99,
                supported: CHECKPOINT_VERSION
            }
        ));
    }

    #[test]
    fn history_for_unknown_machine_is_rejected() {
        let mut checkpoint = populated().checkpoint();
        checkpoint.machines.retain(|m| m.machine_id != "door");

        let err = MemoryStore::from_checkpoint(checkpoint).err().unwrap();
        match err {
            CheckpointError::ValidationFailed(msg) => {
                assert!(msg.contains("unknown machine 'door'"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_state_is_rejected() {
        let mut checkpoint = populated().checkpoint();
        checkpoint.machines[0].current_state = "".into();

        let err = checkpoint.validate().unwrap_err();
        assert!(err.to_string().contains("has an empty state"));
    }

    #[test]
    fn garbage_input_fails_to_deserialize() {
        assert!(matches!(
            StoreCheckpoint::from_json("{ not json"),
            Err(CheckpointError::DeserializationFailed(_))
        ));
        assert!(matches!(
            StoreCheckpoint::from_bytes(&[0xff, 0x01]),
            Err(CheckpointError::DeserializationFailed(_))
        ));
    }
}
