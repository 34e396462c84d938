//! Statekeep: a finite state machine engine with transactional persistence
//!
//! A [`Machine`] couples a static transition table and a set of hooks with
//! a durable mirror of its current state. Every successful transition
//! appends one history record and updates the persisted state inside a
//! single store transaction; any failure reverts the in-memory state, so
//! what the caller observes always matches what was committed.
//!
//! # Core Concepts
//!
//! - **Labels**: [`State`] and [`Event`] are opaque, exact-match strings
//! - **Transition table**: `(state, event) -> state`, validated for
//!   duplicates at construction
//! - **Hooks**: guards gate a transition; exit, callback and entry
//!   actions run around it, in that order
//! - **Stores**: the [`Store`] trait, with [`MemoryStore`] and
//!   [`SqliteStore`] implementations
//! - **Context**: cancellation and deadlines forwarded to hooks and stores
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use statekeep::{Context, MachineBuilder, MemoryStore, State};
//!
//! let store = Arc::new(MemoryStore::new());
//! let ctx = Context::background();
//!
//! let machine = MachineBuilder::new()
//!     .initial("LOCKED")
//!     .transition("LOCKED", "COIN", "UNLOCKED")
//!     .transition("UNLOCKED", "PUSH", "LOCKED")
//!     .machine_id("turnstile-1")
//!     .store(store.clone())
//!     .build(&ctx)
//!     .unwrap();
//!
//! machine
//!     .register_guard("LOCKED", "COIN", |_ctx, args| {
//!         args.get::<u32>(0).is_some_and(|cents| *cents >= 25)
//!     })
//!     .unwrap();
//!
//! let err = machine.transition(&ctx, &"COIN".into()).unwrap_err();
//! assert!(err.is_denied());
//!
//! let args = statekeep::Args::new().with(25_u32);
//! machine.transition_with(&ctx, &"COIN".into(), &args).unwrap();
//! assert_eq!(machine.current_state(), State::from("UNLOCKED"));
//!
//! let history = machine.history(&ctx).unwrap();
//! assert_eq!(history.len(), 1);
//! ```

pub mod builder;
pub mod checkpoint;
pub mod core;
pub mod hooks;
pub mod machine;
pub mod store;

// Re-export commonly used types
pub use builder::MachineBuilder;
pub use checkpoint::{CheckpointError, StoreCheckpoint, CHECKPOINT_VERSION};
pub use crate::core::{
    Context, Event, History, HistoryEntry, HistoryRecord, Interrupted, State, Transition,
    TransitionKey, TransitionTable,
};
pub use hooks::{Action, Args, Guard, HookError, HookRegistry};
pub use machine::{FsmError, Machine};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use store::{
    FailPoint, HistoryIter, MachineRecord, MemoryStore, Store, StoreError, StoreTransaction,
};
