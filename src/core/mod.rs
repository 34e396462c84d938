//! Core state machine types.
//!
//! This module contains the data the engine operates on:
//! - `State` and `Event` labels
//! - The validated transition table
//! - History records
//! - The execution `Context` forwarded to hooks and stores

mod context;
mod history;
mod label;
mod transition;

pub use context::{Context, Interrupted};
pub use history::{History, HistoryEntry, HistoryRecord};
pub use label::{Event, State};
pub use transition::{Transition, TransitionKey, TransitionTable};
