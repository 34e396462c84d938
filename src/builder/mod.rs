//! Builder API for machine construction.
//!
//! [`MachineBuilder`] collects the initial state, the transition table and
//! the optional persistence settings, then either builds (loading or
//! creating the persisted record) or loads an existing machine. The
//! [`states!`](crate::states) and [`events!`](crate::events) macros declare
//! label constants with minimal boilerplate.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use statekeep::{events, states, Context, MachineBuilder, MemoryStore};
//!
//! states! { LOCKED, UNLOCKED }
//! events! { COIN, PUSH }
//!
//! let store = Arc::new(MemoryStore::new());
//! let ctx = Context::background();
//!
//! let machine = MachineBuilder::new()
//!     .initial(LOCKED)
//!     .transition(LOCKED, COIN, UNLOCKED)
//!     .transition(UNLOCKED, PUSH, LOCKED)
//!     .machine_id("turnstile-1")
//!     .store(store.clone())
//!     .build(&ctx)
//!     .unwrap();
//!
//! machine.transition(&ctx, &COIN).unwrap();
//! assert_eq!(store.history_len("turnstile-1"), 1);
//! ```

pub mod machine;
pub mod macros;

pub use machine::MachineBuilder;
