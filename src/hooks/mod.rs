//! Guards and actions attached to states and transitions.
//!
//! Guards gate a transition; actions run on exit from a state, alongside a
//! specific transition, or on entry to a state. Both receive the caller's
//! [`Context`] and an opaque [`Args`] payload.

mod registry;

pub use registry::HookRegistry;

use crate::core::Context;
use std::any::Any;
use std::fmt;

/// Error returned by a failing action.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Opaque, ordered payload passed through to guards and actions.
///
/// # Example
///
/// ```rust
/// use statekeep::Args;
///
/// let args = Args::new().with(25_u32).with("coin-slot-2".to_string());
///
/// assert_eq!(args.get::<u32>(0), Some(&25));
/// assert_eq!(args.get::<String>(1).map(String::as_str), Some("coin-slot-2"));
/// assert_eq!(args.get::<u32>(1), None);
/// ```
#[derive(Default)]
pub struct Args {
    values: Vec<Box<dyn Any + Send + Sync>>,
}

impl Args {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` and return the payload.
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.values.push(Box::new(value));
        self
    }

    /// Append `value` in place.
    pub fn push<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.push(Box::new(value));
    }

    /// The value at `index`, if present and of type `T`.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.values.get(index).and_then(|v| v.downcast_ref::<T>())
    }

    /// The first value of type `T`, wherever it sits.
    pub fn find<T: Any>(&self) -> Option<&T> {
        self.values.iter().find_map(|v| v.downcast_ref::<T>())
    }

    /// Number of values carried.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no values are carried.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args").field("len", &self.values.len()).finish()
    }
}

/// Predicate that decides whether a transition may proceed.
///
/// Guards should be free of side effects. A guard returning `false` denies
/// the transition before any action runs.
pub struct Guard {
    predicate: Box<dyn Fn(&Context, &Args) -> bool + Send + Sync>,
}

impl Guard {
    /// Wrap a predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Context, &Args) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
        }
    }

    /// Evaluate the predicate.
    pub fn check(&self, ctx: &Context, args: &Args) -> bool {
        (self.predicate)(ctx, args)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard")
    }
}

/// Side-effecting hook that may fail.
///
/// Used in three roles: entry (per state), exit (per state), and
/// transition callback (per `(from, event)`).
pub struct Action {
    run: Box<dyn Fn(&Context, &Args) -> Result<(), HookError> + Send + Sync>,
}

impl Action {
    /// Wrap a fallible hook.
    pub fn new<F>(action: F) -> Self
    where
        F: Fn(&Context, &Args) -> Result<(), HookError> + Send + Sync + 'static,
    {
        Self {
            run: Box::new(action),
        }
    }

    /// Run the hook.
    pub fn run(&self, ctx: &Context, args: &Args) -> Result<(), HookError> {
        (self.run)(ctx, args)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Action")
    }
}
