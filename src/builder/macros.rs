//! Macros for declaring label constants.

/// Declare [`State`](crate::State) constants.
///
/// Each constant's label is its own name unless one is given explicitly.
///
/// # Example
///
/// ```
/// use statekeep::{states, State};
///
/// states! {
///     pub LOCKED,
///     pub UNLOCKED,
///     /// Out of order, awaiting service
///     BROKEN = "out-of-order",
/// }
///
/// assert_eq!(LOCKED, State::from("LOCKED"));
/// assert_eq!(BROKEN.as_str(), "out-of-order");
/// ```
#[macro_export]
macro_rules! states {
    (
        $(
            $(#[$meta:meta])*
            $vis:vis $name:ident $(= $label:literal)?
        ),* $(,)?
    ) => {
        $(
            $(#[$meta])*
            $vis const $name: $crate::State =
                $crate::State::from_static($crate::__label!($name $(= $label)?));
        )*
    };
}

/// Declare [`Event`](crate::Event) constants. Same syntax as [`states!`].
///
/// # Example
///
/// ```
/// use statekeep::{events, Event};
///
/// events! { COIN, PUSH = "push" }
///
/// assert_eq!(COIN, Event::from("COIN"));
/// assert_eq!(PUSH.as_str(), "push");
/// ```
#[macro_export]
macro_rules! events {
    (
        $(
            $(#[$meta:meta])*
            $vis:vis $name:ident $(= $label:literal)?
        ),* $(,)?
    ) => {
        $(
            $(#[$meta])*
            $vis const $name: $crate::Event =
                $crate::Event::from_static($crate::__label!($name $(= $label)?));
        )*
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __label {
    ($name:ident) => {
        stringify!($name)
    };
    ($name:ident = $label:literal) => {
        $label
    };
}

#[cfg(test)]
mod tests {
    use crate::{Event, State};

    states! {
        IDLE,
        RUNNING = "running",
    }

    events! {
        pub(crate) START,
    }

    #[test]
    fn states_macro_uses_name_or_explicit_label() {
        assert_eq!(IDLE, State::from("IDLE"));
        assert_eq!(RUNNING.as_str(), "running");
    }

    #[test]
    fn events_macro_supports_visibility() {
        assert_eq!(START, Event::from("START"));
    }

    #[test]
    fn declared_labels_work_in_const_context() {
        const TERMINAL: [State; 2] = [IDLE, RUNNING];
        assert!(TERMINAL.contains(&State::from("running")));
    }
}
