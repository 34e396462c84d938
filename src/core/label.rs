//! State and event labels.
//!
//! Labels are opaque, exact-match strings. They can be declared as
//! constants (see the `states!` and `events!` macros) or built at runtime
//! from owned strings, e.g. when a state is read back from a store.

use serde::{Deserialize, Serialize};
use std::borrow::{Borrow, Cow};
use std::fmt;

macro_rules! label_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Cow<'static, str>);

        impl $name {
            /// Create a label from a static string. Usable in `const` items.
            pub const fn from_static(label: &'static str) -> Self {
                Self(Cow::Borrowed(label))
            }

            /// Create a label from any string-like value.
            pub fn new(label: impl Into<String>) -> Self {
                Self(Cow::Owned(label.into()))
            }

            /// The label text.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True for the empty label.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.as_str())
            }
        }

        impl From<&str> for $name {
            fn from(label: &str) -> Self {
                Self::new(label)
            }
        }

        impl From<String> for $name {
            fn from(label: String) -> Self {
                Self(Cow::Owned(label))
            }
        }

        impl From<&$name> for $name {
            fn from(label: &$name) -> Self {
                label.clone()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.as_str() == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.as_str() == *other
            }
        }
    };
}

label_type! {
    /// A named configuration the machine can occupy.
    ///
    /// # Example
    ///
    /// ```rust
    /// use statekeep::State;
    ///
    /// const LOCKED: State = State::from_static("LOCKED");
    ///
    /// assert_eq!(LOCKED, State::from("LOCKED"));
    /// assert_eq!(LOCKED.to_string(), "LOCKED");
    /// ```
    State
}

label_type! {
    /// A named stimulus that may cause a state change.
    Event
}
