//! Shell and command identifiers.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum identifier width: a 64-bit value rendered as hex digits.
pub const ID_WIDTH: usize = 16;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Borrow the identifier text.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }
    };
}

id_type!(
    /// Identifier of a shell session.
    ShellId
);

id_type!(
    /// Identifier of a command session.
    CommandId
);

/// Source of process-unique identifiers.
///
/// Tokens come from a 64-bit sequence with a random starting point, rendered
/// as [`ID_WIDTH`] uppercase hex digits. Shells and commands draw from the same
/// sequence, so no two live objects ever share a token.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    /// Create a generator seeded from a random UUID.
    #[must_use]
    pub fn new() -> Self {
        let (seed, _) = Uuid::new_v4().as_u64_pair();
        // Leave headroom so the sequence does not wrap within a process.
        Self::starting_at(seed >> 16)
    }

    /// Create a generator with a fixed starting value.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    fn token(&self) -> String {
        let value = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{value:0width$X}", width = ID_WIDTH)
    }

    /// Allocate a new shell identifier.
    pub fn shell_id(&self) -> ShellId {
        ShellId(self.token())
    }

    /// Allocate a new command identifier.
    pub fn command_id(&self) -> CommandId {
        CommandId(self.token())
    }
}
