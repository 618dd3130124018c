//! Provider configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a shell provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// How long an output delivery waits for a receive request, in
    /// milliseconds. `0` waits until the request arrives or the command is
    /// signalled.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    /// Maximum number of live shells. `0` means unlimited.
    #[serde(default)]
    pub max_shells: usize,
    /// Deflate level for compressed shells (0..=9).
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

const fn default_delivery_timeout_ms() -> u64 {
    60_000
}

const fn default_compression_level() -> u32 {
    6
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: default_delivery_timeout_ms(),
            max_shells: 0,
            compression_level: default_compression_level(),
        }
    }
}

impl ProviderConfig {
    /// Bound on the output delivery wait, if any.
    #[must_use]
    pub const fn delivery_timeout(&self) -> Option<Duration> {
        match self.delivery_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Bound the delivery wait. Sub-millisecond bounds round up to 1ms, since
    /// `0` means unbounded.
    #[must_use]
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout_ms = u64::try_from(timeout.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        self
    }

    #[must_use]
    pub const fn with_max_shells(mut self, max_shells: usize) -> Self {
        self.max_shells = max_shells;
        self
    }
}
