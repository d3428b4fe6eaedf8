use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default interval between authoritative re-fetches
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Default capacity of the queue between producers and the consumer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("channel capacity must be greater than zero")]
    ZeroChannelCapacity,

    #[cfg(feature = "toml")]
    #[error("invalid observer configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration of a run observer
///
/// ```toml
/// poll_interval_ms = 3000
/// channel_capacity = 64
/// poll_after_terminal = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawObserverConfig")]
pub struct ObserverConfig {
    poll_interval_ms: u64,
    channel_capacity: usize,
    poll_after_terminal: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawObserverConfig {
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
    #[serde(default = "default_channel_capacity")]
    channel_capacity: usize,
    #[serde(default)]
    poll_after_terminal: bool,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl TryFrom<RawObserverConfig> for ObserverConfig {
    type Error = ConfigError;

    fn try_from(raw: RawObserverConfig) -> Result<Self, Self::Error> {
        Self::try_new(raw.poll_interval_ms, raw.channel_capacity, raw.poll_after_terminal)
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            poll_after_terminal: false,
        }
    }
}

impl ObserverConfig {
    /// Create a new config with validation
    pub fn try_new(
        poll_interval_ms: u64,
        channel_capacity: usize,
        poll_after_terminal: bool,
    ) -> Result<Self, ConfigError> {
        if poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }

        Ok(Self {
            poll_interval_ms,
            channel_capacity,
            poll_after_terminal,
        })
    }

    /// Parse and validate a TOML document, missing keys take their defaults
    #[cfg(feature = "toml")]
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Keep re-fetching once the run reached a terminal status
    pub fn poll_after_terminal(&self) -> bool {
        self.poll_after_terminal
    }
}
