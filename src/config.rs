//! Relay configuration, loaded from TOML. Every field has a default, so an
//! empty file (or no file) yields a working setup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default)]
    pub region: RegionSettings,
    #[serde(default)]
    pub producer: ProducerSettings,
    #[serde(default)]
    pub pump: PumpSettings,
    #[serde(default)]
    pub history: HistorySettings,
}

/// Geometry and backing of the shared region.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RegionSettings {
    /// Name under /dev/shm. Empty selects an anonymous in-process region.
    #[serde(default = "defaults::region_name")]
    pub name: String,
    #[serde(default = "defaults::capacity")]
    pub capacity: u32,
    #[serde(default = "defaults::slot_size")]
    pub slot_size: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProducerSettings {
    #[serde(default = "defaults::producer_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Total enqueue attempts on lock timeout, first one included.
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "defaults::jitter_min_ms")]
    pub jitter_min_ms: u64,
    #[serde(default = "defaults::jitter_max_ms")]
    pub jitter_max_ms: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PumpSettings {
    #[serde(default = "defaults::interval_ms")]
    pub interval_ms: u64,
    /// Most messages drained per tick.
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,
    #[serde(default = "defaults::pump_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Also send every message to the unscoped `global` room.
    #[serde(default)]
    pub mirror_global: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct HistorySettings {
    /// Messages kept per streamer before the oldest is evicted.
    #[serde(default = "defaults::history_limit")]
    pub limit: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

mod defaults {
    pub fn log_level() -> String {
        "info".into()
    }

    pub fn region_name() -> String {
        "crosschat_relay".into()
    }

    pub fn capacity() -> u32 {
        crate::Relay::Ring::layout::DEFAULT_CAPACITY
    }

    pub fn slot_size() -> u32 {
        crate::Relay::Ring::layout::DEFAULT_SLOT_SIZE
    }

    pub fn producer_lock_timeout_ms() -> u64 {
        1500
    }

    pub fn max_attempts() -> u32 {
        5
    }

    pub fn jitter_min_ms() -> u64 {
        20
    }

    pub fn jitter_max_ms() -> u64 {
        70
    }

    pub fn interval_ms() -> u64 {
        50
    }

    pub fn batch_size() -> usize {
        50
    }

    pub fn pump_lock_timeout_ms() -> u64 {
        1000
    }

    pub fn history_limit() -> usize {
        300
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level(),
            region: RegionSettings::default(),
            producer: ProducerSettings::default(),
            pump: PumpSettings::default(),
            history: HistorySettings::default(),
        }
    }
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            name: defaults::region_name(),
            capacity: defaults::capacity(),
            slot_size: defaults::slot_size(),
        }
    }
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: defaults::producer_lock_timeout_ms(),
            max_attempts: defaults::max_attempts(),
            jitter_min_ms: defaults::jitter_min_ms(),
            jitter_max_ms: defaults::jitter_max_ms(),
        }
    }
}

impl Default for PumpSettings {
    fn default() -> Self {
        Self {
            interval_ms: defaults::interval_ms(),
            batch_size: defaults::batch_size(),
            lock_timeout_ms: defaults::pump_lock_timeout_ms(),
            mirror_global: false,
        }
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            limit: defaults::history_limit(),
        }
    }
}

impl ProducerSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl PumpSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl RelayConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&toml_to_str)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });

        if self.region.capacity == 0 {
            return invalid("region.capacity", "must be at least 1");
        }
        if self.region.slot_size <= 4 {
            return invalid("region.slot_size", "must be larger than the 4-byte length prefix");
        }
        if self.region.name.contains('/') {
            return invalid("region.name", "must not contain '/'");
        }
        if self.producer.max_attempts == 0 {
            return invalid("producer.max_attempts", "must be at least 1");
        }
        if self.producer.jitter_min_ms > self.producer.jitter_max_ms {
            return invalid("producer.jitter_min_ms", "must not exceed producer.jitter_max_ms");
        }
        if self.pump.interval_ms == 0 {
            return invalid("pump.interval_ms", "must be at least 1");
        }
        if self.pump.batch_size == 0 {
            return invalid("pump.batch_size", "must be at least 1");
        }
        if self.history.limit == 0 {
            return invalid("history.limit", "must be at least 1");
        }
        Ok(())
    }
}
