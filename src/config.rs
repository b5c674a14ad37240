//! Engine configuration.

use crate::error::{Result, SeqError};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub generator: GeneratorConfig,
    pub group_table: GroupTableConfig,
    pub buffer: BufferConfig,
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let config: EngineConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.generator.thread_name.is_empty() {
            return Err(SeqError::Config("generator.thread_name is empty".into()));
        }
        if let Some(size) = self.generator.stack_size {
            if size < MIN_STACK_SIZE {
                return Err(SeqError::Config(format!(
                    "generator.stack_size {} is below the minimum of {}",
                    size, MIN_STACK_SIZE
                )));
            }
        }
        if self.group_table.initial_buckets == 0 {
            return Err(SeqError::Config("group_table.initial_buckets must be > 0".into()));
        }
        Ok(())
    }
}

/// Smallest producer thread stack we accept.
const MIN_STACK_SIZE: usize = 16 * 1024;

/// Configuration for generator (yield engine) producer threads.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Name given to producer threads.
    /// Default: "tidepool-producer"
    pub thread_name: String,

    /// Producer thread stack size in bytes (None = platform default).
    pub stack_size: Option<usize>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            thread_name: "tidepool-producer".to_string(),
            stack_size: None,
        }
    }
}

/// Configuration for keyed group tables.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupTableConfig {
    /// Bucket count of a fresh table.
    /// Default: 7
    pub initial_buckets: usize,
}

impl Default for GroupTableConfig {
    fn default() -> Self {
        Self { initial_buckets: 7 }
    }
}

/// Configuration for materialized buffers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Initial capacity reserved before the first drain.
    /// Default: 4
    pub capacity_hint: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity_hint: 4 }
    }
}
