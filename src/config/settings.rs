//! Typed view over the merged configuration.

use std::time::Duration;

use mstore_model::parse_offset;
use serde::Deserialize;
use serde_json::Value;

use super::ConfigError;
use crate::storage::{RetentionPolicy, StorageOptions};

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    pub root: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InsertSection {
    pub collision_interval_ms: u64,
    pub max_collision_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionSection {
    pub max_versions: usize,
}

/// Settings the CLI runs with
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub storage: StorageSection,
    pub insert: InsertSection,
    pub retention: RetentionSection,
    pub log_filter: String,
}

impl Settings {
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        Self::deserialize(value).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Capability options derived from the `storage` and `insert` sections.
    pub fn storage_options(&self) -> Result<StorageOptions, ConfigError> {
        let offset = parse_offset(&self.storage.timezone)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        let max_collision_attempts = match self.insert.max_collision_attempts {
            0 => None,
            n => Some(n),
        };

        Ok(StorageOptions {
            offset,
            collision_interval: Duration::from_millis(self.insert.collision_interval_ms),
            max_collision_attempts,
        })
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::keep_last_n(self.retention.max_versions)
    }
}
