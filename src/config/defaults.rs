//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Local directory used as the blob root (default: ".")
    pub storage_root: String,

    /// UTC offset new versions are rendered in (default: "+00:00")
    pub timezone: String,

    /// Wait between version collision retries in ms (default: 10)
    pub collision_interval_ms: u64,

    /// Collision retries before giving up, 0 = unbounded (default: 0)
    pub max_collision_attempts: u32,

    /// Versions kept by `clean` when no count is given (default: 10)
    pub max_versions: usize,

    /// tracing filter used when RUST_LOG is unset (default: "info")
    pub log_filter: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            storage_root: ".".to_string(),
            timezone: "+00:00".to_string(),
            collision_interval_ms: 10,
            max_collision_attempts: 0,
            max_versions: 10,
            log_filter: "info".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to the nested JSON shape config files use
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "storage": {
                "root": self.storage_root,
                "timezone": self.timezone
            },
            "insert": {
                "collision_interval_ms": self.collision_interval_ms,
                "max_collision_attempts": self.max_collision_attempts
            },
            "retention": {
                "max_versions": self.max_versions
            },
            "log_filter": self.log_filter
        })
    }
}
