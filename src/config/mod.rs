//! Layered configuration
//!
//! Merges, in increasing precedence:
//! 1. Built-in defaults
//! 2. Host config (~/.config/mstore/config.toml)
//! 3. Project config (.mstore.toml or --config)
//! 4. CLI overrides

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
pub use settings::Settings;
