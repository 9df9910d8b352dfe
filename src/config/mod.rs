//! Layered configuration
//!
//! Settings are merged from four layers, last wins:
//! 1. Built-in defaults
//! 2. Config file (`--config`, else ~/.config/device-lane/lane.toml)
//! 3. `LANE_*` environment variables
//! 4. CLI flags

mod defaults;
mod effective;
mod env;
mod merge;
mod settings;

pub use defaults::{default_config_path, CONFIG_FILE_NAME};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use env::{env_layer, ENV_VARS};
pub use merge::{deep_merge, merge_layers};
pub use settings::LaneSettings;
