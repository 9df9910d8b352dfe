//! Built-in defaults (layer 1)

use std::path::PathBuf;

use super::settings::LaneSettings;

/// Worker pool size
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Idle session expiry in seconds
pub const DEFAULT_SESSION_TTL_SECONDS: f64 = 600.0;

/// Seconds between health checks of a cached session
pub const DEFAULT_HEALTHCHECK_INTERVAL_SECONDS: f64 = 30.0;

/// Connect retries after the first attempt
pub const DEFAULT_CONNECT_RETRIES: u32 = 2;

/// Base connect backoff in seconds, doubled per attempt
pub const DEFAULT_CONNECT_BACKOFF_SECONDS: f64 = 0.5;

/// adb executable looked up on PATH
pub const DEFAULT_ADB_PATH: &str = "adb";

/// File name of the user config file
pub const CONFIG_FILE_NAME: &str = "lane.toml";

impl Default for LaneSettings {
    fn default() -> Self {
        Self {
            default_serial: None,
            max_workers: DEFAULT_MAX_WORKERS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            healthcheck_interval_seconds: DEFAULT_HEALTHCHECK_INTERVAL_SECONDS,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            connect_backoff_seconds: DEFAULT_CONNECT_BACKOFF_SECONDS,
            adb_path: DEFAULT_ADB_PATH.to_string(),
        }
    }
}

/// `$HOME/.config/device-lane/lane.toml`, if HOME is set
pub fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("device-lane")
            .join(CONFIG_FILE_NAME),
    )
}
