//! Typed settings extracted from the merged configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::effective::ConfigError;

/// Validated lane settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneSettings {
    /// Serial used when a request names no device
    pub default_serial: Option<String>,

    /// Worker pool size (> 0)
    pub max_workers: usize,

    /// Idle session expiry; `<= 0` disables expiry
    pub session_ttl_seconds: f64,

    /// Seconds between health checks; `<= 0` checks on every access
    pub healthcheck_interval_seconds: f64,

    /// Connect retries after the first attempt
    pub connect_retries: u32,

    /// Base connect backoff (>= 0), doubled per attempt
    pub connect_backoff_seconds: f64,

    /// adb executable
    pub adb_path: String,
}

impl LaneSettings {
    /// Extract and validate settings from a merged config value
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let mut settings: LaneSettings = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::ParseError(format!("invalid setting: {}", e)))?;

        settings.default_serial = settings
            .default_serial
            .take()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        settings.validate()?;
        Ok(settings)
    }

    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "default_serial": self.default_serial,
            "max_workers": self.max_workers,
            "session_ttl_seconds": self.session_ttl_seconds,
            "healthcheck_interval_seconds": self.healthcheck_interval_seconds,
            "connect_retries": self.connect_retries,
            "connect_backoff_seconds": self.connect_backoff_seconds,
            "adb_path": self.adb_path,
        })
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::ValidationError("max_workers must be > 0".to_string()));
        }

        if !self.session_ttl_seconds.is_finite() {
            return Err(ConfigError::ValidationError(
                "session_ttl_seconds must be a finite number".to_string(),
            ));
        }

        if !self.healthcheck_interval_seconds.is_finite() {
            return Err(ConfigError::ValidationError(
                "healthcheck_interval_seconds must be a finite number".to_string(),
            ));
        }

        if Duration::try_from_secs_f64(self.connect_backoff_seconds).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "connect_backoff_seconds must be >= 0 and within range, got {}",
                self.connect_backoff_seconds
            )));
        }

        if self.adb_path.trim().is_empty() {
            return Err(ConfigError::ValidationError("adb_path cannot be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_defaults_value() {
        let value = LaneSettings::default().to_value();
        assert_eq!(LaneSettings::from_value(&value).unwrap(), LaneSettings::default());
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let settings = LaneSettings::from_value(&json!({"max_workers": 3})).unwrap();
        assert_eq!(settings.max_workers, 3);
        assert_eq!(settings.connect_retries, 2);
    }

    #[test]
    fn test_integer_seconds_accepted() {
        let settings = LaneSettings::from_value(&json!({"session_ttl_seconds": 0})).unwrap();
        assert_eq!(settings.session_ttl_seconds, 0.0);
    }

    #[test]
    fn test_blank_default_serial_is_none() {
        let settings = LaneSettings::from_value(&json!({"default_serial": "  "})).unwrap();
        assert_eq!(settings.default_serial, None);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = LaneSettings::from_value(&json!({"max_workers": 0})).unwrap_err();
        assert!(err.to_string().contains("max_workers"));
    }

    #[test]
    fn test_negative_retries_rejected() {
        let err = LaneSettings::from_value(&json!({"connect_retries": -1})).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_negative_backoff_rejected() {
        let err = LaneSettings::from_value(&json!({"connect_backoff_seconds": -0.1})).unwrap_err();
        assert!(err.to_string().contains("connect_backoff_seconds"));
    }

    #[test]
    fn test_negative_ttl_allowed() {
        let settings = LaneSettings::from_value(&json!({"session_ttl_seconds": -5.0})).unwrap();
        assert_eq!(settings.session_ttl_seconds, -5.0);
    }

    #[test]
    fn test_huge_seconds() {
        let settings = LaneSettings::from_value(&json!({
            "session_ttl_seconds": 1e30,
            "healthcheck_interval_seconds": 1e30,
        }))
        .unwrap();
        assert_eq!(settings.session_ttl_seconds, 1e30);

        let err = LaneSettings::from_value(&json!({"connect_backoff_seconds": 1e30})).unwrap_err();
        assert!(err.to_string().contains("connect_backoff_seconds"));
    }
}
