//! Environment variable layer (layer 3)

use serde_json::{Map, Number, Value};

use super::effective::ConfigError;

#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Text,
    Unsigned,
    Seconds,
}

/// Recognized environment variables and the setting each one sets
pub const ENV_VARS: &[(&str, &str)] = &[
    ("LANE_DEFAULT_SERIAL", "default_serial"),
    ("LANE_MAX_WORKERS", "max_workers"),
    ("LANE_SESSION_TTL_SECONDS", "session_ttl_seconds"),
    ("LANE_HEALTHCHECK_INTERVAL_SECONDS", "healthcheck_interval_seconds"),
    ("LANE_CONNECT_RETRIES", "connect_retries"),
    ("LANE_CONNECT_BACKOFF_SECONDS", "connect_backoff_seconds"),
    ("LANE_ADB_PATH", "adb_path"),
];

fn kind_of(key: &str) -> EnvKind {
    match key {
        "max_workers" | "connect_retries" => EnvKind::Unsigned,
        "session_ttl_seconds" | "healthcheck_interval_seconds" | "connect_backoff_seconds" => {
            EnvKind::Seconds
        }
        _ => EnvKind::Text,
    }
}

/// Build the environment layer from `vars` (normally `std::env::vars()`).
///
/// Returns `None` when no recognized variable is set. Unrecognized names are
/// ignored; unparseable numbers are an error naming the variable.
pub fn env_layer<I>(vars: I) -> Result<Option<Value>, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut layer = Map::new();

    for (name, raw) in vars {
        let Some((_, key)) = ENV_VARS.iter().find(|(var, _)| *var == name) else {
            continue;
        };
        let raw = raw.trim();
        let value = match kind_of(key) {
            EnvKind::Text => Value::String(raw.to_string()),
            EnvKind::Unsigned => {
                let n: u64 = raw.parse().map_err(|_| {
                    ConfigError::ParseError(format!(
                        "{} must be a non-negative integer, got '{}'",
                        name, raw
                    ))
                })?;
                Value::Number(n.into())
            }
            EnvKind::Seconds => {
                let n: f64 = raw.parse().map_err(|_| {
                    ConfigError::ParseError(format!("{} must be a number, got '{}'", name, raw))
                })?;
                Number::from_f64(n).map(Value::Number).ok_or_else(|| {
                    ConfigError::ParseError(format!("{} must be finite, got '{}'", name, raw))
                })?
            }
        };
        layer.insert((*key).to_string(), value);
    }

    if layer.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Value::Object(layer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_no_vars() {
        assert!(env_layer(vars(&[("PATH", "/bin")])).unwrap().is_none());
    }

    #[test]
    fn test_parses_known_vars() {
        let layer = env_layer(vars(&[
            ("LANE_DEFAULT_SERIAL", "emulator-5554"),
            ("LANE_MAX_WORKERS", "4"),
            ("LANE_SESSION_TTL_SECONDS", "0"),
            ("LANE_CONNECT_BACKOFF_SECONDS", "0.25"),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(layer["default_serial"], "emulator-5554");
        assert_eq!(layer["max_workers"], 4);
        assert_eq!(layer["session_ttl_seconds"], 0.0);
        assert_eq!(layer["connect_backoff_seconds"], 0.25);
    }

    #[test]
    fn test_bad_number_names_variable() {
        let err = env_layer(vars(&[("LANE_CONNECT_RETRIES", "-1")])).unwrap_err();
        assert!(err.to_string().contains("LANE_CONNECT_RETRIES"));

        let err = env_layer(vars(&[("LANE_HEALTHCHECK_INTERVAL_SECONDS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("LANE_HEALTHCHECK_INTERVAL_SECONDS"));
    }
}
