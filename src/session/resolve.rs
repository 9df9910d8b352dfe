//! Target device resolution
//!
//! Resolution order when no serial is requested:
//! 1. Configured default serial, if it is currently connected
//! 2. The sole connected device
//! 3. Error: no devices, or ambiguous
//!
//! An explicitly requested serial must be currently connected.

use serde::{Deserialize, Serialize};

use crate::error::ResolutionError;

/// Which device a caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Let the lane pick (default serial, else the only device)
    #[default]
    Default,
    /// A specific serial
    Serial(String),
}

impl Target {
    /// Build from optional caller input; blank strings count as absent
    pub fn from_option(serial: Option<&str>) -> Self {
        match serial.map(str::trim) {
            Some(s) if !s.is_empty() => Target::Serial(s.to_string()),
            _ => Target::Default,
        }
    }

    /// Requested serial, if any
    pub fn serial(&self) -> Option<&str> {
        match self {
            Target::Default => None,
            Target::Serial(s) => Some(s),
        }
    }
}

impl From<&str> for Target {
    fn from(serial: &str) -> Self {
        Target::from_option(Some(serial))
    }
}

impl From<Option<&str>> for Target {
    fn from(serial: Option<&str>) -> Self {
        Target::from_option(serial)
    }
}

/// Resolve `target` against the live device set.
pub fn resolve_serial(
    target: &Target,
    default_serial: Option<&str>,
    live: &[String],
) -> Result<String, ResolutionError> {
    if let Target::Serial(serial) = target {
        if live.iter().any(|s| s == serial) {
            return Ok(serial.clone());
        }
        return Err(ResolutionError::NotConnected {
            serial: serial.clone(),
        });
    }

    if let Some(default) = default_serial {
        if live.iter().any(|s| s == default) {
            return Ok(default.to_string());
        }
    }

    match live {
        [] => Err(ResolutionError::NoDevices),
        [only] => Ok(only.clone()),
        many => {
            let mut serials = many.to_vec();
            serials.sort();
            Err(ResolutionError::Ambiguous { serials })
        }
    }
}
