//! adb-backed device registry
//!
//! Drives devices through the `adb` executable: enumeration and shell for the
//! bridge role, `input`/`wm` shell commands for the UI role. Each call spawns
//! one adb process and waits for it.

mod handles;

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use lane_backend::{
    BackendError, BackendResult, BridgeHandle, DeviceRegistry, UiHandle, STATE_DEVICE,
};
use tracing::debug;

pub use handles::{
    encode_input_text, find_element, key_code, parse_display_size, AdbBridge, AdbUi,
};

/// Registry that shells out to adb
#[derive(Debug, Clone)]
pub struct AdbRegistry {
    adb_path: PathBuf,
}

impl AdbRegistry {
    /// Create a registry using the adb executable at `adb_path`
    pub fn new(adb_path: impl Into<PathBuf>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb_path
    }
}

impl DeviceRegistry for AdbRegistry {
    fn list_serials(&self) -> BackendResult<Vec<String>> {
        let output = run_adb(&self.adb_path, None, &["devices"])?;
        Ok(parse_devices(&output))
    }

    fn bridge(&self, serial: &str) -> BackendResult<Box<dyn BridgeHandle>> {
        let bridge = AdbBridge::new(self.adb_path.clone(), serial);
        let state = bridge.state()?;
        if state != STATE_DEVICE {
            let state = if state.is_empty() { "unreachable" } else { state.as_str() };
            return Err(BackendError::connection(format!("device '{}' is {}", serial, state)));
        }
        Ok(Box::new(bridge))
    }

    fn connect_ui(&self, serial: &str) -> BackendResult<Box<dyn UiHandle>> {
        let ui = AdbUi::connect(self.adb_path.clone(), serial)?;
        Ok(Box::new(ui))
    }
}

/// Serials in state `device` from `adb devices` output
pub fn parse_devices(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*')
        })
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let serial = fields.next()?;
            let state = fields.next()?;
            (state == STATE_DEVICE).then(|| serial.to_string())
        })
        .collect()
}

/// Run adb with `args`, optionally against one serial. Returns stdout.
pub(crate) fn run_adb(adb: &Path, serial: Option<&str>, args: &[&str]) -> BackendResult<String> {
    let mut command = Command::new(adb);
    if let Some(serial) = serial {
        command.arg("-s").arg(serial);
    }
    command.args(args).stdin(Stdio::null());

    debug!(adb = %adb.display(), serial = serial.unwrap_or("-"), args = ?args, "spawning adb");

    let output = command.output().map_err(|e| {
        BackendError::transport(format!("Failed to spawn {}: {}", adb.display(), e))
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let detail = if stderr.trim().is_empty() {
            stdout.trim()
        } else {
            stderr.trim()
        };
        return Err(classify_failure(detail, &output.status.to_string()));
    }
    // Older adb exits 0 even when the device vanished mid-call.
    if stderr.to_ascii_lowercase().starts_with("error:") {
        return Err(classify_failure(stderr.trim(), "exit status: 0"));
    }
    Ok(stdout)
}

/// Map adb's failure text to a tagged backend error
pub fn classify_failure(detail: &str, status: &str) -> BackendError {
    let lower = detail.to_ascii_lowercase();
    let message = if detail.is_empty() {
        format!("adb exited with {}", status)
    } else {
        detail.to_string()
    };

    let missing_device = lower.contains("error: device '") && lower.contains("' not found");
    if missing_device
        || ["device offline", "device not found", "no devices", "unauthorized"]
            .iter()
            .any(|marker| lower.contains(marker))
    {
        BackendError::connection(message)
    } else if lower.contains("closed") || lower.contains("protocol fault") {
        BackendError::transport(message)
    } else {
        BackendError::other(message)
    }
}
