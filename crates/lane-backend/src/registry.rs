//! Device registry and backend handle traits.
//!
//! The session core only ever talks to devices through these traits. Handles
//! are exclusively owned by the session that obtained them.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendResult;

/// Connection state reported by a healthy bridge handle.
pub const STATE_DEVICE: &str = "device";

/// How a UI element is located on screen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Visible text
    Text(String),
    /// Android view resource id (`com.app:id/ok`)
    ResourceId(String),
    /// Accessibility description
    ContentDesc(String),
}

impl Selector {
    /// Field name callers use for this selector
    pub fn field(&self) -> &'static str {
        match self {
            Selector::Text(_) => "text",
            Selector::ResourceId(_) => "resource_id",
            Selector::ContentDesc(_) => "content_desc",
        }
    }

    /// The value being matched
    pub fn value(&self) -> &str {
        match self {
            Selector::Text(v) | Selector::ResourceId(v) | Selector::ContentDesc(v) => v,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field(), self.value())
    }
}

/// Connection to a device through the device-bridge backend.
pub trait BridgeHandle: Send + Sync {
    /// Serial this handle is bound to
    fn serial(&self) -> &str;

    /// Current connection state ("device", "offline", "unauthorized", ...)
    fn state(&self) -> BackendResult<String>;

    /// Run a shell command on the device and return its output
    fn shell(&self, command: &str) -> BackendResult<String>;
}

/// Session with the UI-automation service on a device.
pub trait UiHandle: Send + Sync {
    /// Lightweight introspection call, also used as the liveness check
    fn info(&self) -> BackendResult<Value>;

    /// Tap a screen coordinate
    fn tap(&self, x: i32, y: i32) -> BackendResult<()>;

    /// Swipe between two coordinates over `duration`
    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration: Duration) -> BackendResult<()>;

    /// Press a named system key ("back", "home", "recent")
    fn press(&self, key: &str) -> BackendResult<()>;

    /// Type text into the focused field, optionally clearing it first
    fn send_text(&self, text: &str, clear: bool) -> BackendResult<()>;

    /// Wait up to `timeout` for an element matching `selector`, then click it.
    ///
    /// Returns `false` when nothing matched in time. A miss is not a backend
    /// failure.
    fn click_element(&self, selector: &Selector, timeout: Duration) -> BackendResult<bool>;
}

/// Enumerates connected devices and hands out backend handles.
pub trait DeviceRegistry: Send + Sync {
    /// Serials of the currently connected devices. May change between calls.
    fn list_serials(&self) -> BackendResult<Vec<String>>;

    /// Obtain a device-bridge handle; fails if the device is unreachable.
    fn bridge(&self, serial: &str) -> BackendResult<Box<dyn BridgeHandle>>;

    /// Open a UI-automation session; fails if the service cannot be reached.
    fn connect_ui(&self, serial: &str) -> BackendResult<Box<dyn UiHandle>>;

    /// Describe a device. Individual property lookups are best-effort.
    fn describe(&self, serial: &str) -> DeviceInfo {
        let bridge = match self.bridge(serial) {
            Ok(bridge) => bridge,
            Err(_) => return DeviceInfo::unknown(serial),
        };
        let state = bridge.state().unwrap_or_else(|_| "unknown".to_string());
        DeviceInfo {
            serial: serial.to_string(),
            state,
            model: getprop(bridge.as_ref(), "ro.product.model"),
            android_version: getprop(bridge.as_ref(), "ro.build.version.release"),
        }
    }
}

fn getprop(bridge: &dyn BridgeHandle, key: &str) -> Option<String> {
    bridge
        .shell(&format!("getprop {}", key))
        .ok()
        .map(|out| out.trim().to_string())
        .filter(|out| !out.is_empty())
}

/// Descriptor for one connected device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Bridge serial number
    pub serial: String,
    /// Bridge connection state
    pub state: String,
    /// Device model if available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Android release version if available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android_version: Option<String>,
}

impl DeviceInfo {
    /// Descriptor for a device that could not be queried
    pub fn unknown(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            state: "unknown".to_string(),
            model: None,
            android_version: None,
        }
    }
}
