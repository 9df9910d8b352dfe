//! In-process mock registry
//!
//! Simulates connected devices with hot-plug, unhealthy devices, and
//! per-call failure injection. Every handle gets a fresh generation number so
//! tests can tell reconnected handles apart.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lane_backend::{
    BackendError, BackendResult, BridgeHandle, DeviceRegistry, Selector, UiHandle, STATE_DEVICE,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};

use super::failure::{BackendCall, FailureConfig, FailureInjector};

/// How often a waiting element lookup re-checks the screen
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A gesture recorded by a mock UI handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MockGesture {
    pub serial: String,
    pub generation: u64,
    pub action: String,
}

#[derive(Default)]
struct MockInner {
    serials: Mutex<BTreeSet<String>>,
    unhealthy: Mutex<HashSet<String>>,
    failures: Mutex<FailureInjector>,
    counts: Mutex<HashMap<BackendCall, usize>>,
    gestures: Mutex<Vec<MockGesture>>,
    elements: Mutex<HashMap<String, HashSet<Selector>>>,
    generation: AtomicU64,
}

impl MockInner {
    /// Count the call, apply any injected delay, then any injected error.
    fn gate(&self, call: BackendCall) -> BackendResult<()> {
        *self.counts.lock().entry(call).or_insert(0) += 1;

        let config = self.failures.lock().check(call);
        let Some(config) = config else {
            return Ok(());
        };
        if let Some(delay) = config.delay {
            thread::sleep(delay);
        }
        match config.to_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn is_connected(&self, serial: &str) -> bool {
        self.serials.lock().contains(serial)
    }

    fn is_healthy(&self, serial: &str) -> bool {
        !self.unhealthy.lock().contains(serial)
    }

    fn has_element(&self, serial: &str, selector: &Selector) -> bool {
        self.elements
            .lock()
            .get(serial)
            .is_some_and(|shown| shown.contains(selector))
    }
}

/// Cloneable mock registry; clones share state.
#[derive(Clone, Default)]
pub struct MockRegistry {
    inner: Arc<MockInner>,
}

impl MockRegistry {
    /// Create a registry with no devices connected
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the given devices connected
    pub fn with_serials<I, S>(serials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        for serial in serials {
            registry.plug(serial);
        }
        registry
    }

    // === Test configuration ===

    /// Connect a device
    pub fn plug(&self, serial: impl Into<String>) {
        self.inner.serials.lock().insert(serial.into());
    }

    /// Disconnect a device
    pub fn unplug(&self, serial: &str) {
        self.inner.serials.lock().remove(serial);
    }

    /// Mark a device healthy or not. Unhealthy devices report state
    /// "offline" and their UI handles fail introspection.
    pub fn set_healthy(&self, serial: &str, healthy: bool) {
        let mut unhealthy = self.inner.unhealthy.lock();
        if healthy {
            unhealthy.remove(serial);
        } else {
            unhealthy.insert(serial.to_string());
        }
    }

    /// Put an element matching `selector` on the device's screen
    pub fn show_element(&self, serial: &str, selector: Selector) {
        self.inner
            .elements
            .lock()
            .entry(serial.to_string())
            .or_default()
            .insert(selector);
    }

    /// Remove an element from the device's screen
    pub fn hide_element(&self, serial: &str, selector: &Selector) {
        if let Some(shown) = self.inner.elements.lock().get_mut(serial) {
            shown.remove(selector);
        }
    }

    /// Inject a failure for a backend call
    pub fn inject(&self, call: BackendCall, config: FailureConfig) {
        self.inner.failures.lock().inject(call, config);
    }

    /// Clear all injected failures
    pub fn clear_failures(&self) {
        self.inner.failures.lock().clear();
    }

    // === Inspection ===

    /// Number of times `call` was made, including failed attempts
    pub fn calls(&self, call: BackendCall) -> usize {
        self.inner.counts.lock().get(&call).copied().unwrap_or(0)
    }

    /// Gestures recorded across all UI handles, in order
    pub fn gestures(&self) -> Vec<MockGesture> {
        self.inner.gestures.lock().clone()
    }

    /// Number of handles handed out so far
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn next_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn require_connected(&self, serial: &str) -> BackendResult<()> {
        if self.inner.is_connected(serial) {
            Ok(())
        } else {
            Err(BackendError::connection(format!("device '{}' not found", serial)))
        }
    }
}

impl DeviceRegistry for MockRegistry {
    fn list_serials(&self) -> BackendResult<Vec<String>> {
        self.inner.gate(BackendCall::ListSerials)?;
        Ok(self.inner.serials.lock().iter().cloned().collect())
    }

    fn bridge(&self, serial: &str) -> BackendResult<Box<dyn BridgeHandle>> {
        self.inner.gate(BackendCall::Bridge)?;
        self.require_connected(serial)?;
        Ok(Box::new(MockBridge {
            serial: serial.to_string(),
            generation: self.next_generation(),
            inner: Arc::clone(&self.inner),
        }))
    }

    fn connect_ui(&self, serial: &str) -> BackendResult<Box<dyn UiHandle>> {
        self.inner.gate(BackendCall::ConnectUi)?;
        self.require_connected(serial)?;
        Ok(Box::new(MockUi {
            serial: serial.to_string(),
            generation: self.next_generation(),
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MockBridge {
    serial: String,
    generation: u64,
    inner: Arc<MockInner>,
}

impl BridgeHandle for MockBridge {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn state(&self) -> BackendResult<String> {
        self.inner.gate(BackendCall::State)?;
        if !self.inner.is_connected(&self.serial) {
            return Err(BackendError::connection(format!("device '{}' not found", self.serial)));
        }
        if self.inner.is_healthy(&self.serial) {
            Ok(STATE_DEVICE.to_string())
        } else {
            Ok("offline".to_string())
        }
    }

    fn shell(&self, command: &str) -> BackendResult<String> {
        self.inner.gate(BackendCall::Shell)?;
        if !self.inner.is_healthy(&self.serial) {
            return Err(BackendError::connection("device offline"));
        }
        let output = match command.trim() {
            "getprop ro.product.model" => "Mock Device".to_string(),
            "getprop ro.build.version.release" => "14".to_string(),
            other => format!("{}#{}: {}", self.serial, self.generation, other),
        };
        Ok(output)
    }
}

struct MockUi {
    serial: String,
    generation: u64,
    inner: Arc<MockInner>,
}

impl MockUi {
    fn record(&self, action: String) -> BackendResult<()> {
        self.inner.gate(BackendCall::Gesture)?;
        self.require_healthy()?;
        self.push_gesture(action);
        Ok(())
    }

    fn require_healthy(&self) -> BackendResult<()> {
        if self.inner.is_healthy(&self.serial) {
            Ok(())
        } else {
            Err(BackendError::transport("uiautomator rpc unreachable"))
        }
    }

    fn push_gesture(&self, action: String) {
        self.inner.gestures.lock().push(MockGesture {
            serial: self.serial.clone(),
            generation: self.generation,
            action,
        });
    }
}

impl UiHandle for MockUi {
    fn info(&self) -> BackendResult<Value> {
        self.inner.gate(BackendCall::Info)?;
        self.require_healthy()?;
        Ok(json!({
            "serial": self.serial,
            "generation": self.generation,
            "display": "1080x2400",
        }))
    }

    fn tap(&self, x: i32, y: i32) -> BackendResult<()> {
        self.record(format!("tap {} {}", x, y))
    }

    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration: Duration) -> BackendResult<()> {
        self.record(format!("swipe {} {} {} {} {}", x1, y1, x2, y2, duration.as_millis()))
    }

    fn press(&self, key: &str) -> BackendResult<()> {
        self.record(format!("press {}", key))
    }

    fn send_text(&self, text: &str, clear: bool) -> BackendResult<()> {
        self.record(format!("text {} clear={}", text, clear))
    }

    fn click_element(&self, selector: &Selector, timeout: Duration) -> BackendResult<bool> {
        self.inner.gate(BackendCall::Gesture)?;
        let deadline = Instant::now().checked_add(timeout);
        loop {
            self.require_healthy()?;
            if self.inner.has_element(&self.serial, selector) {
                self.push_gesture(format!("click {}", selector));
                return Ok(true);
            }
            let now = Instant::now();
            match deadline {
                Some(deadline) if now >= deadline => return Ok(false),
                Some(deadline) => thread::sleep(ELEMENT_POLL_INTERVAL.min(deadline - now)),
                None => thread::sleep(ELEMENT_POLL_INTERVAL),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lane_backend::ErrorKind;

    #[test]
    fn test_hot_plug() {
        let registry = MockRegistry::with_serials(["B", "A"]);
        assert_eq!(registry.list_serials().unwrap(), vec!["A", "B"]);

        registry.unplug("A");
        registry.plug("C");
        assert_eq!(registry.list_serials().unwrap(), vec!["B", "C"]);
    }

    #[test]
    fn test_unknown_serial_fails_to_connect() {
        let registry = MockRegistry::new();
        let err = registry.bridge("X").err().unwrap();
        assert_eq!(err.kind, ErrorKind::Connection);
        assert_eq!(registry.calls(BackendCall::Bridge), 1);
    }

    #[test]
    fn test_generations_increase() {
        let registry = MockRegistry::with_serials(["A"]);
        let first = registry.connect_ui("A").unwrap();
        let second = registry.connect_ui("A").unwrap();

        assert_ne!(first.info().unwrap()["generation"], second.info().unwrap()["generation"]);
        assert_eq!(registry.generation(), 2);
    }

    #[test]
    fn test_unhealthy_device() {
        let registry = MockRegistry::with_serials(["A"]);
        let bridge = registry.bridge("A").unwrap();
        let ui = registry.connect_ui("A").unwrap();

        registry.set_healthy("A", false);
        assert_eq!(bridge.state().unwrap(), "offline");
        assert!(ui.info().is_err());

        registry.set_healthy("A", true);
        assert_eq!(bridge.state().unwrap(), "device");
    }

    #[test]
    fn test_gestures_recorded() {
        let registry = MockRegistry::with_serials(["A"]);
        let ui = registry.connect_ui("A").unwrap();

        ui.tap(1, 2).unwrap();
        ui.press("home").unwrap();

        let actions: Vec<String> = registry.gestures().into_iter().map(|g| g.action).collect();
        assert_eq!(actions, vec!["tap 1 2", "press home"]);
    }

    #[test]
    fn test_click_element_present() {
        let registry = MockRegistry::with_serials(["A"]);
        registry.show_element("A", Selector::Text("OK".into()));
        let ui = registry.connect_ui("A").unwrap();

        assert!(ui.click_element(&Selector::Text("OK".into()), Duration::ZERO).unwrap());
        assert_eq!(registry.gestures()[0].action, "click text=OK");
    }

    #[test]
    fn test_click_element_waits_then_misses() {
        let registry = MockRegistry::with_serials(["A"]);
        registry.show_element("B", Selector::Text("OK".into()));
        registry.show_element("A", Selector::ContentDesc("OK".into()));
        let ui = registry.connect_ui("A").unwrap();

        let started = Instant::now();
        let clicked = ui
            .click_element(&Selector::Text("OK".into()), Duration::from_millis(50))
            .unwrap();

        assert!(!clicked);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(registry.gestures().is_empty());
    }

    #[test]
    fn test_click_element_appears_while_waiting() {
        let registry = MockRegistry::with_serials(["A"]);
        let ui = registry.connect_ui("A").unwrap();

        let shower = registry.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            shower.show_element("A", Selector::ResourceId("id/ok".into()));
        });

        let clicked = ui
            .click_element(&Selector::ResourceId("id/ok".into()), Duration::from_secs(5))
            .unwrap();
        handle.join().unwrap();
        assert!(clicked);

        registry.hide_element("A", &Selector::ResourceId("id/ok".into()));
        let clicked = ui
            .click_element(&Selector::ResourceId("id/ok".into()), Duration::ZERO)
            .unwrap();
        assert!(!clicked);
    }

    #[test]
    fn test_injected_delay_then_success() {
        let registry = MockRegistry::with_serials(["A"]);
        registry.inject(BackendCall::ListSerials, FailureConfig::delay(Duration::from_millis(1)));
        assert_eq!(registry.list_serials().unwrap(), vec!["A"]);
    }
}
