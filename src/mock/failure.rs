//! Failure Injection for the Mock Registry
//!
//! Supports configurable failure injection for testing reconnect and retry paths.

use std::collections::HashMap;
use std::time::Duration;

use lane_backend::{BackendError, ErrorKind};

/// Backend call that a failure can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendCall {
    /// Registry enumeration
    ListSerials,
    /// Obtaining a device-bridge handle
    Bridge,
    /// Opening a UI-automation session
    ConnectUi,
    /// Bridge state query (health check)
    State,
    /// Bridge shell execution
    Shell,
    /// UI introspection (health check)
    Info,
    /// Any UI gesture or text input
    Gesture,
}

/// Failure configuration for a backend call
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Error kind to return (if any)
    pub error_kind: Option<ErrorKind>,
    /// Error message to return
    pub error_message: Option<String>,
    /// Delay to add before responding
    pub delay: Option<Duration>,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Create a config that returns an error
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_kind: Some(kind),
            error_message: Some(message.into()),
            delay: None,
            fail_count: None,
        }
    }

    /// Create a config that just adds delay
    pub fn delay(duration: Duration) -> Self {
        Self {
            error_kind: None,
            error_message: None,
            delay: Some(duration),
            fail_count: None,
        }
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }

    /// The error this config produces, if it produces one
    pub fn to_error(&self) -> Option<BackendError> {
        self.error_kind.map(|kind| {
            let message = self
                .error_message
                .clone()
                .unwrap_or_else(|| format!("injected {} failure", kind));
            BackendError::new(kind, message)
        })
    }
}

/// Failure injector for the mock registry
#[derive(Debug, Default)]
pub struct FailureInjector {
    /// Per-call failure configs
    configs: HashMap<BackendCall, FailureConfig>,
    /// Call counts per call (for fail_count tracking)
    call_counts: HashMap<BackendCall, u32>,
}

impl FailureInjector {
    /// Create a new failure injector
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for a call
    pub fn inject(&mut self, call: BackendCall, config: FailureConfig) {
        self.configs.insert(call, config);
        self.call_counts.insert(call, 0);
    }

    /// Inject an error for a call
    pub fn inject_error(&mut self, call: BackendCall, kind: ErrorKind, message: impl Into<String>) {
        self.inject(call, FailureConfig::error(kind, message));
    }

    /// Clear all failure injections
    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    /// Clear failure injection for a specific call
    pub fn clear_call(&mut self, call: BackendCall) {
        self.configs.remove(&call);
        self.call_counts.remove(&call);
    }

    /// Check if a failure should occur for a call.
    /// Returns the failure config if one should occur, None otherwise
    pub fn check(&mut self, call: BackendCall) -> Option<FailureConfig> {
        let config = self.configs.get(&call)?;
        let count = self.call_counts.entry(call).or_insert(0);
        *count += 1;

        if let Some(fail_limit) = config.fail_count {
            if *count > fail_limit {
                return None;
            }
        }

        Some(config.clone())
    }
}
