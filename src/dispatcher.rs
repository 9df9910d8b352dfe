//! Call boundary: session lookup, pooled execution, one retry on transient
//! failure.

use std::sync::Arc;

use lane_backend::{DeviceInfo, DeviceRegistry};
use tracing::{info, warn};

use crate::config::LaneSettings;
use crate::error::{LaneError, LaneResult, ResolutionError};
use crate::executor::DeviceExecutor;
use crate::session::{DeviceSession, SessionManager, SessionPolicy, SessionSnapshot, Target};

/// Composes the session manager and the executor.
pub struct Dispatcher {
    sessions: SessionManager,
    executor: DeviceExecutor,
}

impl Dispatcher {
    /// Create a dispatcher from its parts
    pub fn new(sessions: SessionManager, executor: DeviceExecutor) -> Self {
        Self { sessions, executor }
    }

    /// Build a dispatcher over `registry` from validated settings
    pub fn from_settings(
        registry: Arc<dyn DeviceRegistry>,
        settings: &LaneSettings,
    ) -> std::io::Result<Self> {
        let sessions = SessionManager::new(registry, SessionPolicy::from_settings(settings));
        let executor = DeviceExecutor::new(settings.max_workers)?;
        info!(workers = executor.size(), "dispatcher ready");
        Ok(Self::new(sessions, executor))
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn executor(&self) -> &DeviceExecutor {
        &self.executor
    }

    /// Run `operation` against the device named by `target`.
    ///
    /// A transient backend failure evicts the session, reconnects to the
    /// same serial and runs the operation exactly once more. Any other
    /// failure, and any failure of the second attempt, is returned unchanged.
    pub fn run_for_device<T, F>(
        &self,
        target: impl Into<Target>,
        operation: F,
        requires_ui_lock: bool,
    ) -> LaneResult<T>
    where
        T: Send + 'static,
        F: Fn(&DeviceSession) -> LaneResult<T> + Send + Sync + 'static,
    {
        let target = target.into();
        let operation = Arc::new(operation);

        let session = self.sessions.get_session(&target)?;
        let first = {
            let operation = Arc::clone(&operation);
            self.executor.run(&session, move |s| (*operation)(s), requires_ui_lock)
        };

        let err = match first {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !SessionManager::should_retry_after_error(&err) {
            return Err(err);
        }

        let serial = session.serial().to_string();
        warn!(
            serial = %serial,
            session_id = %session.session_id(),
            error = %err,
            "transient failure; reconnecting and retrying once"
        );
        drop(session);

        self.sessions.clear_session(&serial);
        let session = self.sessions.get_session(&Target::Serial(serial))?;
        self.executor.run(&session, move |s| (*operation)(s), requires_ui_lock)
    }

    /// Drop the cached session for `serial`
    pub fn clear_session(&self, serial: &str) -> bool {
        self.sessions.clear_session(serial)
    }

    /// Serials with a cached session, sorted
    pub fn list_active_sessions(&self) -> Vec<String> {
        self.sessions.active_sessions()
    }

    pub fn session_snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions.session_snapshots()
    }

    /// Describe every currently connected device
    pub fn list_devices(&self) -> LaneResult<Vec<DeviceInfo>> {
        let registry = self.sessions.registry();
        let serials = registry.list_serials()?;
        Ok(serials.iter().map(|serial| registry.describe(serial)).collect())
    }

    /// Describe one device, which must currently be connected
    pub fn device_status(&self, serial: &str) -> LaneResult<DeviceInfo> {
        let serial = serial.trim();
        if serial.is_empty() {
            return Err(LaneError::validation("serial cannot be empty"));
        }
        let registry = self.sessions.registry();
        if !registry.list_serials()?.iter().any(|live| live == serial) {
            return Err(ResolutionError::NotConnected {
                serial: serial.to_string(),
            }
            .into());
        }
        Ok(registry.describe(serial))
    }

    /// Drop all sessions and stop the worker pool
    pub fn shutdown(&self) {
        let cleared = self.sessions.clear_all();
        self.executor.shutdown();
        info!(sessions_cleared = cleared, "dispatcher shut down");
    }
}
