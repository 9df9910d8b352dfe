//! Session cache with TTL eviction, health-checked reuse, and connect retry.
//!
//! One lock guards the whole cache and is held across connect and health check
//! calls. At most one thread creates, replaces or health-checks any session
//! at a time, so two threads can never race to open duplicate connections to
//! the same device. The cost is that a slow reconnect to one device delays
//! session setup for every other device.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lane_backend::{BackendError, DeviceRegistry, STATE_DEVICE};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::device::DeviceSession;
use super::resolve::{resolve_serial, Target};
use crate::config::LaneSettings;
use crate::error::{LaneError, LaneResult, ResolutionError};

/// Default idle time before a cached session expires (10 minutes)
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(600);

/// Default time between health checks of a cached session
pub const DEFAULT_HEALTHCHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of connect retries after the first attempt
pub const DEFAULT_CONNECT_RETRIES: u32 = 2;

/// Default base delay for connect backoff
pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Session lifecycle policy
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPolicy {
    /// Serial used when the caller does not name one
    pub default_serial: Option<String>,
    /// Idle expiry; `None` disables expiry
    pub ttl: Option<Duration>,
    /// Minimum time between health checks; zero checks on every access
    pub healthcheck_interval: Duration,
    /// Retries after the first connect attempt
    pub connect_retries: u32,
    /// Backoff before retry `n` is `connect_backoff * 2^n`
    pub connect_backoff: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            default_serial: None,
            ttl: Some(DEFAULT_SESSION_TTL),
            healthcheck_interval: DEFAULT_HEALTHCHECK_INTERVAL,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            connect_backoff: DEFAULT_CONNECT_BACKOFF,
        }
    }
}

impl SessionPolicy {
    /// Build from validated settings.
    ///
    /// A non-positive TTL disables expiry, and so does one too large for a
    /// `Duration`. A non-positive interval forces a health check on every access.
    /// Oversized intervals and backoffs saturate.
    pub fn from_settings(settings: &LaneSettings) -> Self {
        let ttl = positive_seconds(settings.session_ttl_seconds).filter(|ttl| *ttl < Duration::MAX);
        Self {
            default_serial: settings.default_serial.clone(),
            ttl,
            healthcheck_interval: positive_seconds(settings.healthcheck_interval_seconds)
                .unwrap_or(Duration::ZERO),
            connect_retries: settings.connect_retries,
            connect_backoff: positive_seconds(settings.connect_backoff_seconds)
                .unwrap_or(Duration::ZERO),
        }
    }

    /// Set the default serial
    pub fn with_default_serial(mut self, serial: impl Into<String>) -> Self {
        self.default_serial = Some(serial.into());
        self
    }

    /// Set the idle TTL (`None` disables expiry)
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the health check interval
    pub fn with_healthcheck_interval(mut self, interval: Duration) -> Self {
        self.healthcheck_interval = interval;
        self
    }

    /// Set connect retries and backoff base
    pub fn with_connect_retry(mut self, retries: u32, backoff: Duration) -> Self {
        self.connect_retries = retries;
        self.connect_backoff = backoff;
        self
    }
}

/// `None` for non-positive or NaN seconds; values past `Duration::MAX` saturate
fn positive_seconds(seconds: f64) -> Option<Duration> {
    (seconds > 0.0).then(|| Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
}

/// Exponential backoff before the retry following attempt `attempt` (0-based)
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Point-in-time view of one cached session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub serial: String,
    pub session_id: String,
    pub age_ms: u64,
    pub idle_ms: u64,
    pub consecutive_failures: u32,
}

/// Creates and caches per-device sessions in a thread-safe way.
pub struct SessionManager {
    registry: Arc<dyn DeviceRegistry>,
    policy: SessionPolicy,
    sessions: Mutex<HashMap<String, Arc<DeviceSession>>>,
}

impl SessionManager {
    /// Create a manager over `registry`
    pub fn new(registry: Arc<dyn DeviceRegistry>, policy: SessionPolicy) -> Self {
        Self {
            registry,
            policy,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &Arc<dyn DeviceRegistry> {
        &self.registry
    }

    /// Resolve `target` to a concrete serial.
    ///
    /// The live device set is fetched on every call, never cached, so
    /// hot-plugged and unplugged devices are seen immediately.
    pub fn resolve_target(&self, target: &Target) -> LaneResult<String> {
        let live = self.registry.list_serials()?;
        let serial = resolve_serial(target, self.policy.default_serial.as_deref(), &live)?;
        Ok(serial)
    }

    /// Return a live session for `target`, creating, expiring or replacing the
    /// cached one as needed.
    pub fn get_session(&self, target: &Target) -> LaneResult<Arc<DeviceSession>> {
        let serial = self.resolve_target(target)?;

        let mut sessions = self.sessions.lock();

        let now = Instant::now();
        if let Some(existing) = sessions.get(&serial) {
            if existing.is_expired(now, self.policy.ttl) {
                debug!(
                    serial = %serial,
                    session_id = %existing.session_id(),
                    idle_ms = existing.idle_for().as_millis() as u64,
                    "session expired"
                );
                sessions.remove(&serial);
            }
        }

        let session = match sessions.get(&serial) {
            Some(existing) => Arc::clone(existing),
            None => {
                let created = Arc::new(self.create_with_retry(&serial)?);
                sessions.insert(serial.clone(), Arc::clone(&created));
                created
            }
        };

        let now = Instant::now();
        let session = if session.health_check_due(now, self.policy.healthcheck_interval) {
            match self.health_check(&session) {
                Ok(()) => {
                    session.record_health_success(now);
                    session
                }
                Err(err) => {
                    let failures = session.record_health_failure(now);
                    warn!(
                        serial = %serial,
                        session_id = %session.session_id(),
                        consecutive_failures = failures,
                        error = %err,
                        "health check failed; reconnecting"
                    );
                    sessions.remove(&serial);
                    let replacement = Arc::new(self.create_with_retry(&serial)?);
                    sessions.insert(serial.clone(), Arc::clone(&replacement));
                    replacement
                }
            }
        } else {
            session
        };

        session.touch(Instant::now());
        Ok(session)
    }

    /// Connect to `serial`, retrying with exponential backoff.
    ///
    /// Makes `connect_retries + 1` attempts and sleeps between them (never
    /// after the last). Called with the cache lock held.
    pub fn create_with_retry(&self, serial: &str) -> Result<DeviceSession, ResolutionError> {
        let attempts = self.policy.connect_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.connect(serial) {
                Ok(session) => {
                    info!(
                        serial = %serial,
                        session_id = %session.session_id(),
                        attempt = attempt + 1,
                        "session created"
                    );
                    return Ok(session);
                }
                Err(err) => {
                    if attempt + 1 < attempts {
                        let delay = backoff_delay(self.policy.connect_backoff, attempt);
                        warn!(
                            serial = %serial,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "connect failed; retrying"
                        );
                        thread::sleep(delay);
                    } else {
                        warn!(
                            serial = %serial,
                            attempt = attempt + 1,
                            error = %err,
                            "connect failed; giving up"
                        );
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(ResolutionError::ConnectFailed {
            serial: serial.to_string(),
            attempts,
            source: last_error.unwrap_or_else(|| BackendError::other("no connect attempt made")),
        })
    }

    fn connect(&self, serial: &str) -> Result<DeviceSession, BackendError> {
        let bridge = self.registry.bridge(serial)?;
        let ui = self.registry.connect_ui(serial)?;
        Ok(DeviceSession::new(serial, bridge, ui))
    }

    /// Liveness of both backend handles.
    pub fn health_check(&self, session: &DeviceSession) -> Result<(), BackendError> {
        let state = session.bridge().state()?;
        if state.trim() != STATE_DEVICE {
            return Err(BackendError::connection(format!("bridge state is '{}'", state.trim())));
        }
        session.ui().info()?;
        Ok(())
    }

    /// Drop the cached session for `serial`. Returns whether one existed.
    pub fn clear_session(&self, serial: &str) -> bool {
        let removed = self.sessions.lock().remove(serial);
        if let Some(session) = &removed {
            debug!(serial = %serial, session_id = %session.session_id(), "session cleared");
        }
        removed.is_some()
    }

    /// Drop every cached session. Returns how many were dropped.
    pub fn clear_all(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let count = sessions.len();
        sessions.clear();
        count
    }

    /// Serials with a cached session, sorted
    pub fn active_sessions(&self) -> Vec<String> {
        let mut serials: Vec<String> = self.sessions.lock().keys().cloned().collect();
        serials.sort();
        serials
    }

    /// Snapshot of every cached session, sorted by serial
    pub fn session_snapshots(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.lock();
        let mut snapshots: Vec<SessionSnapshot> = sessions
            .values()
            .map(|s| SessionSnapshot {
                serial: s.serial().to_string(),
                session_id: s.session_id().to_string(),
                age_ms: s.age().as_millis() as u64,
                idle_ms: s.idle_for().as_millis() as u64,
                consecutive_failures: s.consecutive_failures(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.serial.cmp(&b.serial));
        snapshots
    }

    /// Whether `error` is transient: safe to retry once on a fresh session.
    ///
    /// Only backend failures qualify. Resolution, validation and not-found
    /// errors never trigger eviction.
    pub fn should_retry_after_error(error: &LaneError) -> bool {
        match error {
            LaneError::Backend(err) => err.is_transient(),
            _ => false,
        }
    }
}
