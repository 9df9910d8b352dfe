//! The cached unit of state for one device.

use std::fmt;
use std::time::{Duration, Instant};

use lane_backend::{BridgeHandle, UiHandle};
use parking_lot::{Mutex, MutexGuard};
use ulid::Ulid;

/// Timestamps and failure count. Mutated only by the session manager while it
/// holds the cache lock.
#[derive(Debug, Clone, Copy)]
struct SessionClock {
    last_used_at: Instant,
    last_health_check_at: Instant,
    consecutive_failures: u32,
}

/// Backend handles plus bookkeeping for one connected device.
///
/// Handles are owned exclusively by this session and dropped with it.
pub struct DeviceSession {
    serial: String,
    session_id: Ulid,
    bridge: Box<dyn BridgeHandle>,
    ui: Box<dyn UiHandle>,
    ui_lock: Mutex<()>,
    created_at: Instant,
    clock: Mutex<SessionClock>,
}

impl DeviceSession {
    /// Wrap freshly obtained handles in a new session
    pub fn new(
        serial: impl Into<String>,
        bridge: Box<dyn BridgeHandle>,
        ui: Box<dyn UiHandle>,
    ) -> Self {
        let now = Instant::now();
        Self {
            serial: serial.into(),
            session_id: Ulid::new(),
            bridge,
            ui,
            ui_lock: Mutex::new(()),
            created_at: now,
            clock: Mutex::new(SessionClock {
                last_used_at: now,
                last_health_check_at: now,
                consecutive_failures: 0,
            }),
        }
    }

    /// Device serial (cache key)
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Identifier unique to this session instance
    pub fn session_id(&self) -> Ulid {
        self.session_id
    }

    /// Device-bridge handle
    pub fn bridge(&self) -> &dyn BridgeHandle {
        self.bridge.as_ref()
    }

    /// UI-automation handle
    pub fn ui(&self) -> &dyn UiHandle {
        self.ui.as_ref()
    }

    /// Acquire the per-device UI lock. Only UI-affecting operations take it.
    pub(crate) fn lock_ui(&self) -> MutexGuard<'_, ()> {
        self.ui_lock.lock()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.clock.lock().last_used_at
    }

    pub fn last_health_check_at(&self) -> Instant {
        self.clock.lock().last_health_check_at
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.clock.lock().consecutive_failures
    }

    /// Time since the session was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the session was last handed out
    pub fn idle_for(&self) -> Duration {
        self.last_used_at().elapsed()
    }

    /// Expired when idle strictly longer than `ttl`. `None` never expires.
    pub(crate) fn is_expired(&self, now: Instant, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => now.saturating_duration_since(self.last_used_at()) > ttl,
            None => false,
        }
    }

    /// A zero interval makes every access due.
    pub(crate) fn health_check_due(&self, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(self.last_health_check_at()) >= interval
    }

    pub(crate) fn touch(&self, now: Instant) {
        self.clock.lock().last_used_at = now;
    }

    pub(crate) fn record_health_success(&self, now: Instant) {
        let mut clock = self.clock.lock();
        clock.last_health_check_at = now;
        clock.consecutive_failures = 0;
    }

    /// Returns the updated failure count
    pub(crate) fn record_health_failure(&self, now: Instant) -> u32 {
        let mut clock = self.clock.lock();
        clock.last_health_check_at = now;
        clock.consecutive_failures += 1;
        clock.consecutive_failures
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = *self.clock.lock();
        f.debug_struct("DeviceSession")
            .field("serial", &self.serial)
            .field("session_id", &self.session_id)
            .field("created_at", &self.created_at)
            .field("last_used_at", &clock.last_used_at)
            .field("last_health_check_at", &clock.last_health_check_at)
            .field("consecutive_failures", &clock.consecutive_failures)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRegistry;
    use lane_backend::DeviceRegistry;

    fn session(serial: &str) -> DeviceSession {
        let registry = MockRegistry::with_serials([serial]);
        DeviceSession::new(
            serial,
            registry.bridge(serial).unwrap(),
            registry.connect_ui(serial).unwrap(),
        )
    }

    #[test]
    fn test_new_session_ids_differ() {
        let a = session("A");
        let b = session("A");
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(a.serial(), "A");
        assert_eq!(a.consecutive_failures(), 0);
    }

    #[test]
    fn test_expiry() {
        let s = session("A");
        let later = s.last_used_at() + Duration::from_millis(50);

        assert!(s.is_expired(later, Some(Duration::from_millis(10))));
        assert!(!s.is_expired(later, Some(Duration::from_secs(10))));
        assert!(!s.is_expired(later, None));
    }

    #[test]
    fn test_touch_resets_idle() {
        let s = session("A");
        let later = s.last_used_at() + Duration::from_millis(50);
        s.touch(later);
        assert!(!s.is_expired(later, Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_health_due() {
        let s = session("A");
        let now = s.last_health_check_at();

        assert!(s.health_check_due(now, Duration::ZERO));
        assert!(!s.health_check_due(now, Duration::from_secs(30)));
        assert!(s.health_check_due(now + Duration::from_secs(30), Duration::from_secs(30)));
    }

    #[test]
    fn test_health_bookkeeping() {
        let s = session("A");
        let now = Instant::now();

        assert_eq!(s.record_health_failure(now), 1);
        assert_eq!(s.record_health_failure(now), 2);
        s.record_health_success(now);
        assert_eq!(s.consecutive_failures(), 0);
    }
}
