//! Device session lifecycle
//!
//! - `device`: the cached per-device session entity
//! - `resolve`: which-device resolution rules
//! - `manager`: the session cache (TTL, health checks, connect retry)

pub mod device;
pub mod manager;
pub mod resolve;

pub use device::DeviceSession;
pub use manager::{backoff_delay, SessionManager, SessionPolicy, SessionSnapshot};
pub use resolve::{resolve_serial, Target};
