//! Device Lane - per-device session lane for Android automation
//!
//! This crate resolves which device a caller means, keeps one health-checked
//! session per device, runs operations on a bounded worker pool with UI
//! operations serialized per device, and retries once after a transient
//! backend failure.

pub mod adb;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod logging;
pub mod mock;
pub mod ops;
pub mod serve;
pub mod session;
pub mod signal;

pub use config::{EffectiveConfig, LaneSettings};
pub use dispatcher::Dispatcher;
pub use error::{LaneError, LaneResult, ResolutionError};
pub use executor::DeviceExecutor;
pub use logging::init_logging;
pub use serve::serve;
pub use session::{DeviceSession, SessionManager, SessionPolicy, SessionSnapshot, Target};
