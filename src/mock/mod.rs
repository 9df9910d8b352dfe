//! Mock Backend Implementation
//!
//! An in-process [`lane_backend::DeviceRegistry`] for tests and for running
//! the request loop without real devices.
//!
//! Supports:
//! - hot-plugging devices in and out of the live set
//! - marking devices unhealthy (state "offline", UI introspection fails)
//! - on-screen elements for selector clicks
//! - per-call failure injection with fail-N-times-then-succeed semantics
//! - call counters and a gesture log for assertions

mod failure;
mod registry;

pub use failure::{BackendCall, FailureConfig, FailureInjector};
pub use registry::{MockGesture, MockRegistry};
