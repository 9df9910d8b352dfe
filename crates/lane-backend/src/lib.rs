//! Device Lane Backend Contract
//!
//! Defines what the session core needs from the two external backends: a
//! device-bridge backend (enumeration, state, shell) and a UI-automation
//! backend (gestures and introspection), plus the tagged error type they
//! report failures with.

pub mod error;
pub mod registry;

pub use error::{
    message_looks_transient, BackendError, BackendResult, ErrorKind, TRANSIENT_MARKERS,
};
pub use registry::{BridgeHandle, DeviceInfo, DeviceRegistry, Selector, UiHandle, STATE_DEVICE};
