//! Error taxonomy for the device lane.

use lane_backend::BackendError;

/// A target device could not be resolved or connected.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("No connected Android devices found")]
    NoDevices,

    #[error("Multiple devices connected ({}). Please specify serial", serials.join(", "))]
    Ambiguous { serials: Vec<String> },

    #[error("Device not connected: {serial}")]
    NotConnected { serial: String },

    #[error("Failed to connect to {serial} after {attempts} attempt(s): {source}")]
    ConnectFailed {
        serial: String,
        attempts: u32,
        #[source]
        source: BackendError,
    },
}

/// Failure returned to callers of the lane.
#[derive(Debug, thiserror::Error)]
pub enum LaneError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid parameters: {0}")]
    Validation(String),

    #[error("UI element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Operation panicked: {0}")]
    OperationPanicked(String),

    #[error("Executor is shut down")]
    ExecutorClosed,
}

impl LaneError {
    /// Shorthand for a parameter validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        LaneError::Validation(message.into())
    }

    /// Stable error code for request-loop responses
    pub fn code(&self) -> String {
        match self {
            LaneError::Resolution(_) => "RESOLUTION_FAILED".to_string(),
            LaneError::Backend(err) => format!("BACKEND_{}", err.kind),
            LaneError::Validation(_) => "INVALID_PARAMS".to_string(),
            LaneError::ElementNotFound { .. } => "ELEMENT_NOT_FOUND".to_string(),
            LaneError::OperationPanicked(_) | LaneError::ExecutorClosed => "INTERNAL".to_string(),
        }
    }
}

/// Result type for lane operations
pub type LaneResult<T> = Result<T, LaneError>;
