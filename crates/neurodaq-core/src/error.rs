//! Error handling for the NeuroDAQ framework

use thiserror::Error;

/// Result type alias for NeuroDAQ operations
pub type DaqResult<T> = Result<T, DaqError>;

/// Error type shared by all framework operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DaqError {
    /// A module could not be configured
    #[error("configuration of '{module}' failed: {reason}")]
    Configuration {
        /// Name of the module that rejected its configuration
        module: String,
        /// Description of the failure
        reason: String,
    },

    /// No factory is registered under the requested key
    #[error("no {kind} registered under '{key}'")]
    UnknownModule {
        /// Module kind: "source", "filter", "application" or "plugin"
        kind: &'static str,
        /// Registry key that failed to resolve
        key: String,
    },

    /// An operation was attempted in the wrong lifecycle state
    #[error("invalid state: {reason}")]
    InvalidState {
        /// What precondition was violated
        reason: String,
    },

    /// Package data does not match its declared format
    #[error("invalid sample data: {reason}")]
    InvalidSampleData { reason: String },

    /// Logged value count differs from the registered stream count
    #[error("stream integrity violation in {category}: expected {expected} values, got {actual}")]
    StreamIntegrity {
        category: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Malformed binary frame header or row
    #[error("frame format error: {reason}")]
    FrameFormat { reason: String },

    /// A read moved past the end of the recorded rows
    #[error("read past end of frame data: row {requested} of {available}")]
    ReadPastEnd { requested: u64, available: u64 },

    /// A module failed at runtime during a pass
    #[error("module '{module}' failed during {operation}: {reason}")]
    ModuleRuntime {
        module: String,
        operation: &'static str,
        reason: String,
    },

    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaqError {
    /// Configuration error for a named module
    pub fn configuration(module: impl Into<String>, reason: impl Into<String>) -> Self {
        DaqError::Configuration {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Lifecycle precondition violation
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        DaqError::InvalidState {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DaqError::configuration("SynthSource", "rate must be positive");
        let display = format!("{}", error);
        assert!(display.contains("SynthSource"));
        assert!(display.contains("rate must be positive"));
    }

    #[test]
    fn test_integrity_display() {
        let error = DaqError::StreamIntegrity {
            category: "pipeline",
            expected: 4,
            actual: 2,
        };
        let display = format!("{}", error);
        assert!(display.contains("expected 4"));
        assert!(display.contains("got 2"));
    }
}
