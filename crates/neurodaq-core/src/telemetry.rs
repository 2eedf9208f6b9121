//! Telemetry seam between pipeline modules and the logging subsystem

use crate::error::DaqResult;
use serde::{Deserialize, Serialize};

/// Category a named scalar stream is registered under; the category
/// decides which log file (or observer set) its values end up in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamCategory {
    /// Raw values as delivered by the source (.src file)
    SourceInput,
    /// Values logged by filters/application during a pass (.dat file)
    Pipeline,
    /// Values fanned out to visualization observers, never written to disk
    Visualization,
}

impl StreamCategory {
    /// Stable lowercase name used in reports and events
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamCategory::SourceInput => "source-input",
            StreamCategory::Pipeline => "pipeline",
            StreamCategory::Visualization => "visualization",
        }
    }
}

/// Severity attached to every event-log entry, filterable through an
/// allow-list in the telemetry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
    /// Experiment markers (stimulus onsets, run boundaries)
    Marker,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSeverity::Debug => "debug",
            EventSeverity::Info => "info",
            EventSeverity::Warning => "warning",
            EventSeverity::Error => "error",
            EventSeverity::Marker => "marker",
        }
    }
}

/// Interface modules use to register streams (during configure) and to
/// log values and events (during passes).
///
/// Handed to modules by reference from the supervisor, replacing any
/// global logging state; implemented by `TelemetryLog`.
pub trait Telemetry {
    /// Register a named stream and return its ordinal index within the
    /// category. Only valid before the log is started.
    fn register_stream(&mut self, category: StreamCategory, name: &str) -> DaqResult<usize>;

    /// Append scalar values for the current pass in registration order.
    /// The accumulated count per category must match the registered
    /// stream count by the end of the pass.
    fn log_values(&mut self, category: StreamCategory, values: &[f64]);

    /// Append one entry to the text event log
    fn log_event(&mut self, severity: EventSeverity, code: &str, value: Option<f64>);

    /// Register a stream for a plugin's own log file
    fn register_plugin_stream(&mut self, plugin_id: usize, name: &str) -> DaqResult<usize>;

    /// Buffer values for a plugin's log file, tagged with the current
    /// pass counter
    fn log_plugin_values(&mut self, plugin_id: usize, values: &[f64]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names() {
        assert_eq!(StreamCategory::SourceInput.as_str(), "source-input");
        assert_eq!(StreamCategory::Pipeline.as_str(), "pipeline");
        assert_eq!(StreamCategory::Visualization.as_str(), "visualization");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(EventSeverity::Debug < EventSeverity::Error);
    }
}
