//! Pipeline and supervisor configuration

use neurodaq_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which modules make up the pipeline, by registry key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Registry key of the source
    pub source: String,
    /// Registry keys of the filters, in processing order
    #[serde(default)]
    pub filters: Vec<String>,
    /// Registry key of the application
    pub application: String,
    /// Registry keys of the plugins
    #[serde(default)]
    pub plugins: Vec<String>,
}

/// Supervisor tuning and telemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Capacity of the ingress hand-off buffer, in packages
    pub ingress_capacity: usize,
    /// Run-loop wait while processing is enabled, in milliseconds.
    /// Responsiveness/CPU tuning knob, not correctness-critical.
    pub busy_wait_ms: u64,
    /// Run-loop wait while idle, in milliseconds
    pub idle_wait_ms: u64,
    /// Telemetry/logging settings
    pub telemetry: TelemetryConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            ingress_capacity: 64,
            busy_wait_ms: 20,
            idle_wait_ms: 250,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl SupervisorConfig {
    pub fn busy_wait(&self) -> Duration {
        Duration::from_millis(self.busy_wait_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_from_json() {
        let json = r#"{
            "source": "synthetic",
            "filters": ["passthrough", "gain"],
            "application": "counting"
        }"#;
        let spec: PipelineSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.source, "synthetic");
        assert_eq!(spec.filters.len(), 2);
        assert!(spec.plugins.is_empty());
    }

    #[test]
    fn test_default_waits() {
        let config = SupervisorConfig::default();
        assert!(config.busy_wait() < config.idle_wait());
    }
}
