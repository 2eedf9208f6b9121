//! Lifecycle contracts for sources, filters, applications and plugins
//!
//! Every module follows the same fixed lifecycle driven by the supervisor:
//! configure -> initialize -> start -> (process...) -> stop -> destroy.
//! Module internals are out of the core's hands; the core only invokes
//! this contract.

use crate::error::DaqResult;
use crate::sample::{PackageFormat, SamplePackage};
use crate::telemetry::Telemetry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Hand-off point a running source delivers packages into.
///
/// The supervisor hands every source a sink that enqueues into the
/// ingress buffer; the source calls it from its own producer thread.
pub trait PackageSink: Send + Sync {
    /// Deliver one package; never blocks and never fails (on overflow
    /// the package is dropped and counted downstream)
    fn deliver(&self, package: SamplePackage);
}

/// Asynchronous producer at the head of the pipeline
pub trait SignalSource: Send {
    /// Module name used in reports and error messages
    fn name(&self) -> &str;

    /// Negotiate the format of the packages this source will produce
    /// and register its source-input streams
    fn configure(&mut self, telemetry: &mut dyn Telemetry) -> DaqResult<PackageFormat>;

    /// Acquire resources after a successful configure
    fn initialize(&mut self) -> DaqResult<()> {
        Ok(())
    }

    /// Begin producing packages into `sink`; called last during start so
    /// every downstream stage is ready before the first package arrives
    fn start(&mut self, sink: Arc<dyn PackageSink>) -> DaqResult<()>;

    /// Stop producing; called first during stop
    fn stop(&mut self) -> DaqResult<()> {
        Ok(())
    }

    /// Release all resources
    fn destroy(&mut self) {}

    /// Current parameter values for the per-run snapshot
    fn parameters(&self) -> ParameterSet {
        ParameterSet::default()
    }
}

impl std::fmt::Debug for dyn SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalSource").field("name", &self.name()).finish()
    }
}

/// One stage in the ordered transformation chain
pub trait SignalFilter: Send {
    fn name(&self) -> &str;

    /// Accept the upstream format and return the format this filter
    /// emits; also registers any pipeline streams this filter logs
    fn configure(
        &mut self,
        input: &PackageFormat,
        telemetry: &mut dyn Telemetry,
    ) -> DaqResult<PackageFormat>;

    fn initialize(&mut self) -> DaqResult<()> {
        Ok(())
    }

    fn start(&mut self) -> DaqResult<()> {
        Ok(())
    }

    /// Transform one package; output feeds the next filter in the chain
    fn process(
        &mut self,
        input: &SamplePackage,
        telemetry: &mut dyn Telemetry,
    ) -> DaqResult<SamplePackage>;

    fn stop(&mut self) -> DaqResult<()> {
        Ok(())
    }

    fn destroy(&mut self) {}

    fn parameters(&self) -> ParameterSet {
        ParameterSet::default()
    }
}

/// Consumer at the tail of the pipeline
pub trait Application: Send {
    fn name(&self) -> &str;

    fn configure(
        &mut self,
        input: &PackageFormat,
        telemetry: &mut dyn Telemetry,
    ) -> DaqResult<()>;

    fn initialize(&mut self) -> DaqResult<()> {
        Ok(())
    }

    fn start(&mut self) -> DaqResult<()> {
        Ok(())
    }

    /// Consume the fully filtered package
    fn process(
        &mut self,
        input: &SamplePackage,
        telemetry: &mut dyn Telemetry,
    ) -> DaqResult<()>;

    fn stop(&mut self) -> DaqResult<()> {
        Ok(())
    }

    fn destroy(&mut self) {}

    fn parameters(&self) -> ParameterSet {
        ParameterSet::default()
    }
}

/// Observer hooked in before and after the filter chain of every pass,
/// with its own buffered log file
pub trait Plugin: Send {
    fn name(&self) -> &str;

    /// Requested 3-letter file extension; the telemetry log resolves
    /// collisions and reserved names to a unique extension
    fn preferred_extension(&self) -> &str;

    /// Register this plugin's streams; `plugin_id` is the sequential id
    /// assigned by the telemetry log
    fn configure(&mut self, plugin_id: usize, telemetry: &mut dyn Telemetry) -> DaqResult<()>;

    fn initialize(&mut self) -> DaqResult<()> {
        Ok(())
    }

    fn start(&mut self) -> DaqResult<()> {
        Ok(())
    }

    /// Hook invoked with the raw package before the first filter
    fn pre_process(
        &mut self,
        input: &SamplePackage,
        telemetry: &mut dyn Telemetry,
    ) -> DaqResult<()> {
        let _ = (input, telemetry);
        Ok(())
    }

    /// Hook invoked with the filtered package after the last filter
    fn post_process(
        &mut self,
        output: &SamplePackage,
        telemetry: &mut dyn Telemetry,
    ) -> DaqResult<()> {
        let _ = (output, telemetry);
        Ok(())
    }

    fn stop(&mut self) -> DaqResult<()> {
        Ok(())
    }

    fn destroy(&mut self) {}

    fn parameters(&self) -> ParameterSet {
        ParameterSet::default()
    }
}

/// Parameter value types for snapshots and flexible configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
    FloatArray(Vec<f64>),
}

/// Ordered set of named parameter values reported by a module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    entries: Vec<(String, ParameterValue)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a parameter
    pub fn set(&mut self, name: &str, value: impl Into<ParameterValue>) {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value.into();
        } else {
            self.entries.push((name.to_string(), value.into()));
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Integer(value)
    }
}

impl From<usize> for ParameterValue {
    fn from(value: usize) -> Self {
        ParameterValue::Integer(value as i64)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Boolean(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<Vec<f64>> for ParameterValue {
    fn from(value: Vec<f64>) -> Self {
        ParameterValue::FloatArray(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_set() {
        let mut params = ParameterSet::new();
        params.set("rate", 100.0);
        params.set("channels", 2usize);
        params.set("label", "synthetic");

        assert_eq!(params.get("rate"), Some(&ParameterValue::Float(100.0)));
        assert_eq!(params.get("channels"), Some(&ParameterValue::Integer(2)));
        assert!(params.get("missing").is_none());

        // Replacement keeps the set ordered and deduplicated
        params.set("rate", 250.0);
        assert_eq!(params.get("rate"), Some(&ParameterValue::Float(250.0)));
        assert_eq!(params.iter().count(), 3);
    }
}
