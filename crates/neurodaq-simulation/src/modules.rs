//! Reference filters, applications and plugins for pipeline tests

use neurodaq_core::{
    Application, DaqResult, PackageFormat, ParameterSet, Plugin, SamplePackage, SignalFilter,
    StreamCategory, Telemetry,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Filter that forwards packages untouched
#[derive(Default)]
pub struct PassthroughFilter;

impl SignalFilter for PassthroughFilter {
    fn name(&self) -> &str {
        "PassthroughFilter"
    }

    fn configure(
        &mut self,
        input: &PackageFormat,
        _telemetry: &mut dyn Telemetry,
    ) -> DaqResult<PackageFormat> {
        Ok(*input)
    }

    fn process(
        &mut self,
        input: &SamplePackage,
        _telemetry: &mut dyn Telemetry,
    ) -> DaqResult<SamplePackage> {
        Ok(input.clone())
    }
}

/// Filter scaling every value by a constant gain; logs the RMS of each
/// output package as a pipeline stream
pub struct GainFilter {
    gain: f64,
}

impl GainFilter {
    pub fn new(gain: f64) -> Self {
        GainFilter { gain }
    }
}

impl Default for GainFilter {
    fn default() -> Self {
        GainFilter::new(1.0)
    }
}

impl SignalFilter for GainFilter {
    fn name(&self) -> &str {
        "GainFilter"
    }

    fn configure(
        &mut self,
        input: &PackageFormat,
        telemetry: &mut dyn Telemetry,
    ) -> DaqResult<PackageFormat> {
        telemetry.register_stream(StreamCategory::Pipeline, "Gain_RMS")?;
        Ok(*input)
    }

    fn process(
        &mut self,
        input: &SamplePackage,
        telemetry: &mut dyn Telemetry,
    ) -> DaqResult<SamplePackage> {
        let values: Vec<f64> = input.values.iter().map(|v| v * self.gain).collect();
        let rms = if values.is_empty() {
            0.0
        } else {
            (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
        };
        telemetry.log_values(StreamCategory::Pipeline, &[rms]);
        input.with_values(values)
    }

    fn parameters(&self) -> ParameterSet {
        let mut params = ParameterSet::new();
        params.set("gain", self.gain);
        params
    }
}

/// Application that counts processed packages; the shared counter lets
/// tests observe progress from outside the pipeline
#[derive(Default)]
pub struct CountingApplication {
    processed: Arc<AtomicU64>,
}

impl CountingApplication {
    pub fn new(processed: Arc<AtomicU64>) -> Self {
        CountingApplication { processed }
    }

    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.processed)
    }
}

impl Application for CountingApplication {
    fn name(&self) -> &str {
        "CountingApplication"
    }

    fn configure(
        &mut self,
        _input: &PackageFormat,
        _telemetry: &mut dyn Telemetry,
    ) -> DaqResult<()> {
        Ok(())
    }

    fn process(
        &mut self,
        _input: &SamplePackage,
        _telemetry: &mut dyn Telemetry,
    ) -> DaqResult<()> {
        self.processed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Plugin writing the per-package mean of the filtered output into its
/// own log file
pub struct MeanPlugin {
    plugin_id: Option<usize>,
}

impl MeanPlugin {
    pub fn new() -> Self {
        MeanPlugin { plugin_id: None }
    }
}

impl Default for MeanPlugin {
    fn default() -> Self {
        MeanPlugin::new()
    }
}

impl Plugin for MeanPlugin {
    fn name(&self) -> &str {
        "MeanPlugin"
    }

    fn preferred_extension(&self) -> &str {
        "avg"
    }

    fn configure(&mut self, plugin_id: usize, telemetry: &mut dyn Telemetry) -> DaqResult<()> {
        self.plugin_id = Some(plugin_id);
        telemetry.register_plugin_stream(plugin_id, "Mean")?;
        Ok(())
    }

    fn post_process(
        &mut self,
        output: &SamplePackage,
        telemetry: &mut dyn Telemetry,
    ) -> DaqResult<()> {
        if let Some(plugin_id) = self.plugin_id {
            let mean = if output.values.is_empty() {
                0.0
            } else {
                output.values.iter().sum::<f64>() / output.values.len() as f64
            };
            telemetry.log_plugin_values(plugin_id, &[mean]);
        }
        Ok(())
    }
}
