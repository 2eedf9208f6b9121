//! Clocked synthetic source producing packages on its own thread

use crate::waveform::WaveformPattern;
use neurodaq_core::{
    DaqResult, PackageFormat, PackageSink, ParameterSet, SamplePackage, SignalSource,
    StreamCategory, Telemetry, ValueOrder,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Configuration for synthetic signal generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Number of channels to generate
    pub channel_count: usize,
    /// Samples per channel per package
    pub sample_count: usize,
    /// Package rate in Hz
    pub rate: f64,
    /// Deterministic waveform shared by all channels (phase-shifted)
    pub pattern: WaveformPattern,
    /// Standard deviation of additive Gaussian noise; 0 disables it
    pub noise_std: f64,
    /// Random seed for reproducible noise
    pub seed: Option<u64>,
    /// Stop after this many packages; None streams until stopped
    pub package_limit: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            channel_count: 2,
            sample_count: 1,
            rate: 100.0,
            pattern: WaveformPattern::default(),
            noise_std: 0.0,
            seed: None,
            package_limit: None,
        }
    }
}

/// Signal source generating waveform packages at a fixed rate.
///
/// The producer thread paces itself against a monotonic deadline so
/// generation cost doesn't accumulate into drift.
pub struct SyntheticSource {
    config: SyntheticConfig,
    running: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        SyntheticSource {
            config,
            running: Arc::new(AtomicBool::new(false)),
            producer: None,
        }
    }

    fn format(&self) -> PackageFormat {
        PackageFormat::new(
            self.config.channel_count,
            self.config.sample_count,
            self.config.rate,
            ValueOrder::SampleMajor,
        )
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

impl SignalSource for SyntheticSource {
    fn name(&self) -> &str {
        "SyntheticSource"
    }

    fn configure(&mut self, telemetry: &mut dyn Telemetry) -> DaqResult<PackageFormat> {
        let format = self.format();
        format.validate()?;
        for channel in 0..self.config.channel_count {
            telemetry.register_stream(StreamCategory::SourceInput, &format!("Ch{}", channel + 1))?;
        }
        Ok(format)
    }

    fn start(&mut self, sink: Arc<dyn PackageSink>) -> DaqResult<()> {
        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let config = self.config.clone();
        let format = self.format();

        self.producer = Some(
            thread::Builder::new()
                .name("synthetic-source".to_string())
                .spawn(move || produce(config, format, running, sink))?,
        );
        Ok(())
    }

    fn stop(&mut self) -> DaqResult<()> {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                warn!("synthetic producer thread panicked");
            }
        }
        Ok(())
    }

    fn parameters(&self) -> ParameterSet {
        let mut params = ParameterSet::new();
        params.set("channel_count", self.config.channel_count);
        params.set("sample_count", self.config.sample_count);
        params.set("rate", self.config.rate);
        params.set("pattern", self.config.pattern.label());
        params.set("noise_std", self.config.noise_std);
        params
    }
}

fn produce(
    config: SyntheticConfig,
    format: PackageFormat,
    running: Arc<AtomicBool>,
    sink: Arc<dyn PackageSink>,
) {
    let interval = Duration::from_secs_f64(1.0 / config.rate);
    let sample_rate = config.rate * config.sample_count as f64;
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let noise = (config.noise_std > 0.0)
        .then(|| Normal::new(0.0, config.noise_std))
        .transpose()
        .unwrap_or_else(|_| {
            warn!("invalid noise configuration, noise disabled");
            None
        });

    let mut deadline = Instant::now();
    let mut produced: u64 = 0;
    let mut sample_index: u64 = 0;

    while running.load(Ordering::Acquire) {
        if let Some(limit) = config.package_limit {
            if produced >= limit {
                debug!(produced, "package limit reached, producer idle");
                running.store(false, Ordering::Release);
                break;
            }
        }

        let mut values = Vec::with_capacity(format.value_count());
        for sample in 0..config.sample_count {
            let t = (sample_index + sample as u64) as f64 / sample_rate;
            for channel in 0..config.channel_count {
                let mut v = config.pattern.value(t, channel);
                if let Some(noise) = &noise {
                    v += noise.sample(&mut rng);
                }
                values.push(v);
            }
        }
        sample_index += config.sample_count as u64;

        match SamplePackage::new(values, format) {
            Ok(package) => sink.deliver(package),
            Err(e) => warn!(error = %e, "dropped malformed synthetic package"),
        }
        produced += 1;

        deadline += interval;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else {
            // Fell behind; re-anchor instead of bursting to catch up
            deadline = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CollectingSink {
        packages: Mutex<Vec<SamplePackage>>,
    }

    impl PackageSink for CollectingSink {
        fn deliver(&self, package: SamplePackage) {
            self.packages.lock().unwrap().push(package);
        }
    }

    struct NullTelemetry {
        registered: Vec<String>,
    }

    impl Telemetry for NullTelemetry {
        fn register_stream(&mut self, _category: StreamCategory, name: &str) -> DaqResult<usize> {
            self.registered.push(name.to_string());
            Ok(self.registered.len() - 1)
        }

        fn log_values(&mut self, _category: StreamCategory, _values: &[f64]) {}

        fn log_event(
            &mut self,
            _severity: neurodaq_core::EventSeverity,
            _code: &str,
            _value: Option<f64>,
        ) {
        }

        fn register_plugin_stream(&mut self, _plugin_id: usize, _name: &str) -> DaqResult<usize> {
            Ok(0)
        }

        fn log_plugin_values(&mut self, _plugin_id: usize, _values: &[f64]) {}
    }

    #[test]
    fn test_configure_registers_one_stream_per_channel() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            channel_count: 3,
            ..Default::default()
        });
        let mut telemetry = NullTelemetry {
            registered: Vec::new(),
        };
        let format = source.configure(&mut telemetry).unwrap();
        assert_eq!(format.channel_count, 3);
        assert_eq!(telemetry.registered, vec!["Ch1", "Ch2", "Ch3"]);
    }

    #[test]
    fn test_package_limit_stops_production() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            rate: 1000.0,
            package_limit: Some(20),
            seed: Some(7),
            ..Default::default()
        });
        let sink = Arc::new(CollectingSink {
            packages: Mutex::new(Vec::new()),
        });
        source.start(Arc::clone(&sink) as Arc<dyn PackageSink>).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.packages.lock().unwrap().len() < 20 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        source.stop().unwrap();
        assert_eq!(sink.packages.lock().unwrap().len(), 20);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let run = |seed| {
            let mut source = SyntheticSource::new(SyntheticConfig {
                pattern: WaveformPattern::Constant { level: 0.0 },
                noise_std: 1.0,
                seed: Some(seed),
                rate: 1000.0,
                package_limit: Some(5),
                ..Default::default()
            });
            let sink = Arc::new(CollectingSink {
                packages: Mutex::new(Vec::new()),
            });
            source
                .start(Arc::clone(&sink) as Arc<dyn PackageSink>)
                .unwrap();
            let deadline = Instant::now() + Duration::from_secs(5);
            while sink.packages.lock().unwrap().len() < 5 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            source.stop().unwrap();
            let packages = sink.packages.lock().unwrap();
            packages.iter().flat_map(|p| p.values.clone()).collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }
}
