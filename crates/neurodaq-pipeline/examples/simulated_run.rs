//! Run a short simulated acquisition and print where the logs landed.
//!
//! ```sh
//! cargo run --example simulated_run
//! ```

use anyhow::Result;
use neurodaq_core::ModuleRegistry;
use neurodaq_pipeline::{PipelineSpec, PipelineSupervisor, SupervisorConfig};
use neurodaq_simulation::{
    CountingApplication, GainFilter, MeanPlugin, SyntheticConfig, SyntheticSource, WaveformPattern,
};
use neurodaq_telemetry::TelemetryConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,neurodaq_pipeline=debug".into()),
        )
        .init();

    let processed = Arc::new(AtomicU64::new(0));

    let mut registry = ModuleRegistry::new();
    registry.register_source("synthetic", || {
        Box::new(SyntheticSource::new(SyntheticConfig {
            channel_count: 4,
            sample_count: 1,
            rate: 250.0,
            pattern: WaveformPattern::Sine {
                frequency: 10.0,
                amplitude: 1.0,
                baseline: 0.0,
            },
            noise_std: 0.05,
            seed: None,
            package_limit: None,
        }))
    });
    registry.register_filter("gain", || Box::new(GainFilter::new(1.5)));
    registry.register_application("counting", {
        let processed = Arc::clone(&processed);
        move || Box::new(CountingApplication::new(Arc::clone(&processed)))
    });
    registry.register_plugin("mean", || Box::new(MeanPlugin::new()));

    let spec = PipelineSpec {
        source: "synthetic".to_string(),
        filters: vec!["gain".to_string()],
        application: "counting".to_string(),
        plugins: vec!["mean".to_string()],
    };
    let config = SupervisorConfig {
        telemetry: TelemetryConfig {
            identifier: "demo".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut supervisor = PipelineSupervisor::new(config)?;
    supervisor.init_pipeline(&registry, &spec)?;
    supervisor.configure_system()?;
    supervisor.initialize_system()?;
    supervisor.start()?;

    println!("acquiring for 3 seconds...");
    thread::sleep(Duration::from_secs(3));

    supervisor.stop(true);
    println!(
        "processed {} packages; logs under ./data/",
        processed.load(Ordering::SeqCst)
    );
    supervisor.destroy();
    Ok(())
}
