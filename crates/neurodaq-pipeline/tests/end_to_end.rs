//! Full-pipeline integration: synthetic source through filters and
//! plugins into the application, with every log file read back.

use neurodaq_core::ModuleRegistry;
use neurodaq_pipeline::{PipelineSpec, PipelineSupervisor, SupervisorConfig};
use neurodaq_simulation::{
    CountingApplication, GainFilter, MeanPlugin, PassthroughFilter, SyntheticConfig,
    SyntheticSource, WaveformPattern,
};
use neurodaq_telemetry::{FrameReader, TelemetryConfig};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const PACKAGES: u64 = 100;

fn registry(processed: Arc<AtomicU64>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register_source("synthetic", || {
        Box::new(SyntheticSource::new(SyntheticConfig {
            channel_count: 2,
            sample_count: 1,
            rate: 100.0,
            pattern: WaveformPattern::Constant { level: 1.0 },
            noise_std: 0.0,
            seed: Some(1),
            package_limit: Some(PACKAGES),
        }))
    });
    registry.register_filter("passthrough", || Box::new(PassthroughFilter));
    registry.register_filter("gain", || Box::new(GainFilter::new(2.0)));
    registry.register_application("counting", move || {
        Box::new(CountingApplication::new(Arc::clone(&processed)))
    });
    registry.register_plugin("mean", || Box::new(MeanPlugin::new()));
    registry
}

fn pipeline_spec() -> PipelineSpec {
    PipelineSpec {
        source: "synthetic".to_string(),
        filters: vec!["passthrough".to_string(), "gain".to_string()],
        application: "counting".to_string(),
        plugins: vec!["mean".to_string()],
    }
}

fn supervisor_config(dir: &Path) -> SupervisorConfig {
    SupervisorConfig {
        telemetry: TelemetryConfig {
            data_dir: dir.to_path_buf(),
            identifier: "e2e".to_string(),
            log_source_input: true,
            log_pipeline: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

/// Find the single run file with `extension` anywhere under `root`
fn find_run_file(root: &Path, extension: &str) -> PathBuf {
    fn walk(dir: &Path, extension: &str, hits: &mut Vec<PathBuf>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, extension, hits);
            } else if path.extension().is_some_and(|e| e == extension) {
                hits.push(path);
            }
        }
    }
    let mut hits = Vec::new();
    walk(root, extension, &mut hits);
    assert_eq!(hits.len(), 1, "expected one .{} file, found {:?}", extension, hits);
    hits.remove(0)
}

#[test]
fn test_hundred_packages_end_to_end() {
    let dir = TempDir::new().unwrap();
    let processed = Arc::new(AtomicU64::new(0));
    let registry = registry(Arc::clone(&processed));

    let mut supervisor = PipelineSupervisor::new(supervisor_config(dir.path())).unwrap();
    supervisor.init_pipeline(&registry, &pipeline_spec()).unwrap();
    supervisor.configure_system().unwrap();
    supervisor.initialize_system().unwrap();
    supervisor.start().unwrap();

    // 100 packages at 100 Hz take about a second
    assert!(
        wait_until(
            || processed.load(Ordering::SeqCst) == PACKAGES && supervisor.queued_packages() == 0,
            Duration::from_secs(10),
        ),
        "only {} packages processed",
        processed.load(Ordering::SeqCst)
    );
    supervisor.stop(true);
    supervisor.destroy();

    // Source input file: one row per package, counter strictly
    // increasing, non-negative elapsed, both channels at the constant
    let mut src = FrameReader::new(File::open(find_run_file(dir.path(), "src")).unwrap()).unwrap();
    assert_eq!(src.row_count(), PACKAGES);
    assert_eq!(src.header().value_columns(), 2);
    assert!(src.header().has_elapsed());
    let mut previous: Option<u32> = None;
    for _ in 0..PACKAGES {
        let row = src.read_row().unwrap();
        if let Some(prev) = previous {
            assert_eq!(row.counter, prev.wrapping_add(1));
        }
        previous = Some(row.counter);
        assert!(row.elapsed.unwrap() >= 0.0);
        assert_eq!(row.values, vec![1.0, 1.0]);
    }

    // Pipeline file: the gain filter logged one RMS value per pass;
    // constant 1.0 through gain 2.0 gives an RMS of exactly 2.0
    let mut dat = FrameReader::new(File::open(find_run_file(dir.path(), "dat")).unwrap()).unwrap();
    assert_eq!(dat.row_count(), PACKAGES);
    assert_eq!(dat.header().value_columns(), 1);
    for _ in 0..PACKAGES {
        let row = dat.read_row().unwrap();
        assert!((row.values[0] - 2.0).abs() < 1e-12);
    }

    // Plugin file: buffered means were flushed before close
    let mut avg = FrameReader::new(File::open(find_run_file(dir.path(), "avg")).unwrap()).unwrap();
    assert_eq!(avg.row_count(), PACKAGES);
    for _ in 0..PACKAGES {
        let row = avg.read_row().unwrap();
        assert!(row.elapsed.is_none());
        assert!((row.values[0] - 2.0).abs() < 1e-12);
    }

    // Event log carries the run bracket, parameter snapshot is JSON
    // naming every module
    let events = std::fs::read_to_string(find_run_file(dir.path(), "evt")).unwrap();
    assert!(events.lines().count() >= 3);
    assert!(events.contains("run-start"));
    assert!(events.contains("run-stop"));

    let snapshot = std::fs::read_to_string(find_run_file(dir.path(), "prm")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
    assert!(parsed.get("SyntheticSource").is_some());
    assert!(parsed.get("GainFilter").is_some());
}

#[test]
fn test_second_run_gets_next_number() {
    let dir = TempDir::new().unwrap();
    let processed = Arc::new(AtomicU64::new(0));
    let registry = registry(Arc::clone(&processed));

    let mut supervisor = PipelineSupervisor::new(supervisor_config(dir.path())).unwrap();
    supervisor.init_pipeline(&registry, &pipeline_spec()).unwrap();
    supervisor.configure_system().unwrap();
    supervisor.initialize_system().unwrap();

    supervisor.start().unwrap();
    let first = supervisor.with_telemetry(|t| t.run_number());
    supervisor.stop(true);

    supervisor.start().unwrap();
    let second = supervisor.with_telemetry(|t| t.run_number());
    supervisor.stop(true);
    supervisor.destroy();

    assert_eq!(second, first + 1);
}

#[test]
fn test_deferred_log_stop_closes_files() {
    let dir = TempDir::new().unwrap();
    let processed = Arc::new(AtomicU64::new(0));
    let registry = registry(Arc::clone(&processed));

    let mut supervisor = PipelineSupervisor::new(supervisor_config(dir.path())).unwrap();
    supervisor.init_pipeline(&registry, &pipeline_spec()).unwrap();
    supervisor.configure_system().unwrap();
    supervisor.initialize_system().unwrap();
    supervisor.start().unwrap();

    wait_until(
        || processed.load(Ordering::SeqCst) == PACKAGES,
        Duration::from_secs(10),
    );
    supervisor.stop(false);
    // The run loop performs the actual log stop
    assert!(wait_until(
        || supervisor.with_telemetry(|t| !t.is_started()),
        Duration::from_secs(5),
    ));
    supervisor.destroy();

    let mut src = FrameReader::new(File::open(find_run_file(dir.path(), "src")).unwrap()).unwrap();
    assert_eq!(src.row_count(), PACKAGES);
}
