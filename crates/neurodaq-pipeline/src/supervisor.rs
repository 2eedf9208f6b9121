//! Pipeline supervisor: lifecycle state machine and run loop
//!
//! Owns the source, filter chain, application and plugins, drives them
//! through configure -> initialize -> start -> run -> stop -> destroy,
//! and runs every pass on a single consumer thread. The producing
//! source and the run loop meet only at the ingress buffer and the
//! pipeline lock.

use crate::config::{PipelineSpec, SupervisorConfig};
use crate::ingress::SampleIngressBuffer;
use crate::snapshot::JsonParameterSnapshot;
use crossbeam_channel::{bounded, Receiver, Sender};
use neurodaq_core::{
    Application, DaqError, DaqResult, EventSeverity, ModuleRegistry, PackageFormat, PackageSink,
    ParameterSet, Plugin, SamplePackage, SignalFilter, SignalSource, Telemetry,
};
use neurodaq_telemetry::{TelemetryLog, VisualizationSink};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

struct PipelineState {
    source: Option<Box<dyn SignalSource>>,
    filters: Vec<Box<dyn SignalFilter>>,
    application: Option<Box<dyn Application>>,
    plugins: Vec<Box<dyn Plugin>>,
    telemetry: TelemetryLog,
    source_format: Option<PackageFormat>,
    configured: bool,
    initialized: bool,
    started: bool,
    stop_log_pending: bool,
}

struct Shared {
    pipeline: Mutex<PipelineState>,
    ingress: SampleIngressBuffer,
    notify: Sender<()>,
    alive: AtomicBool,
    processing: AtomicBool,
}

/// Enqueue handle the supervisor hands to the source
struct IngressSink {
    shared: Arc<Shared>,
}

impl PackageSink for IngressSink {
    fn deliver(&self, package: SamplePackage) {
        if !self.shared.processing.load(Ordering::Acquire) {
            return;
        }
        // Hot path: no logging here; overflow is counted inside the
        // buffer and summarized by the run loop
        if self.shared.ingress.push(package) {
            let _ = self.shared.notify.try_send(());
        }
    }
}

/// Supervises one acquisition pipeline from instantiation to teardown
pub struct PipelineSupervisor {
    shared: Arc<Shared>,
    sink: Arc<IngressSink>,
    run_thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PipelineSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSupervisor").finish_non_exhaustive()
    }
}

impl PipelineSupervisor {
    /// Create the supervisor and spawn its run-loop thread
    pub fn new(config: SupervisorConfig) -> DaqResult<Self> {
        if config.ingress_capacity == 0 {
            return Err(DaqError::configuration(
                "PipelineSupervisor",
                "ingress capacity must be at least 1",
            ));
        }
        let (notify_tx, notify_rx) = bounded(1);
        let shared = Arc::new(Shared {
            pipeline: Mutex::new(PipelineState {
                source: None,
                filters: Vec::new(),
                application: None,
                plugins: Vec::new(),
                telemetry: TelemetryLog::new(config.telemetry.clone()),
                source_format: None,
                configured: false,
                initialized: false,
                started: false,
                stop_log_pending: false,
            }),
            ingress: SampleIngressBuffer::new(config.ingress_capacity),
            notify: notify_tx,
            alive: AtomicBool::new(true),
            processing: AtomicBool::new(false),
        });

        let run_thread = thread::Builder::new()
            .name("neurodaq-run-loop".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                let busy_wait = config.busy_wait();
                let idle_wait = config.idle_wait();
                move || run_loop(shared, notify_rx, busy_wait, idle_wait)
            })?;

        let sink = Arc::new(IngressSink {
            shared: Arc::clone(&shared),
        });
        Ok(PipelineSupervisor {
            shared,
            sink,
            run_thread: Some(run_thread),
        })
    }

    /// Instantiate source, filters, application and plugins from the
    /// registry; any unresolved key aborts before anything is replaced
    pub fn init_pipeline(&self, registry: &ModuleRegistry, spec: &PipelineSpec) -> DaqResult<()> {
        let source = registry.create_source(&spec.source).inspect_err(report)?;
        let mut filters = Vec::with_capacity(spec.filters.len());
        for key in &spec.filters {
            filters.push(registry.create_filter(key).inspect_err(report)?);
        }
        let application = registry
            .create_application(&spec.application)
            .inspect_err(report)?;
        let mut plugins = Vec::with_capacity(spec.plugins.len());
        for key in &spec.plugins {
            plugins.push(registry.create_plugin(key).inspect_err(report)?);
        }

        let mut st = self.shared.pipeline.lock();
        if st.started {
            return Err(DaqError::invalid_state(
                "pipeline cannot be replaced while started",
            ));
        }
        st.source = Some(source);
        st.filters = filters;
        st.application = Some(application);
        st.plugins = plugins;
        st.source_format = None;
        st.configured = false;
        st.initialized = false;
        debug!(
            source = %spec.source,
            filters = spec.filters.len(),
            plugins = spec.plugins.len(),
            "pipeline instantiated"
        );
        Ok(())
    }

    /// Configure telemetry, plugins, source, filters (threading the
    /// package format forward) and application, in that order. The
    /// first failure aborts with the failing module's name. Safe to
    /// call again after a failure; registrations restart from scratch.
    pub fn configure_system(&self) -> DaqResult<()> {
        let mut st = self.shared.pipeline.lock();
        if st.started {
            return Err(DaqError::invalid_state("cannot configure while started"));
        }
        st.configured = false;
        st.initialized = false;

        let format = configure_chain(&mut st).inspect_err(report)?;
        st.source_format = Some(format);
        st.configured = true;
        debug!(?format, "system configured");
        Ok(())
    }

    /// Initialize plugins, source, filters and application, in that
    /// order. Requires a successful configure. No rollback happens on
    /// partial failure; re-run configure + initialize to recover.
    pub fn initialize_system(&self) -> DaqResult<()> {
        let mut st = self.shared.pipeline.lock();
        if !st.configured {
            return Err(DaqError::invalid_state(
                "initialize requires a configured system",
            ));
        }

        let PipelineState {
            source,
            filters,
            application,
            plugins,
            ..
        } = &mut *st;
        for plugin in plugins.iter_mut() {
            plugin
                .initialize()
                .map_err(|e| lifecycle_err(plugin.name(), "initialize", e))
                .inspect_err(report)?;
        }
        if let Some(source) = source.as_mut() {
            source
                .initialize()
                .map_err(|e| lifecycle_err(source.name(), "initialize", e))
                .inspect_err(report)?;
        }
        for filter in filters.iter_mut() {
            filter
                .initialize()
                .map_err(|e| lifecycle_err(filter.name(), "initialize", e))
                .inspect_err(report)?;
        }
        if let Some(application) = application.as_mut() {
            application
                .initialize()
                .map_err(|e| lifecycle_err(application.name(), "initialize", e))
                .inspect_err(report)?;
        }

        st.initialized = true;
        debug!("system initialized");
        Ok(())
    }

    /// Open this run's log files and start every stage, the source
    /// last, so no package can arrive before downstream is ready.
    /// A failure unwinds the partially started stages, leaving the
    /// system never-started.
    pub fn start(&self) -> DaqResult<()> {
        let mut st = self.shared.pipeline.lock();
        if !st.configured || !st.initialized {
            return Err(DaqError::invalid_state(
                "start requires a configured and initialized system",
            ));
        }
        if st.started {
            warn!("start called on an already started pipeline");
            return Err(DaqError::invalid_state("pipeline already started"));
        }

        let sections = collect_parameters(&st);
        st.telemetry
            .set_parameter_snapshot(Box::new(JsonParameterSnapshot::new(sections)));
        st.telemetry.start().inspect_err(report)?;
        st.stop_log_pending = false;

        if let Err(e) = start_stages(&mut st, &self.shared, &self.sink) {
            report(&e);
            unwind_start(&mut st, &self.shared);
            return Err(e);
        }

        st.started = true;
        let _ = self.shared.notify.try_send(());
        debug!(run = st.telemetry.run_number(), "pipeline started");
        Ok(())
    }

    /// Stop the pipeline: source first, then processing, filters,
    /// application and plugins. The telemetry log is stopped now or,
    /// when `stop_log_immediately` is false, by the run loop on its
    /// next iteration. No-op when not started.
    pub fn stop(&self, stop_log_immediately: bool) {
        let mut st = self.shared.pipeline.lock();
        if !st.started {
            debug!("stop ignored, pipeline not started");
            return;
        }

        if let Some(source) = st.source.as_mut() {
            if let Err(e) = source.stop() {
                error!(module = source.name(), error = %e, "source stop failed");
            }
        }
        self.shared.processing.store(false, Ordering::Release);

        for filter in st.filters.iter_mut() {
            if let Err(e) = filter.stop() {
                error!(module = filter.name(), error = %e, "filter stop failed");
            }
        }
        if let Some(application) = st.application.as_mut() {
            if let Err(e) = application.stop() {
                error!(module = application.name(), error = %e, "application stop failed");
            }
        }
        for plugin in st.plugins.iter_mut() {
            if let Err(e) = plugin.stop() {
                error!(module = plugin.name(), error = %e, "plugin stop failed");
            }
        }

        if stop_log_immediately {
            st.telemetry.stop();
        } else {
            st.stop_log_pending = true;
        }
        st.started = false;
        drop(st);
        let _ = self.shared.notify.try_send(());
        debug!("pipeline stopped");
    }

    /// Producer-side entry point: enqueue one package for the run loop.
    /// Called from the source's thread; never blocks on the pipeline.
    pub fn event_new_sample(&self, package: SamplePackage) {
        self.sink.deliver(package);
    }

    /// Enqueue handle for sources running on their own threads
    pub fn package_sink(&self) -> Arc<dyn PackageSink> {
        Arc::clone(&self.sink) as Arc<dyn PackageSink>
    }

    /// Tear everything down: defensive stop, destroy every module in
    /// order, then join the run-loop thread
    pub fn destroy(&mut self) {
        self.stop(true);
        {
            let mut st = self.shared.pipeline.lock();
            if let Some(mut source) = st.source.take() {
                source.destroy();
            }
            for mut filter in st.filters.drain(..) {
                filter.destroy();
            }
            if let Some(mut application) = st.application.take() {
                application.destroy();
            }
            for mut plugin in st.plugins.drain(..) {
                plugin.destroy();
            }
            st.telemetry.stop();
            st.stop_log_pending = false;
            st.configured = false;
            st.initialized = false;
        }
        self.shared.alive.store(false, Ordering::Release);
        let _ = self.shared.notify.try_send(());
        if let Some(handle) = self.run_thread.take() {
            let _ = handle.join();
        }
    }

    /// Attach a visualization observer to the telemetry log
    pub fn add_visualization_sink(&self, sink: Box<dyn VisualizationSink>) {
        self.shared.pipeline.lock().telemetry.add_visualization_sink(sink);
    }

    /// Run a closure against the telemetry log under the pipeline lock
    pub fn with_telemetry<R>(&self, f: impl FnOnce(&TelemetryLog) -> R) -> R {
        let st = self.shared.pipeline.lock();
        f(&st.telemetry)
    }

    /// Format negotiated with the source during the last configure
    pub fn source_format(&self) -> Option<PackageFormat> {
        self.shared.pipeline.lock().source_format
    }

    pub fn is_configured(&self) -> bool {
        self.shared.pipeline.lock().configured
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.pipeline.lock().initialized
    }

    pub fn is_started(&self) -> bool {
        self.shared.pipeline.lock().started
    }

    /// Packages currently waiting in the ingress buffer
    pub fn queued_packages(&self) -> usize {
        self.shared.ingress.len()
    }
}

impl Drop for PipelineSupervisor {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn report(e: &DaqError) {
    error!(error = %e, "pipeline operation failed");
}

fn lifecycle_err(module: &str, operation: &'static str, e: DaqError) -> DaqError {
    match e {
        DaqError::ModuleRuntime { .. } | DaqError::Configuration { .. } => e,
        other => DaqError::ModuleRuntime {
            module: module.to_string(),
            operation,
            reason: other.to_string(),
        },
    }
}

fn configure_err(module: &str, e: DaqError) -> DaqError {
    match e {
        DaqError::Configuration { .. } => e,
        other => DaqError::configuration(module, other.to_string()),
    }
}

/// Configure everything in order and return the format the application
/// receives. Stream registrations always restart from scratch, which
/// makes a repeated configure idempotent.
fn configure_chain(st: &mut PipelineState) -> DaqResult<PackageFormat> {
    let PipelineState {
        source,
        filters,
        application,
        plugins,
        telemetry,
        ..
    } = &mut *st;

    let Some(source) = source.as_mut() else {
        return Err(DaqError::invalid_state("configure requires init_pipeline"));
    };
    let Some(application) = application.as_mut() else {
        return Err(DaqError::invalid_state("configure requires init_pipeline"));
    };

    telemetry.configure()?;

    for plugin in plugins.iter_mut() {
        let id = telemetry.register_plugin(plugin.name(), plugin.preferred_extension())?;
        plugin
            .configure(id, telemetry)
            .map_err(|e| configure_err(plugin.name(), e))?;
    }

    let mut format = source
        .configure(telemetry)
        .map_err(|e| configure_err(source.name(), e))?;
    format
        .validate()
        .map_err(|e| configure_err(source.name(), e))?;
    telemetry.set_sample_rate(format.rate * format.sample_count as f64);

    for filter in filters.iter_mut() {
        format = filter
            .configure(&format, telemetry)
            .map_err(|e| configure_err(filter.name(), e))?;
        format
            .validate()
            .map_err(|e| configure_err(filter.name(), e))?;
    }

    application
        .configure(&format, telemetry)
        .map_err(|e| configure_err(application.name(), e))?;

    Ok(format)
}

/// Start order within one run: plugins, application, filters, ingress
/// reset, processing on, source last
fn start_stages(st: &mut PipelineState, shared: &Shared, sink: &Arc<IngressSink>) -> DaqResult<()> {
    let PipelineState {
        source,
        filters,
        application,
        plugins,
        ..
    } = &mut *st;

    for plugin in plugins.iter_mut() {
        plugin
            .start()
            .map_err(|e| lifecycle_err(plugin.name(), "start", e))?;
    }
    if let Some(application) = application.as_mut() {
        application
            .start()
            .map_err(|e| lifecycle_err(application.name(), "start", e))?;
    }
    for filter in filters.iter_mut() {
        filter
            .start()
            .map_err(|e| lifecycle_err(filter.name(), "start", e))?;
    }

    shared.ingress.clear();
    shared.processing.store(true, Ordering::Release);

    if let Some(source) = source.as_mut() {
        source
            .start(Arc::clone(sink) as Arc<dyn PackageSink>)
            .map_err(|e| lifecycle_err(source.name(), "start", e))?;
    }
    Ok(())
}

/// Undo a partial start so the system ends up never-started
fn unwind_start(st: &mut PipelineState, shared: &Shared) {
    shared.processing.store(false, Ordering::Release);
    if let Some(source) = st.source.as_mut() {
        let _ = source.stop();
    }
    for filter in st.filters.iter_mut() {
        let _ = filter.stop();
    }
    if let Some(application) = st.application.as_mut() {
        let _ = application.stop();
    }
    for plugin in st.plugins.iter_mut() {
        let _ = plugin.stop();
    }
    st.telemetry.stop();
    st.started = false;
}

fn collect_parameters(st: &PipelineState) -> Vec<(String, ParameterSet)> {
    let mut sections = Vec::new();
    if let Some(source) = &st.source {
        sections.push((source.name().to_string(), source.parameters()));
    }
    for filter in &st.filters {
        sections.push((filter.name().to_string(), filter.parameters()));
    }
    if let Some(application) = &st.application {
        sections.push((application.name().to_string(), application.parameters()));
    }
    for plugin in &st.plugins {
        sections.push((plugin.name().to_string(), plugin.parameters()));
    }
    sections
}

/// One pass: telemetry bracket, plugin pre-hooks, raw source row,
/// filter chain, plugin post-hooks, application, plugin buffer flush
fn run_pass(st: &mut PipelineState, package: &SamplePackage) -> DaqResult<()> {
    let PipelineState {
        filters,
        application,
        plugins,
        telemetry,
        ..
    } = &mut *st;

    telemetry.sample_processing_start();

    for plugin in plugins.iter_mut() {
        plugin
            .pre_process(package, telemetry)
            .map_err(|e| lifecycle_err(plugin.name(), "pre-process", e))?;
    }

    telemetry.log_source_input_values(&package.values);

    let mut current = package.clone();
    for filter in filters.iter_mut() {
        current = filter
            .process(&current, telemetry)
            .map_err(|e| lifecycle_err(filter.name(), "process", e))?;
    }

    for plugin in plugins.iter_mut() {
        plugin
            .post_process(&current, telemetry)
            .map_err(|e| lifecycle_err(plugin.name(), "post-process", e))?;
    }

    if let Some(application) = application.as_mut() {
        application
            .process(&current, telemetry)
            .map_err(|e| lifecycle_err(application.name(), "process", e))?;
    }

    telemetry.sample_processing_end();
    telemetry.write_plugin_data(None);
    Ok(())
}

/// Consumer loop: dequeue-oldest under the pipeline lock, run the pass
/// synchronously, then wait on the notify channel with a bounded
/// timeout. The queue is re-polled before every wait, so a signal sent
/// between poll and wait is never lost.
fn run_loop(shared: Arc<Shared>, notify: Receiver<()>, busy_wait: Duration, idle_wait: Duration) {
    let mut last_summary = Instant::now();

    while shared.alive.load(Ordering::Acquire) {
        {
            let mut st = shared.pipeline.lock();
            if shared.processing.load(Ordering::Acquire) {
                if let Some(package) = shared.ingress.pop() {
                    if let Err(e) = run_pass(&mut st, &package) {
                        // Module failures are not isolated: the pass is
                        // abandoned, the pipeline keeps running
                        error!(error = %e, "pass aborted");
                        st.telemetry
                            .log_event(EventSeverity::Error, "pass-aborted", None);
                    }
                }
            }
            if st.stop_log_pending {
                st.telemetry.stop();
                st.stop_log_pending = false;
            }
            if last_summary.elapsed() >= Duration::from_secs(1) {
                let dropped = shared.ingress.take_discarded();
                if dropped > 0 {
                    warn!(dropped, "ingress buffer overflow, newest packages dropped");
                    st.telemetry.log_event(
                        EventSeverity::Warning,
                        "ingress-overflow",
                        Some(dropped as f64),
                    );
                }
                last_summary = Instant::now();
            }
        }

        let processing = shared.processing.load(Ordering::Acquire);
        if processing && !shared.ingress.is_empty() {
            continue;
        }
        let timeout = if processing { busy_wait } else { idle_wait };
        let _ = notify.recv_timeout(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurodaq_core::{StreamCategory, ValueOrder};
    use std::sync::atomic::AtomicU64;
    use tempfile::TempDir;

    struct ManualSource;

    impl SignalSource for ManualSource {
        fn name(&self) -> &str {
            "ManualSource"
        }

        fn configure(&mut self, telemetry: &mut dyn Telemetry) -> DaqResult<PackageFormat> {
            telemetry.register_stream(StreamCategory::SourceInput, "Ch1")?;
            telemetry.register_stream(StreamCategory::SourceInput, "Ch2")?;
            Ok(PackageFormat::new(2, 1, 100.0, ValueOrder::SampleMajor))
        }

        fn start(&mut self, _sink: Arc<dyn PackageSink>) -> DaqResult<()> {
            // Packages are delivered by the test through event_new_sample
            Ok(())
        }
    }

    struct CountingApp {
        processed: Arc<AtomicU64>,
    }

    impl Application for CountingApp {
        fn name(&self) -> &str {
            "CountingApp"
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

    fn test_setup(dir: &TempDir) -> (ModuleRegistry, PipelineSpec, SupervisorConfig, Arc<AtomicU64>) {
        let processed = Arc::new(AtomicU64::new(0));
        let mut registry = ModuleRegistry::new();
        registry.register_source("manual", || Box::new(ManualSource));
        registry.register_application("counting", {
            let processed = Arc::clone(&processed);
            move || {
                Box::new(CountingApp {
                    processed: Arc::clone(&processed),
                })
            }
        });

        let spec = PipelineSpec {
            source: "manual".to_string(),
            filters: Vec::new(),
            application: "counting".to_string(),
            plugins: Vec::new(),
        };
        let config = SupervisorConfig {
            telemetry: neurodaq_telemetry::TelemetryConfig {
                data_dir: dir.path().to_path_buf(),
                identifier: "test".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        (registry, spec, config, processed)
    }

    fn package(a: f64, b: f64) -> SamplePackage {
        let format = PackageFormat::new(2, 1, 100.0, ValueOrder::SampleMajor);
        SamplePackage::new(vec![a, b], format).unwrap()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_zero_ingress_capacity_is_rejected() {
        // A hand-edited JSON config can carry a zero capacity; that has
        // to surface as a configuration error, not a panic
        let config: SupervisorConfig = serde_json::from_str(
            r#"{"ingress_capacity": 0, "busy_wait_ms": 20, "idle_wait_ms": 250,
                "telemetry": {"data_dir": "data", "identifier": "s",
                              "log_source_input": true, "log_pipeline": true,
                              "visualization_enabled": false,
                              "event_allow_list": [], "plugin_buffer_len": 16}}"#,
        )
        .unwrap();
        let err = PipelineSupervisor::new(config).unwrap_err();
        assert!(matches!(err, DaqError::Configuration { .. }));
    }

    #[test]
    fn test_lifecycle_preconditions() {
        let dir = TempDir::new().unwrap();
        let (_registry, _spec, config, _) = test_setup(&dir);
        let mut supervisor = PipelineSupervisor::new(config).unwrap();

        // No modules yet
        assert!(supervisor.configure_system().is_err());
        // Not configured
        assert!(supervisor.initialize_system().is_err());
        assert!(supervisor.start().is_err());
        supervisor.destroy();
    }

    #[test]
    fn test_unknown_module_key_aborts() {
        let dir = TempDir::new().unwrap();
        let (registry, mut spec, config, _) = test_setup(&dir);
        spec.filters.push("nonexistent".to_string());

        let mut supervisor = PipelineSupervisor::new(config).unwrap();
        let err = supervisor.init_pipeline(&registry, &spec).unwrap_err();
        assert!(format!("{}", err).contains("nonexistent"));
        supervisor.destroy();
    }

    #[test]
    fn test_double_start_is_reported_error() {
        let dir = TempDir::new().unwrap();
        let (registry, spec, config, _) = test_setup(&dir);
        let mut supervisor = PipelineSupervisor::new(config).unwrap();

        supervisor.init_pipeline(&registry, &spec).unwrap();
        supervisor.configure_system().unwrap();
        supervisor.initialize_system().unwrap();
        supervisor.start().unwrap();

        assert!(supervisor.start().is_err());
        assert!(supervisor.is_started());
        supervisor.stop(true);
        supervisor.destroy();
    }

    #[test]
    fn test_stop_when_not_started_is_noop() {
        let dir = TempDir::new().unwrap();
        let (registry, spec, config, _) = test_setup(&dir);
        let mut supervisor = PipelineSupervisor::new(config).unwrap();
        supervisor.init_pipeline(&registry, &spec).unwrap();

        supervisor.stop(true);
        assert!(!supervisor.is_started());
        supervisor.destroy();
    }

    #[test]
    fn test_packages_flow_to_application() {
        let dir = TempDir::new().unwrap();
        let (registry, spec, config, processed) = test_setup(&dir);
        let mut supervisor = PipelineSupervisor::new(config).unwrap();

        supervisor.init_pipeline(&registry, &spec).unwrap();
        supervisor.configure_system().unwrap();
        supervisor.initialize_system().unwrap();
        supervisor.start().unwrap();

        for i in 0..10 {
            supervisor.event_new_sample(package(i as f64, -(i as f64)));
        }
        assert!(wait_for(|| processed.load(Ordering::SeqCst) == 10));
        supervisor.stop(true);

        // Processing disabled: further packages are ignored
        supervisor.event_new_sample(package(99.0, 99.0));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(processed.load(Ordering::SeqCst), 10);
        supervisor.destroy();
    }

    #[test]
    fn test_deferred_log_stop_runs_on_loop() {
        let dir = TempDir::new().unwrap();
        let (registry, spec, config, _) = test_setup(&dir);
        let mut supervisor = PipelineSupervisor::new(config).unwrap();

        supervisor.init_pipeline(&registry, &spec).unwrap();
        supervisor.configure_system().unwrap();
        supervisor.initialize_system().unwrap();
        supervisor.start().unwrap();
        assert!(supervisor.with_telemetry(|t| t.is_started()));

        supervisor.stop(false);
        assert!(wait_for(|| supervisor.with_telemetry(|t| !t.is_started())));
        supervisor.destroy();
    }

    #[test]
    fn test_reconfigure_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (registry, spec, config, _) = test_setup(&dir);
        let mut supervisor = PipelineSupervisor::new(config).unwrap();

        supervisor.init_pipeline(&registry, &spec).unwrap();
        supervisor.configure_system().unwrap();
        supervisor.configure_system().unwrap();

        // Stream registrations were not duplicated by the second pass
        let count = supervisor.with_telemetry(|t| t.stream_count(StreamCategory::SourceInput));
        assert_eq!(count, 2);
        supervisor.destroy();
    }
}
