//! Telemetry log: stream registry, per-run files, event log, plugin buffers
//!
//! One `TelemetryLog` serves a whole session. Streams are registered per
//! category during configure; `start()` opens the files of one run and
//! every pass then contributes one row per enabled binary file. All
//! methods are called from the run-loop thread.

use crate::frame::{DataHeader, FrameWriter};
use chrono::Local;
use neurodaq_core::{DaqError, DaqResult, EventSeverity, StreamCategory, Telemetry};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, warn};

/// File extensions owned by the core log files; plugins may not claim them
pub const RESERVED_EXTENSIONS: [&str; 4] = ["src", "dat", "evt", "prm"];

/// Collaborator that writes the per-run parameter snapshot.
///
/// The log only decides when and where; the snapshot format belongs to
/// the collaborator.
pub trait ParameterSnapshot: Send {
    fn write_snapshot(&self, path: &Path) -> DaqResult<()>;
}

/// Observer receiving the per-pass visualization values without any
/// file I/O in between
pub trait VisualizationSink: Send {
    fn on_pass(&mut self, counter: u32, values: &[f64]);
}

/// Telemetry configuration for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Root directory session directories are created under
    pub data_dir: PathBuf,
    /// Session identifier; prefixes the session directory and every file
    pub identifier: String,
    /// Write the raw source rows (.src)
    pub log_source_input: bool,
    /// Write the pipeline rows (.dat)
    pub log_pipeline: bool,
    /// Fan per-pass values out to visualization observers
    pub visualization_enabled: bool,
    /// Severities admitted to the event log; empty admits all
    pub event_allow_list: Vec<EventSeverity>,
    /// Capacity of each plugin write buffer, in f64 slots
    pub plugin_buffer_len: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            identifier: "session".to_string(),
            log_source_input: true,
            log_pipeline: true,
            visualization_enabled: false,
            event_allow_list: Vec::new(),
            plugin_buffer_len: 4096,
        }
    }
}

struct PluginSlot {
    id: usize,
    name: String,
    extension: String,
    stream_names: Vec<String>,
    buffer: Vec<f64>,
    write_ptr: usize,
    file: Option<FrameWriter<BufWriter<File>>>,
}

impl PluginSlot {
    /// Buffer slots one row occupies: pass counter plus one value per stream
    fn stride(&self) -> usize {
        1 + self.stream_names.len()
    }
}

/// Stream registry, binary row writers, event log and plugin buffers
/// for one acquisition session
pub struct TelemetryLog {
    config: TelemetryConfig,
    started: bool,
    sample_rate: f64,
    run_number: u32,
    session_dir: PathBuf,
    run_base: PathBuf,

    source_streams: Vec<String>,
    pipeline_streams: Vec<String>,
    viz_streams: Vec<String>,
    plugins: Vec<PluginSlot>,

    source_file: Option<FrameWriter<BufWriter<File>>>,
    data_file: Option<FrameWriter<BufWriter<File>>>,
    event_file: Option<File>,

    data_counter: u32,
    source_counter: u32,
    data_timer: Option<Instant>,
    source_timer: Option<Instant>,

    pass_active: bool,
    pipeline_values: Vec<f64>,
    viz_values: Vec<f64>,
    integrity_errors: u64,

    viz_sinks: Vec<Box<dyn VisualizationSink>>,
    snapshot: Option<Box<dyn ParameterSnapshot>>,
}

impl TelemetryLog {
    pub fn new(config: TelemetryConfig) -> Self {
        TelemetryLog {
            config,
            started: false,
            sample_rate: 0.0,
            run_number: 0,
            session_dir: PathBuf::new(),
            run_base: PathBuf::new(),
            source_streams: Vec::new(),
            pipeline_streams: Vec::new(),
            viz_streams: Vec::new(),
            plugins: Vec::new(),
            source_file: None,
            data_file: None,
            event_file: None,
            data_counter: 0,
            source_counter: 0,
            data_timer: None,
            source_timer: None,
            pass_active: false,
            pipeline_values: Vec::new(),
            viz_values: Vec::new(),
            integrity_errors: 0,
            viz_sinks: Vec::new(),
            snapshot: None,
        }
    }

    /// Validate the configuration and clear all registrations, making a
    /// repeated configure start from a clean slate
    pub fn configure(&mut self) -> DaqResult<()> {
        if self.started {
            return Err(DaqError::invalid_state(
                "telemetry log cannot be reconfigured while a run is active",
            ));
        }
        if self.config.identifier.is_empty()
            || self.config.identifier.contains(['/', '\\'])
        {
            return Err(DaqError::configuration(
                "TelemetryLog",
                "identifier must be non-empty and free of path separators",
            ));
        }
        if self.config.plugin_buffer_len == 0 {
            return Err(DaqError::configuration(
                "TelemetryLog",
                "plugin buffer length must be at least 1",
            ));
        }
        self.source_streams.clear();
        self.pipeline_streams.clear();
        self.viz_streams.clear();
        self.plugins.clear();
        Ok(())
    }

    /// Sample rate recorded into every binary header; supplied by the
    /// supervisor once the source format is known
    pub fn set_sample_rate(&mut self, rate: f64) {
        self.sample_rate = rate;
    }

    /// Attach a visualization observer
    pub fn add_visualization_sink(&mut self, sink: Box<dyn VisualizationSink>) {
        self.viz_sinks.push(sink);
    }

    /// Install the parameter snapshot collaborator
    pub fn set_parameter_snapshot(&mut self, snapshot: Box<dyn ParameterSnapshot>) {
        self.snapshot = Some(snapshot);
    }

    /// Register a plugin by name and preferred extension; returns the
    /// sequential plugin id. Collisions and reserved extensions are
    /// resolved to a different unique extension automatically.
    pub fn register_plugin(&mut self, name: &str, preferred_extension: &str) -> DaqResult<usize> {
        if self.started {
            return Err(DaqError::invalid_state(
                "plugin registration is only valid before start",
            ));
        }
        let taken: Vec<&str> = self.plugins.iter().map(|p| p.extension.as_str()).collect();
        let extension = resolve_extension(preferred_extension, &taken);
        if extension != preferred_extension {
            debug!(
                plugin = name,
                requested = preferred_extension,
                assigned = %extension,
                "plugin extension remapped"
            );
        }
        let id = self.plugins.len();
        self.plugins.push(PluginSlot {
            id,
            name: name.to_string(),
            extension,
            stream_names: Vec::new(),
            buffer: vec![0.0; self.config.plugin_buffer_len],
            write_ptr: 0,
            file: None,
        });
        Ok(id)
    }

    /// Open the files of a new run: session directory, run number scan,
    /// one binary file per enabled category, event log and parameter
    /// snapshot. A failure to open one stream demotes only that stream.
    pub fn start(&mut self) -> DaqResult<()> {
        if self.started {
            return Err(DaqError::invalid_state("telemetry log already started"));
        }

        let date = Local::now().format("%Y%m%d").to_string();
        let session_name = format!("{}_{}", self.config.identifier, date);
        self.session_dir = self.config.data_dir.join(&session_name);
        fs::create_dir_all(&self.session_dir)?;

        self.run_number = next_run_number(&self.session_dir)?;
        self.run_base = self
            .session_dir
            .join(format!("{}_Run_{}", session_name, self.run_number));

        self.data_counter = 0;
        self.source_counter = 0;
        self.data_timer = None;
        self.source_timer = None;
        self.pass_active = false;
        self.integrity_errors = 0;

        if self.config.log_source_input {
            let header = DataHeader::with_elapsed("src", self.sample_rate, &self.source_streams)?;
            self.source_file = open_frame_file(&self.run_base.with_extension("src"), header);
        }
        if self.config.log_pipeline {
            let header = DataHeader::with_elapsed("dat", self.sample_rate, &self.pipeline_streams)?;
            self.data_file = open_frame_file(&self.run_base.with_extension("dat"), header);
        }
        for plugin in &mut self.plugins {
            let header = DataHeader::plain(&plugin.extension, self.sample_rate, &plugin.stream_names)?;
            plugin.file = open_frame_file(&self.run_base.with_extension(&plugin.extension), header);
            plugin.write_ptr = 0;
        }

        let event_path = self.run_base.with_extension("evt");
        self.event_file = match File::create(&event_path) {
            Ok(mut f) => {
                if let Err(e) =
                    writeln!(f, "Time\tID_source_sample\tID_data_sample\tEvent_code\tEvent_value")
                {
                    error!(path = %event_path.display(), error = %e, "event log header write failed");
                    None
                } else {
                    Some(f)
                }
            }
            Err(e) => {
                error!(path = %event_path.display(), error = %e, "event log creation failed");
                None
            }
        };

        if let Some(snapshot) = &self.snapshot {
            let path = self.run_base.with_extension("prm");
            if let Err(e) = snapshot.write_snapshot(&path) {
                error!(path = %path.display(), error = %e, "parameter snapshot failed");
            }
        }

        self.started = true;
        self.log_event(EventSeverity::Marker, "run-start", Some(self.run_number as f64));
        debug!(run = self.run_number, dir = %self.session_dir.display(), "telemetry run started");
        Ok(())
    }

    /// Begin one pass: resets the per-pass value accumulators
    pub fn sample_processing_start(&mut self) {
        if !self.started {
            return;
        }
        self.pass_active = true;
        self.pipeline_values.clear();
        self.viz_values.clear();
    }

    /// End one pass: verifies the accumulated value counts, writes the
    /// pipeline row, fans values out to visualization observers and
    /// advances the pass counter
    pub fn sample_processing_end(&mut self) {
        if !self.started || !self.pass_active {
            return;
        }
        self.pass_active = false;

        let elapsed_ms = self
            .data_timer
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        self.data_timer = Some(Instant::now());

        if self.pipeline_values.len() != self.pipeline_streams.len() {
            self.report_integrity(StreamCategory::Pipeline, self.pipeline_streams.len(), self.pipeline_values.len());
        } else if let Some(writer) = &mut self.data_file {
            let res = writer.write_row(self.data_counter, Some(elapsed_ms), &self.pipeline_values);
            if let Err(e) = res {
                error!(error = %e, "pipeline row write failed, demoting .dat writer");
                self.data_file = None;
            }
        }

        if self.config.visualization_enabled && !self.viz_sinks.is_empty() {
            if self.viz_values.len() != self.viz_streams.len() {
                self.report_integrity(StreamCategory::Visualization, self.viz_streams.len(), self.viz_values.len());
            } else {
                for sink in &mut self.viz_sinks {
                    sink.on_pass(self.data_counter, &self.viz_values);
                }
            }
        }

        self.data_counter = self.data_counter.wrapping_add(1);
    }

    /// Write one row of raw source values, with its own counter and
    /// restart timer independent of the pipeline row
    pub fn log_source_input_values(&mut self, values: &[f64]) {
        if !self.started {
            return;
        }

        let elapsed_ms = self
            .source_timer
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        self.source_timer = Some(Instant::now());

        if values.len() != self.source_streams.len() {
            self.report_integrity(StreamCategory::SourceInput, self.source_streams.len(), values.len());
        } else if let Some(writer) = &mut self.source_file {
            let res = writer.write_row(self.source_counter, Some(elapsed_ms), values);
            if let Err(e) = res {
                error!(error = %e, "source row write failed, demoting .src writer");
                self.source_file = None;
            }
        }

        self.source_counter = self.source_counter.wrapping_add(1);
    }

    /// Flush one plugin buffer (or all of them) to disk and reset the
    /// write pointer
    pub fn write_plugin_data(&mut self, plugin_id: Option<usize>) {
        match plugin_id {
            Some(id) => {
                if let Some(plugin) = self.plugins.get_mut(id) {
                    flush_plugin(plugin);
                } else {
                    warn!(plugin_id = id, "write_plugin_data for unknown plugin");
                }
            }
            None => {
                for plugin in &mut self.plugins {
                    flush_plugin(plugin);
                }
            }
        }
    }

    /// Close the run: stop-event, source/data files, plugin buffers and
    /// files, timers; the event file closes last so stop-events are
    /// captured
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.log_event(EventSeverity::Marker, "run-stop", Some(self.run_number as f64));

        if let Some(writer) = self.source_file.take() {
            if let Err(e) = writer.finish() {
                error!(error = %e, "closing .src file failed");
            }
        }
        if let Some(writer) = self.data_file.take() {
            if let Err(e) = writer.finish() {
                error!(error = %e, "closing .dat file failed");
            }
        }
        for plugin in &mut self.plugins {
            flush_plugin(plugin);
            if let Some(file) = plugin.file.take() {
                if let Err(e) = file.finish() {
                    error!(plugin = %plugin.name, error = %e, "closing plugin file failed");
                }
            }
        }
        self.data_timer = None;
        self.source_timer = None;
        self.pass_active = false;

        self.event_file = None;
        self.started = false;
        debug!(run = self.run_number, "telemetry run stopped");
    }

    fn report_integrity(&mut self, category: StreamCategory, expected: usize, actual: usize) {
        self.integrity_errors += 1;
        warn!(
            category = category.as_str(),
            expected, actual, "logged value count doesn't match registered streams, row withheld"
        );
        self.write_event_line(
            EventSeverity::Error,
            &format!("stream-integrity-{}", category.as_str()),
            Some(actual as f64),
        );
    }

    fn write_event_line(&mut self, severity: EventSeverity, code: &str, value: Option<f64>) {
        if !self.config.event_allow_list.is_empty()
            && !self.config.event_allow_list.contains(&severity)
        {
            return;
        }
        let Some(file) = &mut self.event_file else {
            return;
        };
        let time = Local::now().format("%H:%M:%S%.3f");
        let value_text = value.map_or_else(|| "-".to_string(), |v| v.to_string());
        let res = writeln!(
            file,
            "{}\t{}\t{}\t{}\t{}",
            time, self.source_counter, self.data_counter, code, value_text
        )
        .and_then(|_| file.flush());
        if let Err(e) = res {
            error!(error = %e, "event log write failed, demoting event writer");
            self.event_file = None;
        }
    }

    // Accessors

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn run_number(&self) -> u32 {
        self.run_number
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Path prefix of this run's files, without extension
    pub fn run_file_base(&self) -> &Path {
        &self.run_base
    }

    pub fn data_counter(&self) -> u32 {
        self.data_counter
    }

    pub fn source_counter(&self) -> u32 {
        self.source_counter
    }

    /// Number of withheld rows since start
    pub fn integrity_errors(&self) -> u64 {
        self.integrity_errors
    }

    /// Resolved extension of a registered plugin
    pub fn plugin_extension(&self, plugin_id: usize) -> Option<&str> {
        self.plugins.get(plugin_id).map(|p| p.extension.as_str())
    }

    pub fn stream_count(&self, category: StreamCategory) -> usize {
        match category {
            StreamCategory::SourceInput => self.source_streams.len(),
            StreamCategory::Pipeline => self.pipeline_streams.len(),
            StreamCategory::Visualization => self.viz_streams.len(),
        }
    }
}

impl Telemetry for TelemetryLog {
    fn register_stream(&mut self, category: StreamCategory, name: &str) -> DaqResult<usize> {
        if self.started {
            return Err(DaqError::invalid_state(
                "stream registration is only valid before start",
            ));
        }
        let list = match category {
            StreamCategory::SourceInput => &mut self.source_streams,
            StreamCategory::Pipeline => &mut self.pipeline_streams,
            StreamCategory::Visualization => &mut self.viz_streams,
        };
        list.push(name.to_string());
        Ok(list.len() - 1)
    }

    fn log_values(&mut self, category: StreamCategory, values: &[f64]) {
        match category {
            StreamCategory::SourceInput => self.log_source_input_values(values),
            StreamCategory::Pipeline => self.pipeline_values.extend_from_slice(values),
            StreamCategory::Visualization => self.viz_values.extend_from_slice(values),
        }
    }

    fn log_event(&mut self, severity: EventSeverity, code: &str, value: Option<f64>) {
        self.write_event_line(severity, code, value);
    }

    fn register_plugin_stream(&mut self, plugin_id: usize, name: &str) -> DaqResult<usize> {
        if self.started {
            return Err(DaqError::invalid_state(
                "plugin stream registration is only valid before start",
            ));
        }
        let plugin = self
            .plugins
            .get_mut(plugin_id)
            .ok_or_else(|| DaqError::invalid_state(format!("unknown plugin id {}", plugin_id)))?;
        plugin.stream_names.push(name.to_string());
        Ok(plugin.stream_names.len() - 1)
    }

    fn log_plugin_values(&mut self, plugin_id: usize, values: &[f64]) {
        let counter = self.data_counter;
        let Some(expected) = self.plugins.get(plugin_id).map(|p| p.stream_names.len()) else {
            warn!(plugin_id, "log_plugin_values for unknown plugin");
            return;
        };
        if values.len() != expected {
            self.integrity_errors += 1;
            warn!(
                plugin_id,
                expected,
                actual = values.len(),
                "plugin value count doesn't match registered streams, values dropped"
            );
            return;
        }

        let plugin = &mut self.plugins[plugin_id];
        let needed = plugin.stride();
        if needed > plugin.buffer.len() {
            warn!(
                plugin = %plugin.name,
                needed,
                capacity = plugin.buffer.len(),
                "plugin row larger than its buffer, values dropped"
            );
            return;
        }
        // Buffer full: flush to disk first, then retry the append
        if plugin.write_ptr + needed > plugin.buffer.len() {
            flush_plugin(plugin);
        }
        plugin.buffer[plugin.write_ptr] = counter as f64;
        plugin.buffer[plugin.write_ptr + 1..plugin.write_ptr + needed].copy_from_slice(values);
        plugin.write_ptr += needed;
    }
}

/// Decompose a plugin buffer into rows and append them to its file
fn flush_plugin(plugin: &mut PluginSlot) {
    if plugin.write_ptr == 0 {
        return;
    }
    let stride = plugin.stride();
    if let Some(writer) = &mut plugin.file {
        let mut failed = false;
        for row in plugin.buffer[..plugin.write_ptr].chunks_exact(stride) {
            let counter = row[0] as u32;
            if let Err(e) = writer.write_row(counter, None, &row[1..]) {
                error!(plugin = %plugin.name, error = %e, "plugin row write failed, demoting writer");
                failed = true;
                break;
            }
        }
        if !failed {
            if let Err(e) = writer.flush() {
                error!(plugin = %plugin.name, error = %e, "plugin flush failed, demoting writer");
                failed = true;
            }
        }
        if failed {
            plugin.file = None;
        }
    }
    plugin.write_ptr = 0;
}

fn open_frame_file(path: &Path, header: DataHeader) -> Option<FrameWriter<BufWriter<File>>> {
    match File::create(path).map_err(DaqError::from).and_then(|f| {
        FrameWriter::new(BufWriter::new(f), header)
    }) {
        Ok(writer) => Some(writer),
        Err(e) => {
            error!(path = %path.display(), error = %e, "log file creation failed, stream disabled");
            None
        }
    }
}

/// Highest `<...>_Run_<N>.<ext>` number in `dir` plus one; 0 when the
/// session directory holds no runs yet
fn next_run_number(dir: &Path) -> DaqResult<u32> {
    let mut highest: Option<u32> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(n) = parse_run_token(name) {
            highest = Some(highest.map_or(n, |h| h.max(n)));
        }
    }
    Ok(highest.map_or(0, |h| h + 1))
}

fn parse_run_token(file_name: &str) -> Option<u32> {
    let idx = file_name.find("_Run_")?;
    let digits: String = file_name[idx + 5..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Map a requested plugin extension onto a unique, non-reserved,
/// 3-letter lowercase extension
fn resolve_extension(requested: &str, taken: &[&str]) -> String {
    let normalized: String = requested
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(3)
        .collect::<String>()
        .to_ascii_lowercase();

    let available =
        |ext: &str| ext.len() == 3 && !RESERVED_EXTENSIONS.contains(&ext) && !taken.contains(&ext);

    if available(&normalized) {
        return normalized;
    }

    // Vary the last character first, then the stem, keeping the result
    // recognizable where possible
    let stem: Vec<char> = if normalized.len() == 3 {
        normalized.chars().collect()
    } else {
        vec!['p', 'l', 'g']
    };
    for last in 'a'..='z' {
        let candidate: String = [stem[0], stem[1], last].iter().collect();
        if available(&candidate) {
            return candidate;
        }
    }
    for middle in 'a'..='z' {
        for last in 'a'..='z' {
            let candidate: String = [stem[0], middle, last].iter().collect();
            if available(&candidate) {
                return candidate;
            }
        }
    }
    for first in 'a'..='z' {
        for middle in 'a'..='z' {
            for last in 'a'..='z' {
                let candidate: String = [first, middle, last].iter().collect();
                if available(&candidate) {
                    return candidate;
                }
            }
        }
    }
    unreachable!("extension space exhausted")
}
