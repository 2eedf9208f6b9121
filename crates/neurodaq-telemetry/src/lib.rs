//! NeuroDAQ-Telemetry: binary frame codec and run logging
//!
//! Writes every step of an acquisition run to disk for exact playback:
//! raw source rows, pipeline rows, a text event log and one buffered
//! file per plugin, all in the shared header+fixed-row container.

pub mod frame;
pub mod log;
pub mod scope;

pub use frame::{DataHeader, FrameReader, FrameRow, FrameWriter, FORMAT_VERSION};
pub use log::{
    ParameterSnapshot, TelemetryConfig, TelemetryLog, VisualizationSink, RESERVED_EXTENSIONS,
};
pub use scope::ScopeSink;
