//! NeuroDAQ-Core: Foundation types for real-time neuro acquisition
//!
//! Sample packages, module lifecycle contracts, the telemetry seam and the
//! factory registry shared by every other crate in the workspace.

pub mod error;
pub mod module;
pub mod registry;
pub mod ring_buffer;
pub mod sample;
pub mod telemetry;

pub use error::{DaqError, DaqResult};
pub use module::{
    Application, ParameterSet, ParameterValue, PackageSink, Plugin, SignalFilter, SignalSource,
};
pub use registry::ModuleRegistry;
pub use ring_buffer::RingBuffer;
pub use sample::{PackageFormat, SamplePackage, ValueOrder};
pub use telemetry::{EventSeverity, StreamCategory, Telemetry};
