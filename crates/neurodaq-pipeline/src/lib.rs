//! Acquisition pipeline orchestration
//!
//! Wires a [`neurodaq_core::SignalSource`] through an ordered filter
//! chain into an application, with optional plugins observing every
//! pass. The [`PipelineSupervisor`] owns the lifecycle; the
//! [`SampleIngressBuffer`] decouples the source's producer thread from
//! the single consumer run loop.

pub mod config;
pub mod ingress;
pub mod snapshot;
pub mod supervisor;

pub use config::{PipelineSpec, SupervisorConfig};
pub use ingress::SampleIngressBuffer;
pub use snapshot::JsonParameterSnapshot;
pub use supervisor::PipelineSupervisor;
