//! Synthetic signal generation and reference pipeline modules
//!
//! Provides a clocked [`SyntheticSource`] plus small filters,
//! applications and plugins used for development and testing.

pub mod modules;
pub mod synthetic_source;
pub mod waveform;

pub use modules::*;
pub use synthetic_source::*;
pub use waveform::*;
