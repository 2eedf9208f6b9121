//! SamplePackage: unit of data flowing through the pipeline

use crate::error::{DaqError, DaqResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Memory order of the values inside a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueOrder {
    /// All samples of channel 0, then channel 1, ...
    ChannelMajor,
    /// All channels of sample 0, then sample 1, ... (interleaved)
    SampleMajor,
}

/// Shape of the packages a stage produces, renegotiated at every
/// filter boundary during configure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackageFormat {
    /// Number of channels per package
    pub channel_count: usize,
    /// Number of samples per channel per package
    pub sample_count: usize,
    /// Package rate in Hz (packages per second)
    pub rate: f64,
    /// Value layout
    pub value_order: ValueOrder,
}

impl PackageFormat {
    /// Create a new format description
    pub fn new(channel_count: usize, sample_count: usize, rate: f64, value_order: ValueOrder) -> Self {
        PackageFormat {
            channel_count,
            sample_count,
            rate,
            value_order,
        }
    }

    /// Total number of scalar values per package
    pub fn value_count(&self) -> usize {
        self.channel_count * self.sample_count
    }

    /// Validate the format fields
    pub fn validate(&self) -> DaqResult<()> {
        if self.channel_count == 0 {
            return Err(DaqError::InvalidSampleData {
                reason: "channel count must be at least 1".into(),
            });
        }
        if self.sample_count == 0 {
            return Err(DaqError::InvalidSampleData {
                reason: "sample count must be at least 1".into(),
            });
        }
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(DaqError::InvalidSampleData {
                reason: format!("package rate {} must be positive", self.rate),
            });
        }
        Ok(())
    }
}

/// One batch of channel readings, processed as a unit by the run loop
#[derive(Debug, Clone)]
pub struct SamplePackage {
    /// Unique identifier for this package
    pub id: Uuid,
    /// Scalar values, laid out according to `format.value_order`
    pub values: Vec<f64>,
    /// Shape of `values`
    pub format: PackageFormat,
}

impl SamplePackage {
    /// Create a new package, validating the value count against the format
    pub fn new(values: Vec<f64>, format: PackageFormat) -> DaqResult<Self> {
        format.validate()?;
        if values.len() != format.value_count() {
            return Err(DaqError::InvalidSampleData {
                reason: format!(
                    "value count {} doesn't match format ({} channels x {} samples)",
                    values.len(),
                    format.channel_count,
                    format.sample_count
                ),
            });
        }

        Ok(SamplePackage {
            id: Uuid::new_v4(),
            values,
            format,
        })
    }

    /// Total number of scalar values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check whether the package carries any values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of one channel at one sample index
    pub fn value(&self, channel: usize, sample: usize) -> DaqResult<f64> {
        self.check_channel(channel)?;
        if sample >= self.format.sample_count {
            return Err(DaqError::InvalidSampleData {
                reason: format!(
                    "sample index {} out of bounds (0-{})",
                    sample,
                    self.format.sample_count - 1
                ),
            });
        }
        let idx = match self.format.value_order {
            ValueOrder::ChannelMajor => channel * self.format.sample_count + sample,
            ValueOrder::SampleMajor => sample * self.format.channel_count + channel,
        };
        Ok(self.values[idx])
    }

    /// Extract all samples of one channel
    pub fn channel_data(&self, channel: usize) -> DaqResult<Vec<f64>> {
        self.check_channel(channel)?;
        let samples = self.format.sample_count;
        let mut out = Vec::with_capacity(samples);
        for s in 0..samples {
            out.push(self.value(channel, s)?);
        }
        Ok(out)
    }

    /// Package with the same format but replaced values
    pub fn with_values(&self, values: Vec<f64>) -> DaqResult<SamplePackage> {
        SamplePackage::new(values, self.format)
    }

    fn check_channel(&self, channel: usize) -> DaqResult<()> {
        if channel >= self.format.channel_count {
            return Err(DaqError::InvalidSampleData {
                reason: format!(
                    "channel index {} out of bounds (0-{})",
                    channel,
                    self.format.channel_count - 1
                ),
            });
        }
        Ok(())
    }
}
