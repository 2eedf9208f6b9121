//! Waveform patterns for synthetic signal generation

use serde::{Deserialize, Serialize};

/// Deterministic part of a generated channel; additive noise is
/// configured separately on the source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaveformPattern {
    /// Flat line at `level`
    Constant { level: f64 },
    /// Sinusoid around `baseline`
    Sine {
        frequency: f64,
        amplitude: f64,
        baseline: f64,
    },
    /// Ramp from 0 to `peak` over `period` seconds, repeating
    Sawtooth { peak: f64, period: f64 },
}

impl WaveformPattern {
    /// Value at time `t` seconds for channel `channel`. Channels are
    /// phase-shifted so multi-channel output is distinguishable.
    pub fn value(&self, t: f64, channel: usize) -> f64 {
        match *self {
            WaveformPattern::Constant { level } => level,
            WaveformPattern::Sine {
                frequency,
                amplitude,
                baseline,
            } => {
                let phase = channel as f64 * std::f64::consts::FRAC_PI_4;
                baseline + amplitude * (2.0 * std::f64::consts::PI * frequency * t + phase).sin()
            }
            WaveformPattern::Sawtooth { peak, period } => {
                let offset = channel as f64 * 0.1 * period;
                peak * (((t + offset) / period).fract())
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WaveformPattern::Constant { .. } => "constant",
            WaveformPattern::Sine { .. } => "sine",
            WaveformPattern::Sawtooth { .. } => "sawtooth",
        }
    }
}

impl Default for WaveformPattern {
    fn default() -> Self {
        WaveformPattern::Sine {
            frequency: 10.0,
            amplitude: 1.0,
            baseline: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_ignores_time() {
        let p = WaveformPattern::Constant { level: 2.5 };
        assert_eq!(p.value(0.0, 0), 2.5);
        assert_eq!(p.value(123.4, 3), 2.5);
    }

    #[test]
    fn test_sine_periodicity() {
        let p = WaveformPattern::Sine {
            frequency: 10.0,
            amplitude: 1.0,
            baseline: 0.0,
        };
        let a = p.value(0.025, 0);
        let b = p.value(0.125, 0);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_channels_are_phase_shifted() {
        let p = WaveformPattern::default();
        assert!((p.value(0.01, 0) - p.value(0.01, 1)).abs() > 1e-6);
    }

    #[test]
    fn test_sawtooth_wraps() {
        let p = WaveformPattern::Sawtooth {
            peak: 4.0,
            period: 1.0,
        };
        assert!((p.value(0.5, 0) - 2.0).abs() < 1e-9);
        assert!((p.value(1.5, 0) - 2.0).abs() < 1e-9);
    }
}
