use serde::{Deserialize, Serialize};

use crate::toolkit::DecodedRecording;

/// Scale factor used by the legacy viewer family
pub const DEFAULT_SCALE_FACTOR: f64 = 20.0;

/// Alternative factor some legacy installations were calibrated against
pub const ALT_SCALE_FACTOR: f64 = 10_000_000.0;

/// Clip and amplitude statistics from one scaling pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScaleStats {
    pub clipped: usize,
    pub total: usize,
    pub peak_abs_uv: f64,
}

impl ScaleStats {
    /// Fraction of samples that hit the 16-bit limits.
    pub fn clip_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.clipped as f64 / self.total as f64
        }
    }
}

/// Converts µV samples to the legacy 16-bit representation
///
/// Values are multiplied by `factor`, clipped to the `i16` range and
/// truncated toward zero.
///
/// ```rust
/// use wineeg::SampleScaler;
///
/// let scaler = SampleScaler::default();
/// assert_eq!(scaler.scale_value(12.34), 246);
/// assert_eq!(scaler.scale_value(-12.34), -246);
/// assert_eq!(scaler.scale_value(5000.0), i16::MAX);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleScaler {
    pub factor: f64,
}

impl Default for SampleScaler {
    fn default() -> Self {
        SampleScaler {
            factor: DEFAULT_SCALE_FACTOR,
        }
    }
}

impl SampleScaler {
    pub fn new(factor: f64) -> Self {
        SampleScaler { factor }
    }

    pub fn scale_value(&self, uv: f64) -> i16 {
        clip(uv * self.factor).0
    }

    /// Scales and interleaves `recording` frame by frame
    ///
    /// Channels longer than the shortest one are cut to its length.
    pub fn scale(&self, recording: &DecodedRecording) -> (Vec<i16>, ScaleStats) {
        let frames = recording.frame_count();
        let channels = recording.channel_count();
        let mut out = Vec::with_capacity(frames * channels);
        let mut stats = ScaleStats::default();

        for frame in 0..frames {
            for samples in &recording.channels {
                let uv = samples[frame];
                if uv.abs() > stats.peak_abs_uv {
                    stats.peak_abs_uv = uv.abs();
                }
                let (value, clipped) = clip(uv * self.factor);
                if clipped {
                    stats.clipped += 1;
                }
                out.push(value);
            }
        }
        stats.total = out.len();
        (out, stats)
    }
}

fn clip(value: f64) -> (i16, bool) {
    if value.is_nan() {
        return (0, false);
    }
    let lo = i16::MIN as f64;
    let hi = i16::MAX as f64;
    if value < lo {
        (i16::MIN, true)
    } else if value > hi {
        (i16::MAX, true)
    } else {
        (value.trunc() as i16, false)
    }
}
