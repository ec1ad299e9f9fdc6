//! DC removal filter — running-estimate offset correction
//!
//! Receiver hardware leaves a small DC bias on the sample stream that would
//! otherwise appear as a carrier at 0 Hz after decimation. This filter
//! subtracts a running DC estimate from each block and then nudges the
//! estimate toward the block's residual mean, converging over a few blocks
//! without distorting nearby low-frequency content the way a wide-notch
//! IIR would.
//!
//! ## Example
//!
//! ```rust
//! use rxdsp::dc_removal::DcRemovalFilter;
//! use rxdsp::vector::Implementation;
//!
//! let mut filter = DcRemovalFilter::new(0.15, Implementation::Scalar);
//! let biased = vec![0.3f32; 512];
//! let mut out = Vec::new();
//! for _ in 0..40 {
//!     out = filter.process(&biased).unwrap();
//! }
//! assert!(out[0].abs() < 1e-3, "DC should be removed, got {}", out[0]);
//! ```

use crate::calibrate::{CalibrationRegistry, CalibrationType};
use crate::types::{DspError, DspResult};
use crate::vector::Implementation;

/// Default loop gain for the DC estimate update.
pub const DEFAULT_GAIN: f32 = 0.15;

/// Streaming DC removal filter for real samples.
#[derive(Debug, Clone)]
pub struct DcRemovalFilter {
    /// Fraction of the residual block mean folded into the estimate after
    /// each call. Higher converges faster but tracks audio as bias.
    gain: f32,
    estimate: f32,
    variant: Implementation,
}

impl DcRemovalFilter {
    /// Create a filter with the given estimate loop gain.
    pub fn new(gain: f32, variant: Implementation) -> Self {
        let variant = if variant == Implementation::Uncalibrated {
            Implementation::Scalar
        } else {
            variant
        };
        Self { gain, estimate: 0.0, variant }
    }

    /// Current DC estimate.
    pub fn estimate(&self) -> f32 {
        self.estimate
    }

    /// Selected implementation variant.
    pub fn variant(&self) -> Implementation {
        self.variant
    }

    /// Smallest accepted block length in samples.
    pub fn granularity(&self) -> usize {
        self.variant.lanes().unwrap_or(1)
    }

    /// Subtract the running DC estimate from one block and update the
    /// estimate from the residual mean.
    pub fn process(&mut self, samples: &[f32]) -> DspResult<Vec<f32>> {
        let granularity = self.granularity();
        if samples.is_empty() || samples.len() % granularity != 0 {
            return Err(DspError::InvalidBlockSize {
                required: granularity,
                actual: samples.len(),
            });
        }

        let mut out = vec![0.0f32; samples.len()];
        let residual_sum = match self.variant.lanes() {
            None => remove_scalar(samples, self.estimate, &mut out),
            Some(2) => remove_lanes::<2>(samples, self.estimate, &mut out),
            Some(4) => remove_lanes::<4>(samples, self.estimate, &mut out),
            Some(8) => remove_lanes::<8>(samples, self.estimate, &mut out),
            Some(_) => remove_lanes::<16>(samples, self.estimate, &mut out),
        };

        self.estimate += residual_sum / samples.len() as f32 * self.gain;
        Ok(out)
    }

    /// Reset the DC estimate to zero.
    pub fn reset(&mut self) {
        self.estimate = 0.0;
    }
}

/// Build a DC removal filter with the default gain, selecting the kernel
/// the calibration registry found fastest on this machine.
pub fn dc_removal(registry: &CalibrationRegistry) -> DcRemovalFilter {
    DcRemovalFilter::new(
        DEFAULT_GAIN,
        registry.implementation(CalibrationType::DcRemovalReal),
    )
}

fn remove_scalar(samples: &[f32], estimate: f32, out: &mut [f32]) -> f32 {
    let mut sum = 0.0f32;
    for (output, &sample) in out.iter_mut().zip(samples.iter()) {
        let corrected = sample - estimate;
        sum += corrected;
        *output = corrected;
    }
    sum
}

fn remove_lanes<const LANES: usize>(samples: &[f32], estimate: f32, out: &mut [f32]) -> f32 {
    let mut partial = [0.0f32; LANES];

    for (out_chunk, in_chunk) in out.chunks_exact_mut(LANES).zip(samples.chunks_exact(LANES)) {
        for lane in 0..LANES {
            let corrected = in_chunk[lane] - estimate;
            partial[lane] += corrected;
            out_chunk[lane] = corrected;
        }
    }

    partial.iter().sum()
}
