//! Hilbert transform — real sample stream to complex baseband
//!
//! Converts a real-sampled stream into I/Q at half the input rate using the
//! half-band trick: even-indexed input samples become the I rail and only
//! need a pure delay; odd-indexed samples form the Q rail and pass through
//! a short antisymmetric FIR derived from the 47-tap half-band prototype
//! (see [`crate::filter_design::convert_half_band_to_hilbert`]).
//!
//! The two rails carry different residual lengths between calls: 11 samples
//! on the delay-only I rail and 23 on the filtered Q rail. The same rail
//! structure and overlap constants are used by the device buffer iterators
//! in [`crate::buffer`].
//!
//! ## Example
//!
//! ```rust
//! use rxdsp::hilbert::HilbertTransform;
//! use rxdsp::vector::Implementation;
//!
//! let mut hilbert = HilbertTransform::new(Implementation::Scalar).unwrap();
//! let real = vec![0.1f32; 256];
//! let complex = hilbert.process(&real).unwrap();
//! assert_eq!(complex.len(), 128);
//! ```

use crate::calibrate::{CalibrationRegistry, CalibrationType};
use crate::filter_design::{self, HILBERT_PROTOTYPE_TAPS};
use crate::types::{ComplexSamples, DspError, DspResult};
use crate::vector::Implementation;

/// Residual samples carried on the delay-only I rail.
pub const I_OVERLAP: usize = 11;
/// Residual samples carried on the filtered Q rail.
pub const Q_OVERLAP: usize = 23;

/// Streaming real-to-complex Hilbert converter with decimation by two.
#[derive(Debug, Clone)]
pub struct HilbertTransform {
    coefficients: Vec<f32>,
    i_buffer: Vec<f32>,
    q_buffer: Vec<f32>,
    variant: Implementation,
}

impl HilbertTransform {
    /// Construct with coefficients derived from the 47-tap half-band
    /// prototype.
    pub fn new(variant: Implementation) -> DspResult<Self> {
        let prototype = filter_design::half_band(HILBERT_PROTOTYPE_TAPS)?;
        let coefficients = filter_design::convert_half_band_to_hilbert(&prototype)?;

        let variant = if variant == Implementation::Uncalibrated {
            Implementation::Scalar
        } else {
            variant
        };

        Ok(Self {
            coefficients,
            i_buffer: vec![0.0; I_OVERLAP],
            q_buffer: vec![0.0; Q_OVERLAP],
            variant,
        })
    }

    /// Smallest accepted block length in real samples.
    pub fn granularity(&self) -> usize {
        match self.variant.lanes() {
            Some(lanes) => 2 * lanes,
            None => 2,
        }
    }

    /// Selected implementation variant.
    pub fn variant(&self) -> Implementation {
        self.variant
    }

    /// Convert one real block into `samples.len() / 2` complex samples.
    pub fn process(&mut self, samples: &[f32]) -> DspResult<ComplexSamples> {
        let granularity = self.granularity();
        if samples.is_empty() || samples.len() % granularity != 0 {
            return Err(DspError::InvalidBlockSize {
                required: granularity,
                actual: samples.len(),
            });
        }

        let half = samples.len() / 2;
        self.i_buffer.resize(I_OVERLAP + half, 0.0);
        self.q_buffer.resize(Q_OVERLAP + half, 0.0);

        // Even input samples feed the I rail, odd samples the Q rail.
        for (n, pair) in samples.chunks_exact(2).enumerate() {
            self.i_buffer[I_OVERLAP + n] = pair[0];
            self.q_buffer[Q_OVERLAP + n] = pair[1];
        }

        // The I rail is a pure delay line.
        let i = self.i_buffer[..half].to_vec();

        let mut q = vec![0.0f32; half];
        match self.variant.lanes() {
            None => filter_q_scalar(&self.q_buffer, &self.coefficients, &mut q),
            Some(2) => filter_q_lanes::<2>(&self.q_buffer, &self.coefficients, &mut q),
            Some(4) => filter_q_lanes::<4>(&self.q_buffer, &self.coefficients, &mut q),
            Some(8) => filter_q_lanes::<8>(&self.q_buffer, &self.coefficients, &mut q),
            Some(_) => filter_q_lanes::<16>(&self.q_buffer, &self.coefficients, &mut q),
        }

        // Save the new tails for the next call.
        self.i_buffer.copy_within(half.., 0);
        self.q_buffer.copy_within(half.., 0);
        self.i_buffer.truncate(I_OVERLAP);
        self.q_buffer.truncate(Q_OVERLAP);

        Ok(ComplexSamples::new(i, q, 0))
    }
}

/// Build a Hilbert transform, selecting the kernel the calibration registry
/// found fastest on this machine.
pub fn hilbert_transform(registry: &CalibrationRegistry) -> DspResult<HilbertTransform> {
    HilbertTransform::new(registry.implementation(CalibrationType::HilbertTransform))
}

pub(crate) fn filter_q_scalar(buffer: &[f32], coefficients: &[f32], out: &mut [f32]) {
    for (n, output) in out.iter_mut().enumerate() {
        let mut accumulator = 0.0f32;
        for (tap, &coefficient) in coefficients.iter().enumerate() {
            accumulator += coefficient * buffer[n + tap];
        }
        *output = accumulator;
    }
}

pub(crate) fn filter_q_lanes<const LANES: usize>(
    buffer: &[f32],
    coefficients: &[f32],
    out: &mut [f32],
) {
    for chunk_start in (0..out.len()).step_by(LANES) {
        let mut accumulator = [0.0f32; LANES];

        for (tap, &coefficient) in coefficients.iter().enumerate() {
            for lane in 0..LANES {
                accumulator[lane] += coefficient * buffer[chunk_start + lane + tap];
            }
        }

        out[chunk_start..chunk_start + LANES].copy_from_slice(&accumulator);
    }
}
