//! Generic real FIR filter — overlap-save, block oriented
//!
//! Direct-form FIR for real sample streams where no coefficient symmetry
//! can be assumed (matched filters, audio shaping, arbitrary lowpass).
//! Like the half-band decimators, each call carries the trailing
//! `taps - 1` input samples forward so block seams are exact.
//!
//! ## Example
//!
//! ```rust
//! use rxdsp::fir::RealFirFilter;
//! use rxdsp::vector::Implementation;
//!
//! // 4-tap moving average
//! let mut filter = RealFirFilter::new(&[0.25; 4], Implementation::Scalar).unwrap();
//! let out = filter.process(&vec![1.0f32; 64]).unwrap();
//! assert_eq!(out.len(), 64);
//! assert!((out[63] - 1.0).abs() < 1e-6);
//! ```

use crate::calibrate::{CalibrationRegistry, CalibrationType};
use crate::half_band::load_working_buffer;
use crate::types::{DspError, DspResult};
use crate::vector::Implementation;

/// Streaming real FIR filter with no decimation.
#[derive(Debug, Clone)]
pub struct RealFirFilter {
    coefficients: Vec<f32>,
    buffer: Vec<f32>,
    overlap: usize,
    variant: Implementation,
}

impl RealFirFilter {
    /// Construct from an arbitrary non-empty coefficient array.
    pub fn new(coefficients: &[f32], variant: Implementation) -> DspResult<Self> {
        if coefficients.is_empty() {
            return Err(DspError::InvalidFilterLength(0));
        }

        let variant = if variant == Implementation::Uncalibrated {
            Implementation::Scalar
        } else {
            variant
        };

        Ok(Self {
            coefficients: coefficients.to_vec(),
            buffer: Vec::new(),
            overlap: coefficients.len() - 1,
            variant,
        })
    }

    /// Smallest accepted block length in samples.
    pub fn granularity(&self) -> usize {
        self.variant.lanes().unwrap_or(1)
    }

    /// Selected implementation variant.
    pub fn variant(&self) -> Implementation {
        self.variant
    }

    /// Filter one block, producing `samples.len()` output samples.
    pub fn process(&mut self, samples: &[f32]) -> DspResult<Vec<f32>> {
        let granularity = self.granularity();
        if samples.is_empty() || samples.len() % granularity != 0 {
            return Err(DspError::InvalidBlockSize {
                required: granularity,
                actual: samples.len(),
            });
        }

        load_working_buffer(&mut self.buffer, self.overlap, samples);

        let mut filtered = vec![0.0f32; samples.len()];
        match self.variant.lanes() {
            None => filter_scalar(&self.buffer, &self.coefficients, &mut filtered),
            Some(2) => filter_lanes::<2>(&self.buffer, &self.coefficients, &mut filtered),
            Some(4) => filter_lanes::<4>(&self.buffer, &self.coefficients, &mut filtered),
            Some(8) => filter_lanes::<8>(&self.buffer, &self.coefficients, &mut filtered),
            Some(_) => filter_lanes::<16>(&self.buffer, &self.coefficients, &mut filtered),
        }

        Ok(filtered)
    }
}

/// Build a real FIR filter, selecting the kernel the calibration registry
/// found fastest on this machine.
pub fn real_fir(coefficients: &[f32], registry: &CalibrationRegistry) -> DspResult<RealFirFilter> {
    RealFirFilter::new(
        coefficients,
        registry.implementation(CalibrationType::FilterFir),
    )
}

fn filter_scalar(buffer: &[f32], coefficients: &[f32], out: &mut [f32]) {
    for (n, output) in out.iter_mut().enumerate() {
        let mut accumulator = 0.0f32;
        for (tap, &coefficient) in coefficients.iter().enumerate() {
            accumulator += coefficient * buffer[n + tap];
        }
        *output = accumulator;
    }
}

fn filter_lanes<const LANES: usize>(buffer: &[f32], coefficients: &[f32], out: &mut [f32]) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::random_samples;

    #[test]
    fn test_impulse_response() {
        let coefficients = [0.1f32, 0.2, 0.4, 0.2, 0.1];
        let mut filter = RealFirFilter::new(&coefficients, Implementation::Scalar).unwrap();

        let mut impulse = vec![0.0f32; 16];
        impulse[0] = 1.0;
        let out = filter.process(&impulse).unwrap();

        // The filter reads taps forward through the working buffer, so the
        // impulse response appears reversed starting at the seam.
        for (tap, &coefficient) in coefficients.iter().rev().enumerate() {
            assert!(
                (out[tap] - coefficient).abs() < 1e-6,
                "tap {tap}: {} != {coefficient}",
                out[tap]
            );
        }
    }

    #[test]
    fn test_chunked_equals_whole() {
        let coefficients = random_samples(31);
        let input = random_samples(1024);

        let mut whole = RealFirFilter::new(&coefficients, Implementation::Scalar).unwrap();
        let expected = whole.process(&input).unwrap();

        let mut chunked = RealFirFilter::new(&coefficients, Implementation::Scalar).unwrap();
        let mut output = Vec::new();
        for chunk in input.chunks(128) {
            output.extend(chunked.process(chunk).unwrap());
        }

        for (a, b) in output.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6, "{a} != {b}");
        }
    }

    #[test]
    fn test_scalar_vector_parity() {
        let coefficients = random_samples(31);
        let input = random_samples(10240);

        let mut scalar = RealFirFilter::new(&coefficients, Implementation::Scalar).unwrap();
        let expected = scalar.process(&input).unwrap();

        for variant in [
            Implementation::Vector64,
            Implementation::Vector128,
            Implementation::Vector256,
            Implementation::Vector512,
        ] {
            let mut vectored = RealFirFilter::new(&coefficients, variant).unwrap();
            let output = vectored.process(&input).unwrap();
            for (a, b) in output.iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-4, "{variant}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_rejects_empty_coefficients() {
        assert!(RealFirFilter::new(&[], Implementation::Scalar).is_err());
    }

    #[test]
    fn test_rejects_bad_block_size() {
        let mut filter = RealFirFilter::new(&[0.5, 0.5], Implementation::Vector256).unwrap();
        assert!(filter.process(&vec![0.0f32; 12]).is_err()); // not a multiple of 8
        assert!(filter.process(&vec![0.0f32; 16]).is_ok());
    }
}
