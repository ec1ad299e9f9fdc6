//! Numerically controlled oscillators
//!
//! Generates complex or real sinusoids with exact phase continuity across
//! blocks and frequency changes. The oscillator is the core of frequency
//! translation (mixing a channel to baseband) and of the channel output
//! processor's frequency correction.
//!
//! The phase accumulator runs in f64 so that long generation runs stay
//! phase-accurate; emitted samples are f32 like the rest of the pipeline.
//! The lane-width kernels compute one chunk of lane angles at a time from
//! the accumulator rather than chaining rotations, so scalar and vector
//! outputs agree to float tolerance for arbitrarily long runs.
//!
//! ## Example
//!
//! ```rust
//! use rxdsp::oscillator::ComplexOscillator;
//! use rxdsp::vector::Implementation;
//!
//! let mut lo = ComplexOscillator::new(1000.0, 48000.0, Implementation::Scalar).unwrap();
//! let block = lo.generate(48).unwrap();
//! for (i, q) in block.i.iter().zip(block.q.iter()) {
//!     let magnitude = (i * i + q * q).sqrt();
//!     assert!((magnitude - 1.0).abs() < 1e-5);
//! }
//! ```

use crate::calibrate::{CalibrationRegistry, CalibrationType};
use crate::types::{ComplexSamples, DspError, DspResult};
use crate::vector::Implementation;
use num_complex::Complex32;
use std::f64::consts::PI;

/// Complex numerically controlled oscillator.
#[derive(Debug, Clone)]
pub struct ComplexOscillator {
    frequency: f64,
    sample_rate: f64,
    phase: f64,
    phase_inc: f64,
    variant: Implementation,
}

impl ComplexOscillator {
    /// Create an oscillator at the given frequency and sample rate.
    pub fn new(frequency: f64, sample_rate: f64, variant: Implementation) -> DspResult<Self> {
        if sample_rate <= 0.0 {
            return Err(DspError::InvalidArgument(format!(
                "sample rate must be positive: {sample_rate}"
            )));
        }

        let variant = if variant == Implementation::Uncalibrated {
            Implementation::Scalar
        } else {
            variant
        };

        Ok(Self {
            frequency,
            sample_rate,
            phase: 0.0,
            phase_inc: 2.0 * PI * frequency / sample_rate,
            variant,
        })
    }

    /// Retune with phase continuity.
    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
        self.phase_inc = 2.0 * PI * frequency / self.sample_rate;
    }

    /// Current frequency in hertz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Sample rate in hertz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Selected implementation variant.
    pub fn variant(&self) -> Implementation {
        self.variant
    }

    /// Smallest accepted generation count.
    pub fn granularity(&self) -> usize {
        self.variant.lanes().unwrap_or(1)
    }

    /// Generate one sample and advance the phase.
    pub fn step(&mut self) -> Complex32 {
        let sample = Complex32::new(self.phase.cos() as f32, self.phase.sin() as f32);
        self.advance(1);
        sample
    }

    /// Generate a block of `count` samples.
    pub fn generate(&mut self, count: usize) -> DspResult<ComplexSamples> {
        let granularity = self.granularity();
        if count == 0 || count % granularity != 0 {
            return Err(DspError::InvalidBlockSize { required: granularity, actual: count });
        }

        let mut i = vec![0.0f32; count];
        let mut q = vec![0.0f32; count];

        match self.variant.lanes() {
            None => {
                for n in 0..count {
                    let angle = self.phase + self.phase_inc * n as f64;
                    i[n] = angle.cos() as f32;
                    q[n] = angle.sin() as f32;
                }
            }
            Some(2) => self.generate_lanes::<2>(&mut i, &mut q),
            Some(4) => self.generate_lanes::<4>(&mut i, &mut q),
            Some(8) => self.generate_lanes::<8>(&mut i, &mut q),
            Some(_) => self.generate_lanes::<16>(&mut i, &mut q),
        }

        self.advance(count);
        Ok(ComplexSamples::new(i, q, 0))
    }

    fn generate_lanes<const LANES: usize>(&self, i: &mut [f32], q: &mut [f32]) {
        let mut angles = [0.0f64; LANES];

        for chunk_start in (0..i.len()).step_by(LANES) {
            let base = self.phase + self.phase_inc * chunk_start as f64;
            for lane in 0..LANES {
                angles[lane] = base + self.phase_inc * lane as f64;
            }
            for lane in 0..LANES {
                i[chunk_start + lane] = angles[lane].cos() as f32;
            }
            for lane in 0..LANES {
                q[chunk_start + lane] = angles[lane].sin() as f32;
            }
        }
    }

    fn advance(&mut self, count: usize) {
        self.phase += self.phase_inc * count as f64;
        // Wrap to keep the accumulator small over long runs.
        self.phase %= 2.0 * PI;
    }
}

/// Real numerically controlled oscillator generating a cosine.
#[derive(Debug, Clone)]
pub struct RealOscillator {
    inner: ComplexOscillator,
}

impl RealOscillator {
    /// Create an oscillator at the given frequency and sample rate.
    pub fn new(frequency: f64, sample_rate: f64, variant: Implementation) -> DspResult<Self> {
        Ok(Self { inner: ComplexOscillator::new(frequency, sample_rate, variant)? })
    }

    /// Retune with phase continuity.
    pub fn set_frequency(&mut self, frequency: f64) {
        self.inner.set_frequency(frequency);
    }

    /// Current frequency in hertz.
    pub fn frequency(&self) -> f64 {
        self.inner.frequency()
    }

    /// Selected implementation variant.
    pub fn variant(&self) -> Implementation {
        self.inner.variant()
    }

    /// Generate a block of `count` real samples.
    pub fn generate(&mut self, count: usize) -> DspResult<Vec<f32>> {
        Ok(self.inner.generate(count)?.i)
    }
}

/// Build a complex oscillator, selecting the kernel the calibration
/// registry found fastest on this machine.
pub fn complex_oscillator(
    frequency: f64,
    sample_rate: f64,
    registry: &CalibrationRegistry,
) -> DspResult<ComplexOscillator> {
    ComplexOscillator::new(
        frequency,
        sample_rate,
        registry.implementation(CalibrationType::OscillatorComplex),
    )
}

/// Build a real oscillator, selecting the kernel the calibration registry
/// found fastest on this machine.
pub fn real_oscillator(
    frequency: f64,
    sample_rate: f64,
    registry: &CalibrationRegistry,
) -> DspResult<RealOscillator> {
    RealOscillator::new(
        frequency,
        sample_rate,
        registry.implementation(CalibrationType::OscillatorReal),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unit_magnitude() {
        let mut lo = ComplexOscillator::new(1200.0, 48000.0, Implementation::Scalar).unwrap();
        let block = lo.generate(480).unwrap();
        for (i, q) in block.i.iter().zip(block.q.iter()) {
            assert_relative_eq!((i * i + q * q).sqrt(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_phase_continuity_across_blocks() {
        let mut whole = ComplexOscillator::new(1000.0, 48000.0, Implementation::Scalar).unwrap();
        let expected = whole.generate(512).unwrap();

        let mut split = ComplexOscillator::new(1000.0, 48000.0, Implementation::Scalar).unwrap();
        let first = split.generate(100).unwrap();
        let second = split.generate(412).unwrap();

        let i: Vec<f32> = first.i.iter().chain(second.i.iter()).copied().collect();
        for (a, b) in i.iter().zip(expected.i.iter()) {
            assert!((a - b).abs() < 1e-6, "{a} != {b}");
        }
    }

    #[test]
    fn test_phase_continuity_across_retune() {
        let mut lo = ComplexOscillator::new(1000.0, 48000.0, Implementation::Scalar).unwrap();
        let before = lo.generate(64).unwrap();
        lo.set_frequency(2000.0);
        let after = lo.generate(1).unwrap();

        // The first sample after retuning continues from the accumulated
        // phase, not from zero.
        let last_angle = (before.q[63]).atan2(before.i[63]);
        let next_angle = (after.q[0]).atan2(after.i[0]);
        let expected_inc = (2.0 * std::f64::consts::PI * 2000.0 / 48000.0) as f32;
        let mut delta = next_angle - last_angle;
        while delta < 0.0 {
            delta += 2.0 * std::f32::consts::PI;
        }
        assert!((delta - expected_inc).abs() < 1e-3, "delta {delta} != {expected_inc}");
    }

    #[test]
    fn test_scalar_vector_parity() {
        for variant in [
            Implementation::Vector64,
            Implementation::Vector128,
            Implementation::Vector256,
            Implementation::Vector512,
        ] {
            let mut scalar = ComplexOscillator::new(-3700.0, 50000.0, Implementation::Scalar).unwrap();
            let mut vectored = ComplexOscillator::new(-3700.0, 50000.0, variant).unwrap();
            let expected = scalar.generate(10240).unwrap();
            let output = vectored.generate(10240).unwrap();
            for n in 0..10240 {
                assert!((expected.i[n] - output.i[n]).abs() < 1e-4, "{variant} I at {n}");
                assert!((expected.q[n] - output.q[n]).abs() < 1e-4, "{variant} Q at {n}");
            }
        }
    }

    #[test]
    fn test_zero_frequency_is_dc() {
        let mut lo = ComplexOscillator::new(0.0, 48000.0, Implementation::Scalar).unwrap();
        let block = lo.generate(100).unwrap();
        for n in 0..100 {
            assert_relative_eq!(block.i[n], 1.0, epsilon = 1e-6);
            assert_relative_eq!(block.q[n], 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_real_oscillator_is_cosine() {
        let mut lo = RealOscillator::new(1000.0, 8000.0, Implementation::Scalar).unwrap();
        let samples = lo.generate(8).unwrap();
        // One cycle every 8 samples
        assert_relative_eq!(samples[0], 1.0, epsilon = 1e-5);
        assert!(samples[4] < -0.99);
    }

    #[test]
    fn test_rejects_invalid_construction_and_counts() {
        assert!(ComplexOscillator::new(1000.0, 0.0, Implementation::Scalar).is_err());
        let mut lo = ComplexOscillator::new(1000.0, 48000.0, Implementation::Vector512).unwrap();
        assert!(lo.generate(24).is_err());
        assert!(lo.generate(0).is_err());
        assert!(lo.generate(32).is_ok());
    }
}
