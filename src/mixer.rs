//! Complex mixer — frequency translation by oscillator multiply
//!
//! Multiplies an incoming complex sample stream by a local oscillator to
//! shift a signal of interest to baseband (or apply a small per-channel
//! frequency correction). Mixing by exactly 0 Hz is still a well-defined
//! operation; callers that want to skip the multiply entirely at zero
//! offset (the channel output processor does) check the offset themselves.
//!
//! ## Example
//!
//! ```rust
//! use rxdsp::mixer::ComplexMixer;
//! use rxdsp::types::ComplexSamples;
//! use rxdsp::vector::Implementation;
//!
//! let mut mixer = ComplexMixer::new(-1000.0, 48000.0, Implementation::Scalar).unwrap();
//! let dc = ComplexSamples::new(vec![1.0; 48], vec![0.0; 48], 0);
//! let mixed = mixer.mix(&dc).unwrap();
//! assert_eq!(mixed.len(), 48);
//! ```

use crate::calibrate::{CalibrationRegistry, CalibrationType};
use crate::oscillator::ComplexOscillator;
use crate::types::{ComplexSamples, DspResult};
use crate::vector::Implementation;

/// Streaming complex mixer.
#[derive(Debug, Clone)]
pub struct ComplexMixer {
    oscillator: ComplexOscillator,
    variant: Implementation,
}

impl ComplexMixer {
    /// Create a mixer with the given local oscillator frequency.
    pub fn new(frequency: f64, sample_rate: f64, variant: Implementation) -> DspResult<Self> {
        let variant = if variant == Implementation::Uncalibrated {
            Implementation::Scalar
        } else {
            variant
        };
        Ok(Self {
            oscillator: ComplexOscillator::new(frequency, sample_rate, variant)?,
            variant,
        })
    }

    /// Retune the local oscillator with phase continuity.
    pub fn set_frequency(&mut self, frequency: f64) {
        self.oscillator.set_frequency(frequency);
    }

    /// Current local oscillator frequency in hertz.
    pub fn frequency(&self) -> f64 {
        self.oscillator.frequency()
    }

    /// Selected implementation variant.
    pub fn variant(&self) -> Implementation {
        self.variant
    }

    /// Smallest accepted block length in complex samples.
    pub fn granularity(&self) -> usize {
        self.variant.lanes().unwrap_or(1)
    }

    /// Mix one block against the local oscillator.
    pub fn mix(&mut self, samples: &ComplexSamples) -> DspResult<ComplexSamples> {
        let lo = self.oscillator.generate(samples.len())?;

        let count = samples.len();
        let mut i = vec![0.0f32; count];
        let mut q = vec![0.0f32; count];

        match self.variant.lanes() {
            None => multiply_scalar(samples, &lo, &mut i, &mut q),
            Some(2) => multiply_lanes::<2>(samples, &lo, &mut i, &mut q),
            Some(4) => multiply_lanes::<4>(samples, &lo, &mut i, &mut q),
            Some(8) => multiply_lanes::<8>(samples, &lo, &mut i, &mut q),
            Some(_) => multiply_lanes::<16>(samples, &lo, &mut i, &mut q),
        }

        Ok(ComplexSamples::new(i, q, samples.timestamp))
    }
}

/// Build a complex mixer, selecting the kernel the calibration registry
/// found fastest on this machine.
pub fn complex_mixer(
    frequency: f64,
    sample_rate: f64,
    registry: &CalibrationRegistry,
) -> DspResult<ComplexMixer> {
    ComplexMixer::new(
        frequency,
        sample_rate,
        registry.implementation(CalibrationType::ComplexMixer),
    )
}

fn multiply_scalar(samples: &ComplexSamples, lo: &ComplexSamples, i: &mut [f32], q: &mut [f32]) {
    for n in 0..samples.len() {
        i[n] = samples.i[n] * lo.i[n] - samples.q[n] * lo.q[n];
        q[n] = samples.i[n] * lo.q[n] + samples.q[n] * lo.i[n];
    }
}

fn multiply_lanes<const LANES: usize>(
    samples: &ComplexSamples,
    lo: &ComplexSamples,
    i: &mut [f32],
    q: &mut [f32],
) {
    for chunk_start in (0..samples.len()).step_by(LANES) {
        for lane in 0..LANES {
            let n = chunk_start + lane;
            i[n] = samples.i[n] * lo.i[n] - samples.q[n] * lo.q[n];
        }
        for lane in 0..LANES {
            let n = chunk_start + lane;
            q[n] = samples.i[n] * lo.q[n] + samples.q[n] * lo.i[n];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::random_unit_complex;

    #[test]
    fn test_mix_shifts_dc_to_tone() {
        let mut mixer = ComplexMixer::new(1000.0, 48000.0, Implementation::Scalar).unwrap();
        let dc = ComplexSamples::new(vec![1.0; 480], vec![0.0; 480], 0);
        let mixed = mixer.mix(&dc).unwrap();

        // Output should no longer be DC
        let mean_i: f32 = mixed.i.iter().sum::<f32>() / 480.0;
        assert!(mean_i.abs() < 0.5, "mixed output should not be DC: {mean_i}");

        // But should preserve magnitude
        for n in 0..480 {
            let magnitude = (mixed.i[n] * mixed.i[n] + mixed.q[n] * mixed.q[n]).sqrt();
            assert!((magnitude - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_opposite_mix_restores_signal() {
        let input = random_unit_complex(512, 0);

        let mut up = ComplexMixer::new(2500.0, 48000.0, Implementation::Scalar).unwrap();
        let mut down = ComplexMixer::new(-2500.0, 48000.0, Implementation::Scalar).unwrap();

        let restored = down.mix(&up.mix(&input).unwrap()).unwrap();
        for n in 0..512 {
            assert!((restored.i[n] - input.i[n]).abs() < 1e-4);
            assert!((restored.q[n] - input.q[n]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_scalar_vector_parity() {
        let input = random_unit_complex(10240, 0);

        for variant in [
            Implementation::Vector64,
            Implementation::Vector128,
            Implementation::Vector256,
            Implementation::Vector512,
        ] {
            let mut scalar = ComplexMixer::new(-7300.0, 50000.0, Implementation::Scalar).unwrap();
            let mut vectored = ComplexMixer::new(-7300.0, 50000.0, variant).unwrap();
            let expected = scalar.mix(&input).unwrap();
            let output = vectored.mix(&input).unwrap();
            for n in 0..10240 {
                assert!((expected.i[n] - output.i[n]).abs() < 1e-4, "{variant} I at {n}");
                assert!((expected.q[n] - output.q[n]).abs() < 1e-4, "{variant} Q at {n}");
            }
        }
    }

    #[test]
    fn test_timestamp_preserved() {
        let mut mixer = ComplexMixer::new(100.0, 48000.0, Implementation::Scalar).unwrap();
        let input = ComplexSamples::new(vec![1.0; 16], vec![0.0; 16], 12345);
        assert_eq!(mixer.mix(&input).unwrap().timestamp, 12345);
    }

    #[test]
    fn test_rejects_bad_block_size() {
        let mut mixer = ComplexMixer::new(100.0, 48000.0, Implementation::Vector256).unwrap();
        let input = ComplexSamples::new(vec![1.0; 12], vec![0.0; 12], 0);
        assert!(mixer.mix(&input).is_err());
    }
}
