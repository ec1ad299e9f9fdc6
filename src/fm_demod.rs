//! FM demodulator — arctangent frequency discriminator
//!
//! Recovers the modulating signal from a complex FM stream by conjugate
//! multiplication of each sample against its predecessor and taking the
//! phase of the product: `f[n] = arg(x[n] * conj(x[n-1]))`, normalized by
//! the expected deviation so full deviation maps to ±1.0.
//!
//! The previous-sample state carries across blocks so demodulation is
//! seam-exact under arbitrary chunking.
//!
//! ## Example
//!
//! ```rust
//! use rxdsp::fm_demod::FmDemodulator;
//! use rxdsp::vector::Implementation;
//!
//! let mut demod = FmDemodulator::new(5000.0, 48000.0, Implementation::Scalar).unwrap();
//! // A zero-modulation carrier demodulates to zero
//! let i = vec![1.0f32; 64];
//! let q = vec![0.0f32; 64];
//! let audio = demod.demodulate(&i, &q).unwrap();
//! assert!(audio[10].abs() < 1e-6);
//! ```

use crate::calibrate::{CalibrationRegistry, CalibrationType};
use crate::types::{DspError, DspResult};
use crate::vector::Implementation;
use std::f64::consts::PI;

/// Streaming FM discriminator.
#[derive(Debug, Clone)]
pub struct FmDemodulator {
    /// Previous sample, carried across block boundaries.
    prev_i: f32,
    prev_q: f32,
    /// Radians per sample at full deviation.
    sensitivity: f32,
    variant: Implementation,
}

impl FmDemodulator {
    /// Create a demodulator normalized for the given deviation.
    pub fn new(deviation: f64, sample_rate: f64, variant: Implementation) -> DspResult<Self> {
        if sample_rate <= 0.0 || deviation <= 0.0 {
            return Err(DspError::InvalidArgument(format!(
                "deviation {deviation} and sample rate {sample_rate} must be positive"
            )));
        }

        let variant = if variant == Implementation::Uncalibrated {
            Implementation::Scalar
        } else {
            variant
        };

        Ok(Self {
            prev_i: 1.0,
            prev_q: 0.0,
            sensitivity: (2.0 * PI * deviation / sample_rate) as f32,
            variant,
        })
    }

    /// Selected implementation variant.
    pub fn variant(&self) -> Implementation {
        self.variant
    }

    /// Smallest accepted block length in complex samples.
    pub fn granularity(&self) -> usize {
        self.variant.lanes().unwrap_or(1)
    }

    /// Demodulate one block of paired I/Q samples.
    pub fn demodulate(&mut self, i: &[f32], q: &[f32]) -> DspResult<Vec<f32>> {
        if i.len() != q.len() {
            return Err(DspError::InvalidArgument(format!(
                "I length {} != Q length {}",
                i.len(),
                q.len()
            )));
        }
        let granularity = self.granularity();
        if i.is_empty() || i.len() % granularity != 0 {
            return Err(DspError::InvalidBlockSize { required: granularity, actual: i.len() });
        }

        let mut demodulated = vec![0.0f32; i.len()];
        match self.variant.lanes() {
            None => self.demodulate_scalar(i, q, &mut demodulated),
            Some(2) => self.demodulate_lanes::<2>(i, q, &mut demodulated),
            Some(4) => self.demodulate_lanes::<4>(i, q, &mut demodulated),
            Some(8) => self.demodulate_lanes::<8>(i, q, &mut demodulated),
            Some(_) => self.demodulate_lanes::<16>(i, q, &mut demodulated),
        }

        self.prev_i = i[i.len() - 1];
        self.prev_q = q[q.len() - 1];
        Ok(demodulated)
    }

    /// Reset the previous-sample state.
    pub fn reset(&mut self) {
        self.prev_i = 1.0;
        self.prev_q = 0.0;
    }

    fn demodulate_scalar(&self, i: &[f32], q: &[f32], out: &mut [f32]) {
        let mut prev_i = self.prev_i;
        let mut prev_q = self.prev_q;

        for n in 0..i.len() {
            // Conjugate multiply for the phase difference
            let diff_i = i[n] * prev_i + q[n] * prev_q;
            let diff_q = q[n] * prev_i - i[n] * prev_q;
            out[n] = diff_q.atan2(diff_i) / self.sensitivity;
            prev_i = i[n];
            prev_q = q[n];
        }
    }

    fn demodulate_lanes<const LANES: usize>(&self, i: &[f32], q: &[f32], out: &mut [f32]) {
        let mut diff_i = [0.0f32; LANES];
        let mut diff_q = [0.0f32; LANES];

        for chunk_start in (0..i.len()).step_by(LANES) {
            // The conjugate multiplies have no serial dependency once the
            // delayed stream is viewed as a shifted copy of the input.
            for lane in 0..LANES {
                let n = chunk_start + lane;
                let (pi, pq) = if n == 0 {
                    (self.prev_i, self.prev_q)
                } else {
                    (i[n - 1], q[n - 1])
                };
                diff_i[lane] = i[n] * pi + q[n] * pq;
                diff_q[lane] = q[n] * pi - i[n] * pq;
            }
            for lane in 0..LANES {
                out[chunk_start + lane] = diff_q[lane].atan2(diff_i[lane]) / self.sensitivity;
            }
        }
    }
}

/// Build an FM demodulator, selecting the kernel the calibration registry
/// found fastest on this machine.
pub fn fm_demodulator(
    deviation: f64,
    sample_rate: f64,
    registry: &CalibrationRegistry,
) -> DspResult<FmDemodulator> {
    FmDemodulator::new(
        deviation,
        sample_rate,
        registry.implementation(CalibrationType::FmDemodulator),
    )
}
