//! Complex gain — uniform scaling of I/Q blocks
//!
//! Applies a fixed real gain to both rails of a complex sample stream.
//! Used by the channel output processor to bring channelizer output up to
//! demodulator level.

use crate::calibrate::{CalibrationRegistry, CalibrationType};
use crate::types::{ComplexSamples, DspError, DspResult};
use crate::vector::Implementation;

/// Fixed complex gain stage.
#[derive(Debug, Clone)]
pub struct ComplexGain {
    gain: f32,
    variant: Implementation,
}

impl ComplexGain {
    /// Create a gain stage.
    pub fn new(gain: f32, variant: Implementation) -> Self {
        let variant = if variant == Implementation::Uncalibrated {
            Implementation::Scalar
        } else {
            variant
        };
        Self { gain, variant }
    }

    /// Gain value applied to both rails.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Selected implementation variant.
    pub fn variant(&self) -> Implementation {
        self.variant
    }

    /// Smallest accepted block length in complex samples.
    pub fn granularity(&self) -> usize {
        self.variant.lanes().unwrap_or(1)
    }

    /// Scale one block.
    pub fn apply(&self, samples: &ComplexSamples) -> DspResult<ComplexSamples> {
        let granularity = self.granularity();
        if samples.is_empty() || samples.len() % granularity != 0 {
            return Err(DspError::InvalidBlockSize {
                required: granularity,
                actual: samples.len(),
            });
        }

        let mut out = samples.clone();
        match self.variant.lanes() {
            None => {
                for n in 0..out.len() {
                    out.i[n] *= self.gain;
                    out.q[n] *= self.gain;
                }
            }
            Some(lanes) => {
                // Chunked so the loop body is a fixed-width multiply.
                for chunk in out.i.chunks_exact_mut(lanes) {
                    for sample in chunk {
                        *sample *= self.gain;
                    }
                }
                for chunk in out.q.chunks_exact_mut(lanes) {
                    for sample in chunk {
                        *sample *= self.gain;
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Build a gain stage, selecting the kernel the calibration registry found
/// fastest on this machine.
pub fn complex_gain(gain: f32, registry: &CalibrationRegistry) -> ComplexGain {
    ComplexGain::new(gain, registry.implementation(CalibrationType::ComplexGain))
}
