//! Half-band decimate-by-2 filters — overlap-save, block oriented
//!
//! A half-band lowpass has every odd tap equal to zero except the 0.5
//! center tap, and mirror-symmetric even taps. Folding the symmetric taps
//! lets each decimated output be computed as
//!
//! ```text
//! y[n] = 0.5 * x[n + center] + sum over even k < center of
//!        c[k] * (x[n + k] + x[n + L-1-k])
//! ```
//!
//! which halves the multiply count relative to direct convolution.
//!
//! The filters here are streaming: each `process` call appends the new
//! block after the residual tail of the previous call's working buffer,
//! filters the combined buffer, and saves the new tail, so block seams are
//! exact no matter how the upstream chunks its data. Changing the block
//! length between calls resizes the working buffer while preserving the
//! residual region.
//!
//! Scalar and lane-width kernels are numerically equivalent within float
//! tolerance; which one a factory builds is decided by the calibration
//! registry.
//!
//! ## Example
//!
//! ```rust
//! use rxdsp::{filter_design, half_band::ComplexHalfBandDecimator};
//! use rxdsp::vector::Implementation;
//!
//! let taps = filter_design::half_band(23).unwrap();
//! let mut filter = ComplexHalfBandDecimator::new(&taps, Implementation::Scalar).unwrap();
//!
//! // 64 interleaved complex samples in, 32 out
//! let block = vec![0.5f32; 128];
//! let out = filter.process(&block).unwrap();
//! assert_eq!(out.len(), 64);
//! ```

use crate::calibrate::{CalibrationRegistry, CalibrationType};
use crate::filter_design::{self, CENTER_COEFFICIENT};
use crate::types::{DspError, DspResult};
use crate::vector::Implementation;

/// Streaming half-band decimate-by-2 filter for interleaved complex samples.
///
/// Input and output are `i0,q0,i1,q1,...` float arrays. Each call consumes
/// a block whose length is a multiple of the filter's granularity and
/// produces half as many floats.
#[derive(Debug, Clone)]
pub struct ComplexHalfBandDecimator {
    /// Coefficients expanded for the interleaved layout: each tap appears
    /// twice, once for the I lane and once for the Q lane.
    coefficients: Vec<f32>,
    /// Working buffer: residual overlap followed by the current block.
    buffer: Vec<f32>,
    /// Residual length in floats carried between calls.
    overlap: usize,
    variant: Implementation,
}

impl ComplexHalfBandDecimator {
    /// Construct from a validated half-band coefficient array.
    ///
    /// `Uncalibrated` resolves to the scalar kernel.
    pub fn new(coefficients: &[f32], variant: Implementation) -> DspResult<Self> {
        filter_design::validate_half_band(coefficients)?;

        let mut expanded = Vec::with_capacity(coefficients.len() * 2);
        for &coefficient in coefficients {
            expanded.push(coefficient);
            expanded.push(coefficient);
        }
        let overlap = expanded.len() - 2;

        Ok(Self {
            coefficients: expanded,
            buffer: Vec::new(),
            overlap,
            variant: normalize(variant),
        })
    }

    /// Smallest block length (in floats) this filter accepts; block lengths
    /// must be non-zero multiples of this.
    pub fn granularity(&self) -> usize {
        match self.variant.lanes() {
            Some(lanes) => 4 * lanes,
            None => 4,
        }
    }

    /// Selected implementation variant.
    pub fn variant(&self) -> Implementation {
        self.variant
    }

    /// Filter and decimate one interleaved block, producing
    /// `samples.len() / 2` floats.
    pub fn process(&mut self, samples: &[f32]) -> DspResult<Vec<f32>> {
        let granularity = self.granularity();
        if samples.is_empty() || samples.len() % granularity != 0 {
            return Err(DspError::InvalidBlockSize {
                required: granularity,
                actual: samples.len(),
            });
        }

        load_working_buffer(&mut self.buffer, self.overlap, samples);

        let mut filtered = vec![0.0f32; samples.len() / 2];
        match self.variant.lanes() {
            None => decimate_complex_scalar(
                &self.buffer,
                &self.coefficients,
                self.overlap,
                &mut filtered,
            ),
            Some(2) => decimate_complex_lanes::<2>(
                &self.buffer,
                &self.coefficients,
                self.overlap,
                &mut filtered,
            ),
            Some(4) => decimate_complex_lanes::<4>(
                &self.buffer,
                &self.coefficients,
                self.overlap,
                &mut filtered,
            ),
            Some(8) => decimate_complex_lanes::<8>(
                &self.buffer,
                &self.coefficients,
                self.overlap,
                &mut filtered,
            ),
            Some(_) => decimate_complex_lanes::<16>(
                &self.buffer,
                &self.coefficients,
                self.overlap,
                &mut filtered,
            ),
        }

        Ok(filtered)
    }
}

/// Streaming half-band decimate-by-2 filter for real samples.
#[derive(Debug, Clone)]
pub struct RealHalfBandDecimator {
    coefficients: Vec<f32>,
    buffer: Vec<f32>,
    overlap: usize,
    variant: Implementation,
}

impl RealHalfBandDecimator {
    /// Construct from a validated half-band coefficient array.
    pub fn new(coefficients: &[f32], variant: Implementation) -> DspResult<Self> {
        filter_design::validate_half_band(coefficients)?;

        Ok(Self {
            coefficients: coefficients.to_vec(),
            buffer: Vec::new(),
            overlap: coefficients.len() - 1,
            variant: normalize(variant),
        })
    }

    /// Smallest accepted block length in samples.
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

    /// Filter and decimate one block, producing `samples.len() / 2` samples.
    pub fn process(&mut self, samples: &[f32]) -> DspResult<Vec<f32>> {
        let granularity = self.granularity();
        if samples.is_empty() || samples.len() % granularity != 0 {
            return Err(DspError::InvalidBlockSize {
                required: granularity,
                actual: samples.len(),
            });
        }

        load_working_buffer(&mut self.buffer, self.overlap, samples);

        let mut filtered = vec![0.0f32; samples.len() / 2];
        match self.variant.lanes() {
            None => {
                decimate_real_scalar(&self.buffer, &self.coefficients, self.overlap, &mut filtered)
            }
            Some(2) => decimate_real_lanes::<2>(
                &self.buffer,
                &self.coefficients,
                self.overlap,
                &mut filtered,
            ),
            Some(4) => decimate_real_lanes::<4>(
                &self.buffer,
                &self.coefficients,
                self.overlap,
                &mut filtered,
            ),
            Some(8) => decimate_real_lanes::<8>(
                &self.buffer,
                &self.coefficients,
                self.overlap,
                &mut filtered,
            ),
            Some(_) => decimate_real_lanes::<16>(
                &self.buffer,
                &self.coefficients,
                self.overlap,
                &mut filtered,
            ),
        }

        Ok(filtered)
    }
}

/// Build a complex half-band decimator with a standard tap count, selecting
/// the kernel the calibration registry found fastest on this machine.
///
/// Non-standard tap counts fall back to the scalar kernel.
pub fn complex_decimator(
    taps: usize,
    registry: &CalibrationRegistry,
) -> DspResult<ComplexHalfBandDecimator> {
    let coefficients = filter_design::half_band(taps)?;
    let variant = match CalibrationType::for_complex_half_band(taps) {
        Some(calibration_type) => registry.implementation(calibration_type),
        None => Implementation::Scalar,
    };
    ComplexHalfBandDecimator::new(&coefficients, variant)
}

/// Build a real half-band decimator with a standard tap count, selecting
/// the kernel the calibration registry found fastest on this machine.
pub fn real_decimator(
    taps: usize,
    registry: &CalibrationRegistry,
) -> DspResult<RealHalfBandDecimator> {
    let coefficients = filter_design::half_band(taps)?;
    let variant = registry.implementation(CalibrationType::for_real_half_band(taps));
    RealHalfBandDecimator::new(&coefficients, variant)
}

fn normalize(variant: Implementation) -> Implementation {
    if variant == Implementation::Uncalibrated {
        Implementation::Scalar
    } else {
        variant
    }
}

/// Shift the residual tail to the head of the working buffer and append the
/// new block, resizing while preserving the residual when the block length
/// changed between calls.
pub(crate) fn load_working_buffer(buffer: &mut Vec<f32>, overlap: usize, samples: &[f32]) {
    let target = samples.len() + overlap;

    if buffer.is_empty() {
        buffer.resize(target, 0.0);
    } else if buffer.len() != target {
        let mut resized = vec![0.0f32; target];
        let residual_start = buffer.len() - overlap;
        resized[..overlap].copy_from_slice(&buffer[residual_start..]);
        *buffer = resized;
    } else {
        buffer.copy_within(samples.len().., 0);
    }

    buffer[overlap..].copy_from_slice(samples);
}

fn decimate_complex_scalar(buffer: &[f32], coefficients: &[f32], overlap: usize, out: &mut [f32]) {
    let half = coefficients.len() / 2 - 1;

    let mut pointer = 0;
    while pointer < out.len() * 2 {
        let mut i_accumulator = 0.0f32;
        let mut q_accumulator = 0.0f32;

        // Mirrored taps are added before the single multiply.
        let mut tap = 0;
        while tap < half {
            i_accumulator +=
                coefficients[tap] * (buffer[pointer + tap] + buffer[pointer + overlap - tap]);
            q_accumulator += coefficients[tap]
                * (buffer[pointer + tap + 1] + buffer[pointer + overlap - tap + 1]);
            tap += 4;
        }

        i_accumulator += buffer[pointer + half] * CENTER_COEFFICIENT;
        q_accumulator += buffer[pointer + half + 1] * CENTER_COEFFICIENT;

        out[pointer / 2] = i_accumulator;
        out[pointer / 2 + 1] = q_accumulator;
        pointer += 4;
    }
}

fn decimate_complex_lanes<const LANES: usize>(
    buffer: &[f32],
    coefficients: &[f32],
    overlap: usize,
    out: &mut [f32],
) {
    let half = coefficients.len() / 2 - 1;

    // Each lane produces one output complex sample; lanes advance through
    // the input at the decimation stride of two complex samples.
    let mut pointer = 0;
    while pointer < out.len() * 2 {
        let mut i_accumulator = [0.0f32; LANES];
        let mut q_accumulator = [0.0f32; LANES];

        let mut tap = 0;
        while tap < half {
            let coefficient = coefficients[tap];
            for lane in 0..LANES {
                let base = pointer + 4 * lane;
                i_accumulator[lane] +=
                    coefficient * (buffer[base + tap] + buffer[base + overlap - tap]);
                q_accumulator[lane] +=
                    coefficient * (buffer[base + tap + 1] + buffer[base + overlap - tap + 1]);
            }
            tap += 4;
        }

        for lane in 0..LANES {
            let base = pointer + 4 * lane;
            i_accumulator[lane] += buffer[base + half] * CENTER_COEFFICIENT;
            q_accumulator[lane] += buffer[base + half + 1] * CENTER_COEFFICIENT;
            out[base / 2] = i_accumulator[lane];
            out[base / 2 + 1] = q_accumulator[lane];
        }

        pointer += 4 * LANES;
    }
}

fn decimate_real_scalar(buffer: &[f32], coefficients: &[f32], overlap: usize, out: &mut [f32]) {
    let center = overlap / 2;

    for (n, output) in out.iter_mut().enumerate() {
        let pointer = n * 2;
        let mut accumulator = 0.0f32;

        let mut tap = 0;
        while tap < center {
            accumulator +=
                coefficients[tap] * (buffer[pointer + tap] + buffer[pointer + overlap - tap]);
            tap += 2;
        }

        accumulator += buffer[pointer + center] * CENTER_COEFFICIENT;
        *output = accumulator;
    }
}

fn decimate_real_lanes<const LANES: usize>(
    buffer: &[f32],
    coefficients: &[f32],
    overlap: usize,
    out: &mut [f32],
) {
    let center = overlap / 2;

    for chunk_start in (0..out.len()).step_by(LANES) {
        let mut accumulator = [0.0f32; LANES];

        let mut tap = 0;
        while tap < center {
            let coefficient = coefficients[tap];
            for lane in 0..LANES {
                let pointer = (chunk_start + lane) * 2;
                accumulator[lane] +=
                    coefficient * (buffer[pointer + tap] + buffer[pointer + overlap - tap]);
            }
            tap += 2;
        }

        for lane in 0..LANES {
            let pointer = (chunk_start + lane) * 2;
            out[chunk_start + lane] = accumulator[lane] + buffer[pointer + center] * CENTER_COEFFICIENT;
        }
    }
}
