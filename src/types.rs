//! Core sample types for the receiver DSP pipeline
//!
//! The sample path is single-precision float throughout: device buffers are
//! converted once to `f32` I/Q and stay that way through decimation,
//! translation, and demodulation. Complex sample blocks come in two shapes:
//!
//! - [`ComplexSamples`] — paired `i`/`q` arrays, used by the Hilbert
//!   converter, FM demodulator and channel output stages.
//! - [`InterleavedComplexSamples`] — a single `i0,q0,i1,q1,...` array, used
//!   by the interleaved half-band decimation filters where I and Q share one
//!   working buffer.
//!
//! Blocks are created by a producer, handed downstream by move, and
//! discarded after consumption; nothing in the hot path retains them.
//!
//! ## Example
//!
//! ```rust
//! use rxdsp::types::ComplexSamples;
//!
//! let block = ComplexSamples::new(vec![1.0, 0.0], vec![0.0, 1.0], 0);
//! let interleaved = block.to_interleaved();
//! assert_eq!(interleaved.samples, vec![1.0, 0.0, 0.0, 1.0]);
//! ```

use rand::Rng;
use std::f32::consts::PI;

/// Result type for DSP operations
pub type DspResult<T> = Result<T, DspError>;

/// Errors that can occur during filter construction or block processing
#[derive(Debug, Clone, thiserror::Error)]
pub enum DspError {
    #[error("Invalid filter length: {0}. Coefficients must be odd-length")]
    InvalidFilterLength(usize),

    #[error("Invalid half-band coefficients: {0}")]
    InvalidHalfBand(String),

    #[error("Invalid block size {actual}: must be a non-zero integer multiple of {required}")]
    InvalidBlockSize { required: usize, actual: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Calibration failed: {0}")]
    Calibration(String),
}

/// A block of complex baseband samples as paired I/Q arrays.
///
/// Both arrays always have equal length. The timestamp is the device
/// timestamp of the first sample, carried through the pipeline unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSamples {
    /// In-phase samples
    pub i: Vec<f32>,
    /// Quadrature samples
    pub q: Vec<f32>,
    /// Timestamp of the first sample (device time, milliseconds)
    pub timestamp: u64,
}

impl ComplexSamples {
    /// Create a block from paired I/Q arrays.
    ///
    /// Panics in debug builds if the arrays differ in length.
    pub fn new(i: Vec<f32>, q: Vec<f32>, timestamp: u64) -> Self {
        debug_assert_eq!(i.len(), q.len(), "I/Q arrays must have equal length");
        Self { i, q, timestamp }
    }

    /// Number of complex samples in this block.
    pub fn len(&self) -> usize {
        self.i.len()
    }

    /// True when the block holds no samples.
    pub fn is_empty(&self) -> bool {
        self.i.is_empty()
    }

    /// Convert to interleaved i0,q0,i1,q1,... layout.
    pub fn to_interleaved(&self) -> InterleavedComplexSamples {
        InterleavedComplexSamples {
            samples: interleave(&self.i, &self.q),
            timestamp: self.timestamp,
        }
    }
}

/// A block of complex baseband samples in interleaved i0,q0,i1,q1,... layout.
#[derive(Debug, Clone, PartialEq)]
pub struct InterleavedComplexSamples {
    /// Interleaved sample array, always even length
    pub samples: Vec<f32>,
    /// Timestamp of the first sample (device time, milliseconds)
    pub timestamp: u64,
}

impl InterleavedComplexSamples {
    /// Create a block from an interleaved array.
    pub fn new(samples: Vec<f32>, timestamp: u64) -> Self {
        debug_assert_eq!(samples.len() % 2, 0, "interleaved array must be even length");
        Self { samples, timestamp }
    }

    /// Number of complex samples in this block.
    pub fn len(&self) -> usize {
        self.samples.len() / 2
    }

    /// True when the block holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Convert to paired I/Q layout.
    pub fn to_complex(&self) -> ComplexSamples {
        let (i, q) = deinterleave(&self.samples);
        ComplexSamples { i, q, timestamp: self.timestamp }
    }
}

/// Interleave paired I/Q arrays into i0,q0,i1,q1,... order.
pub fn interleave(i: &[f32], q: &[f32]) -> Vec<f32> {
    debug_assert_eq!(i.len(), q.len());
    let mut out = Vec::with_capacity(i.len() * 2);
    for (&is, &qs) in i.iter().zip(q.iter()) {
        out.push(is);
        out.push(qs);
    }
    out
}

/// De-interleave an i0,q0,i1,q1,... array into paired I and Q arrays.
pub fn deinterleave(samples: &[f32]) -> (Vec<f32>, Vec<f32>) {
    debug_assert_eq!(samples.len() % 2, 0);
    let half = samples.len() / 2;
    let mut i = Vec::with_capacity(half);
    let mut q = Vec::with_capacity(half);
    for pair in samples.chunks_exact(2) {
        i.push(pair[0]);
        q.push(pair[1]);
    }
    (i, q)
}

/// Generate uniform-random real samples in the range [-1.0, 1.0).
///
/// Used as synthetic input for calibration benchmarking and randomized
/// tests.
pub fn random_samples(count: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect()
}

/// Generate random unit-magnitude complex samples.
///
/// Each sample is a unit vector at a uniform random angle, matching the
/// statistics of a hard-limited received carrier.
pub fn random_unit_complex(count: usize, timestamp: u64) -> ComplexSamples {
    let mut rng = rand::thread_rng();
    let mut i = Vec::with_capacity(count);
    let mut q = Vec::with_capacity(count);
    for _ in 0..count {
        let angle = rng.gen::<f32>() * 2.0 * PI - PI;
        i.push(angle.cos());
        q.push(angle.sin());
    }
    ComplexSamples { i, q, timestamp }
}
