//! # Receiver DSP Core Library
//!
//! This crate provides the real-time Digital Signal Processing (DSP) core of
//! a software radio receiver: the streaming path from raw device sample
//! buffers to per-channel demodulated audio.
//!
//! ## Overview
//!
//! The pipeline is built from small stateful blocks that each carry exactly
//! the residual state they need across calls, so output is identical under
//! any upstream chunking:
//!
//! - **Buffer Iteration**: Raw 12-bit device buffers (packed or unpacked)
//!   to fixed-size complex fragments via a Hilbert rail structure
//! - **Decimation**: Overlap-save half-band filters for complex and real
//!   streams, plus general FIR filtering
//! - **Conditioning**: DC removal, frequency translation (mixer/oscillator),
//!   gain
//! - **Demodulation**: Arctangent FM discriminator
//! - **Channel Output**: Bounded drop-newest queues with edge-triggered
//!   overflow notification between the channelizer and each demodulator
//!
//! Every hot operation has scalar and fixed-lane-width kernels. The
//! [`calibrate`] registry benchmarks the candidates on the host machine,
//! persists the winner through an injected key-value store, and hands the
//! selection to the factory constructors in each module.
//!
//! ## Signal Flow
//!
//! ```text
//! Device bytes → Buffer Iterator → Half-Band Decimation → Channelizer
//!     → Output Queue → Frequency Correction → Gain → FM Demod → Audio
//! ```
//!
//! ## Example
//!
//! ```rust
//! use rxdsp::calibrate::{CalibrationRegistry, MemoryStore};
//! use rxdsp::filter_design;
//! use rxdsp::half_band::complex_decimator;
//! use rxdsp::types::random_samples;
//!
//! // A registry backed by any durable key-value store; uncalibrated
//! // operations fall back to the scalar kernels.
//! let registry = CalibrationRegistry::new(Box::new(MemoryStore::new()));
//!
//! // Decimate an interleaved complex stream by two.
//! let mut decimator = complex_decimator(23, &registry).unwrap();
//! let interleaved = random_samples(4096);
//! let decimated = decimator.process(&interleaved).unwrap();
//! assert_eq!(decimated.len(), interleaved.len() / 2);
//! ```

pub mod buffer;
pub mod calibrate;
pub mod channel;
pub mod dc_removal;
pub mod filter_design;
pub mod fir;
pub mod fm_demod;
pub mod gain;
pub mod half_band;
pub mod hilbert;
pub mod mixer;
pub mod oscillator;
pub mod types;
pub mod vector;

pub use calibrate::{CalibrationRegistry, CalibrationType, KeyValueStore, MemoryStore};
pub use types::{ComplexSamples, DspError, DspResult, InterleavedComplexSamples};
pub use vector::Implementation;
