//! Device buffer iterators — raw byte buffers to complex fragments
//!
//! Converts one raw device buffer of signed 12-bit samples into a finite,
//! non-restartable sequence of fixed-size complex fragments. The device
//! samples a real signal, so the conversion is the half-band Hilbert
//! structure from [`crate::hilbert`]: even samples feed a delay-only I rail
//! and odd samples pass through the short antisymmetric Q FIR, decimating
//! by two.
//!
//! Each rail carries a residual tail between fragments and between
//! top-level buffers. A fresh iterator must be constructed per buffer,
//! seeded with the previous iterator's final [`residual_i`] and
//! [`residual_q`] state; that hand-off is what makes output across buffer
//! seams identical to processing one contiguous buffer.
//!
//! Two wire layouts are supported: unpacked (each 12-bit sample in the low
//! bits of a little-endian 16-bit word, 4 bytes per complex pair) and
//! packed (two 12-bit samples in 3 bytes).
//!
//! [`residual_i`]: UnpackedBufferIterator::residual_i
//! [`residual_q`]: UnpackedBufferIterator::residual_q

use crate::calibrate::{CalibrationRegistry, CalibrationType};
use crate::filter_design::{self, HILBERT_PROTOTYPE_TAPS};
use crate::hilbert::{filter_q_lanes, filter_q_scalar, I_OVERLAP, Q_OVERLAP};
use crate::types::{ComplexSamples, DspError, DspResult};
use crate::vector::Implementation;

/// Complex samples per emitted fragment.
pub const FRAGMENT_SIZE: usize = 2048;

/// Bytes consumed per fragment in the unpacked layout.
pub const UNPACKED_FRAGMENT_BYTES: usize = FRAGMENT_SIZE * 4;

/// Bytes consumed per fragment in the packed layout.
pub const PACKED_FRAGMENT_BYTES: usize = FRAGMENT_SIZE * 3;

/// Scale applied after removing the 12-bit midpoint.
const SCALE: f32 = 1.0 / 2048.0;

/// Convert a raw 12-bit sample to a float in [-1.0, 1.0).
#[inline]
fn convert_and_scale(value: u16) -> f32 {
    (((value & 0xFFF) as i32) - 2048) as f32 * SCALE
}

/// Rolling rail state shared by both wire layouts.
///
/// The I buffer holds `I_OVERLAP` carried samples plus one fragment; the Q
/// buffer holds `Q_OVERLAP` plus one fragment. After a fragment is
/// produced the new tails move back to the front.
#[derive(Debug, Clone)]
struct HilbertRails {
    coefficients: Vec<f32>,
    i_buffer: Vec<f32>,
    q_buffer: Vec<f32>,
    variant: Implementation,
}

impl HilbertRails {
    fn new(residual_i: &[f32], residual_q: &[f32], variant: Implementation) -> DspResult<Self> {
        if residual_i.len() != I_OVERLAP || residual_q.len() != Q_OVERLAP {
            return Err(DspError::InvalidArgument(format!(
                "residual lengths must be {I_OVERLAP}/{Q_OVERLAP}, got {}/{}",
                residual_i.len(),
                residual_q.len()
            )));
        }

        let prototype = filter_design::half_band(HILBERT_PROTOTYPE_TAPS)?;
        let coefficients = filter_design::convert_half_band_to_hilbert(&prototype)?;

        let variant = if variant == Implementation::Uncalibrated {
            Implementation::Scalar
        } else {
            variant
        };

        let mut i_buffer = vec![0.0f32; I_OVERLAP + FRAGMENT_SIZE];
        let mut q_buffer = vec![0.0f32; Q_OVERLAP + FRAGMENT_SIZE];
        i_buffer[..I_OVERLAP].copy_from_slice(residual_i);
        q_buffer[..Q_OVERLAP].copy_from_slice(residual_q);

        Ok(Self { coefficients, i_buffer, q_buffer, variant })
    }

    #[inline]
    fn load(&mut self, n: usize, i: u16, q: u16) {
        self.i_buffer[I_OVERLAP + n] = convert_and_scale(i);
        self.q_buffer[Q_OVERLAP + n] = convert_and_scale(q);
    }

    /// Filter the loaded fragment and roll the tails forward.
    fn produce(&mut self, timestamp: u64) -> ComplexSamples {
        let i = self.i_buffer[..FRAGMENT_SIZE].to_vec();

        let mut q = vec![0.0f32; FRAGMENT_SIZE];
        match self.variant.lanes() {
            None => filter_q_scalar(&self.q_buffer, &self.coefficients, &mut q),
            Some(2) => filter_q_lanes::<2>(&self.q_buffer, &self.coefficients, &mut q),
            Some(4) => filter_q_lanes::<4>(&self.q_buffer, &self.coefficients, &mut q),
            Some(8) => filter_q_lanes::<8>(&self.q_buffer, &self.coefficients, &mut q),
            Some(_) => filter_q_lanes::<16>(&self.q_buffer, &self.coefficients, &mut q),
        }

        self.i_buffer.copy_within(FRAGMENT_SIZE.., 0);
        self.q_buffer.copy_within(FRAGMENT_SIZE.., 0);

        ComplexSamples::new(i, q, timestamp)
    }

    fn residual_i(&self) -> &[f32] {
        &self.i_buffer[..I_OVERLAP]
    }

    fn residual_q(&self) -> &[f32] {
        &self.q_buffer[..Q_OVERLAP]
    }
}

/// Iterator over a raw buffer in the unpacked layout: each complex pair is
/// two little-endian 16-bit words carrying 12-bit samples.
#[derive(Debug)]
pub struct UnpackedBufferIterator<'a> {
    bytes: &'a [u8],
    offset: usize,
    timestamp: u64,
    rails: HilbertRails,
}

impl<'a> UnpackedBufferIterator<'a> {
    /// Construct over one raw buffer, seeded with the previous buffer's
    /// residual state. Fails without partial state when the buffer length
    /// is not a whole number of fragments or the residual lengths are
    /// wrong.
    pub fn new(
        bytes: &'a [u8],
        residual_i: &[f32],
        residual_q: &[f32],
        timestamp: u64,
        variant: Implementation,
    ) -> DspResult<Self> {
        if bytes.is_empty() || bytes.len() % UNPACKED_FRAGMENT_BYTES != 0 {
            return Err(DspError::InvalidArgument(format!(
                "buffer length {} is not a multiple of {UNPACKED_FRAGMENT_BYTES}",
                bytes.len()
            )));
        }
        Ok(Self {
            bytes,
            offset: 0,
            timestamp,
            rails: HilbertRails::new(residual_i, residual_q, variant)?,
        })
    }

    /// True while fragments remain.
    pub fn has_next(&self) -> bool {
        self.offset < self.bytes.len()
    }

    /// Produce the next fragment of `FRAGMENT_SIZE` complex samples.
    pub fn next_fragment(&mut self) -> DspResult<ComplexSamples> {
        if !self.has_next() {
            return Err(DspError::InvalidArgument("buffer iterator exhausted".into()));
        }

        let fragment = &self.bytes[self.offset..self.offset + UNPACKED_FRAGMENT_BYTES];
        for (n, pair) in fragment.chunks_exact(4).enumerate() {
            let i = u16::from_le_bytes([pair[0], pair[1]]);
            let q = u16::from_le_bytes([pair[2], pair[3]]);
            self.rails.load(n, i, q);
        }
        self.offset += UNPACKED_FRAGMENT_BYTES;
        Ok(self.rails.produce(self.timestamp))
    }

    /// I rail residual to seed the next buffer's iterator.
    pub fn residual_i(&self) -> &[f32] {
        self.rails.residual_i()
    }

    /// Q rail residual to seed the next buffer's iterator.
    pub fn residual_q(&self) -> &[f32] {
        self.rails.residual_q()
    }
}

impl Iterator for UnpackedBufferIterator<'_> {
    type Item = ComplexSamples;

    fn next(&mut self) -> Option<ComplexSamples> {
        self.has_next().then(|| self.next_fragment()).and_then(Result::ok)
    }
}

/// Iterator over a raw buffer in the packed layout: two 12-bit samples per
/// 3 bytes, first sample in the high nibbles.
#[derive(Debug)]
pub struct PackedBufferIterator<'a> {
    bytes: &'a [u8],
    offset: usize,
    timestamp: u64,
    rails: HilbertRails,
}

impl<'a> PackedBufferIterator<'a> {
    /// Construct over one raw buffer, seeded with the previous buffer's
    /// residual state.
    pub fn new(
        bytes: &'a [u8],
        residual_i: &[f32],
        residual_q: &[f32],
        timestamp: u64,
        variant: Implementation,
    ) -> DspResult<Self> {
        if bytes.is_empty() || bytes.len() % PACKED_FRAGMENT_BYTES != 0 {
            return Err(DspError::InvalidArgument(format!(
                "buffer length {} is not a multiple of {PACKED_FRAGMENT_BYTES}",
                bytes.len()
            )));
        }
        Ok(Self {
            bytes,
            offset: 0,
            timestamp,
            rails: HilbertRails::new(residual_i, residual_q, variant)?,
        })
    }

    /// True while fragments remain.
    pub fn has_next(&self) -> bool {
        self.offset < self.bytes.len()
    }

    /// Produce the next fragment of `FRAGMENT_SIZE` complex samples.
    pub fn next_fragment(&mut self) -> DspResult<ComplexSamples> {
        if !self.has_next() {
            return Err(DspError::InvalidArgument("buffer iterator exhausted".into()));
        }

        let fragment = &self.bytes[self.offset..self.offset + PACKED_FRAGMENT_BYTES];
        for (n, triple) in fragment.chunks_exact(3).enumerate() {
            let i = ((triple[0] as u16) << 4) | ((triple[1] as u16) >> 4);
            let q = (((triple[1] as u16) & 0xF) << 8) | (triple[2] as u16);
            self.rails.load(n, i, q);
        }
        self.offset += PACKED_FRAGMENT_BYTES;
        Ok(self.rails.produce(self.timestamp))
    }

    /// I rail residual to seed the next buffer's iterator.
    pub fn residual_i(&self) -> &[f32] {
        self.rails.residual_i()
    }

    /// Q rail residual to seed the next buffer's iterator.
    pub fn residual_q(&self) -> &[f32] {
        self.rails.residual_q()
    }
}

impl Iterator for PackedBufferIterator<'_> {
    type Item = ComplexSamples;

    fn next(&mut self) -> Option<ComplexSamples> {
        self.has_next().then(|| self.next_fragment()).and_then(Result::ok)
    }
}

/// Build an unpacked-layout iterator, selecting the kernel the calibration
/// registry found fastest on this machine.
pub fn unpacked_buffer_iterator<'a>(
    bytes: &'a [u8],
    residual_i: &[f32],
    residual_q: &[f32],
    timestamp: u64,
    registry: &CalibrationRegistry,
) -> DspResult<UnpackedBufferIterator<'a>> {
    UnpackedBufferIterator::new(
        bytes,
        residual_i,
        residual_q,
        timestamp,
        registry.implementation(CalibrationType::SampleConverterUnpacked),
    )
}

/// Build a packed-layout iterator, selecting the kernel the calibration
/// registry found fastest on this machine.
pub fn packed_buffer_iterator<'a>(
    bytes: &'a [u8],
    residual_i: &[f32],
    residual_q: &[f32],
    timestamp: u64,
    registry: &CalibrationRegistry,
) -> DspResult<PackedBufferIterator<'a>> {
    PackedBufferIterator::new(
        bytes,
        residual_i,
        residual_q,
        timestamp,
        registry.implementation(CalibrationType::SampleConverterPacked),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_I: [f32; I_OVERLAP] = [0.0; I_OVERLAP];
    const ZERO_Q: [f32; Q_OVERLAP] = [0.0; Q_OVERLAP];

    /// Encode a slice of raw 12-bit values into the unpacked layout.
    fn encode_unpacked(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|&v| (v & 0xFFF).to_le_bytes()).collect()
    }

    /// Encode pairs of raw 12-bit values into the packed layout.
    fn encode_packed(values: &[u16]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(values.len() / 2 * 3);
        for pair in values.chunks_exact(2) {
            let a = pair[0] & 0xFFF;
            let b = pair[1] & 0xFFF;
            bytes.push((a >> 4) as u8);
            bytes.push((((a & 0xF) << 4) | (b >> 8)) as u8);
            bytes.push((b & 0xFF) as u8);
        }
        bytes
    }

    /// Raw 12-bit sine wave, `count` samples.
    fn sine_samples(count: usize, start: usize) -> Vec<u16> {
        (0..count)
            .map(|n| {
                let angle = 2.0 * std::f64::consts::PI * 0.013 * (start + n) as f64;
                (2048.0 + angle.sin() * 1800.0) as u16
            })
            .collect()
    }

    #[test]
    fn test_scaling_maps_midpoint_to_zero() {
        assert_eq!(convert_and_scale(2048), 0.0);
        assert_eq!(convert_and_scale(0), -1.0);
        assert!((convert_and_scale(4095) - 2047.0 / 2048.0).abs() < 1e-7);
    }

    #[test]
    fn test_fragment_count_and_length() {
        let raw = sine_samples(FRAGMENT_SIZE * 2 * 3, 0);
        let bytes = encode_unpacked(&raw);
        let mut iterator =
            UnpackedBufferIterator::new(&bytes, &ZERO_I, &ZERO_Q, 7, Implementation::Scalar)
                .unwrap();

        let mut fragments = 0;
        while iterator.has_next() {
            let fragment = iterator.next_fragment().unwrap();
            assert_eq!(fragment.len(), FRAGMENT_SIZE);
            assert_eq!(fragment.timestamp, 7);
            fragments += 1;
        }
        assert_eq!(fragments, 3);
        assert!(iterator.next_fragment().is_err());
    }

    #[test]
    fn test_rejects_bad_lengths() {
        let bytes = vec![0u8; UNPACKED_FRAGMENT_BYTES + 1];
        assert!(UnpackedBufferIterator::new(
            &bytes,
            &ZERO_I,
            &ZERO_Q,
            0,
            Implementation::Scalar
        )
        .is_err());

        let bytes = vec![0u8; UNPACKED_FRAGMENT_BYTES];
        assert!(UnpackedBufferIterator::new(
            &bytes,
            &[0.0; I_OVERLAP + 1],
            &ZERO_Q,
            0,
            Implementation::Scalar
        )
        .is_err());
        assert!(UnpackedBufferIterator::new(
            &bytes,
            &ZERO_I,
            &[0.0; Q_OVERLAP - 1],
            0,
            Implementation::Scalar
        )
        .is_err());

        let bytes = vec![0u8; PACKED_FRAGMENT_BYTES - 3];
        assert!(
            PackedBufferIterator::new(&bytes, &ZERO_I, &ZERO_Q, 0, Implementation::Scalar).is_err()
        );
    }

    #[test]
    fn test_seam_continuity_across_buffers() {
        let raw = sine_samples(FRAGMENT_SIZE * 2 * 4, 0);
        let whole = encode_unpacked(&raw);
        let first = encode_unpacked(&raw[..FRAGMENT_SIZE * 2 * 2]);
        let second = encode_unpacked(&raw[FRAGMENT_SIZE * 2 * 2..]);

        let mut reference =
            UnpackedBufferIterator::new(&whole, &ZERO_I, &ZERO_Q, 0, Implementation::Scalar)
                .unwrap();
        let expected: Vec<ComplexSamples> = reference.by_ref().collect();
        assert_eq!(expected.len(), 4);

        let mut iterator_one =
            UnpackedBufferIterator::new(&first, &ZERO_I, &ZERO_Q, 0, Implementation::Scalar)
                .unwrap();
        let mut seamed: Vec<ComplexSamples> = iterator_one.by_ref().collect();

        let residual_i = iterator_one.residual_i().to_vec();
        let residual_q = iterator_one.residual_q().to_vec();
        let iterator_two = UnpackedBufferIterator::new(
            &second,
            &residual_i,
            &residual_q,
            0,
            Implementation::Scalar,
        )
        .unwrap();
        seamed.extend(iterator_two);

        assert_eq!(seamed.len(), expected.len());
        for (fragment, reference) in seamed.iter().zip(expected.iter()) {
            for n in 0..FRAGMENT_SIZE {
                assert!((fragment.i[n] - reference.i[n]).abs() < 1e-6);
                assert!((fragment.q[n] - reference.q[n]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_packed_matches_unpacked() {
        let raw = sine_samples(FRAGMENT_SIZE * 2 * 2, 0);
        let unpacked = encode_unpacked(&raw);
        let packed = encode_packed(&raw);

        let unpacked_iterator =
            UnpackedBufferIterator::new(&unpacked, &ZERO_I, &ZERO_Q, 0, Implementation::Scalar)
                .unwrap();
        let packed_iterator =
            PackedBufferIterator::new(&packed, &ZERO_I, &ZERO_Q, 0, Implementation::Scalar)
                .unwrap();

        for (a, b) in unpacked_iterator.zip(packed_iterator) {
            for n in 0..FRAGMENT_SIZE {
                assert_eq!(a.i[n], b.i[n]);
                assert_eq!(a.q[n], b.q[n]);
            }
        }
    }

    #[test]
    fn test_scalar_vector_parity() {
        let raw = sine_samples(FRAGMENT_SIZE * 2 * 3, 0);
        let bytes = encode_unpacked(&raw);

        let scalar =
            UnpackedBufferIterator::new(&bytes, &ZERO_I, &ZERO_Q, 0, Implementation::Scalar)
                .unwrap();
        let expected: Vec<ComplexSamples> = scalar.collect();

        for variant in [
            Implementation::Vector64,
            Implementation::Vector128,
            Implementation::Vector256,
            Implementation::Vector512,
        ] {
            let vectored =
                UnpackedBufferIterator::new(&bytes, &ZERO_I, &ZERO_Q, 0, variant).unwrap();
            for (fragment, reference) in vectored.zip(expected.iter()) {
                for n in 0..FRAGMENT_SIZE {
                    assert!((fragment.i[n] - reference.i[n]).abs() < 1e-4);
                    assert!((fragment.q[n] - reference.q[n]).abs() < 1e-4);
                }
            }
        }
    }
}
