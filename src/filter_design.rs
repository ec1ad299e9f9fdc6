//! Half-band filter design and coefficient algebra
//!
//! Designs the lowpass prototypes used by the decimation chain. A half-band
//! filter has its cutoff at exactly half the Nyquist frequency, which forces
//! every odd-indexed tap to zero except the center tap, which is exactly
//! 0.5. The decimators in [`crate::half_band`] exploit that structure to
//! halve the multiply count, so the validation here is strict: a coefficient
//! array that does not satisfy the symmetry preconditions is rejected at
//! construction and never reaches the kernels.
//!
//! The same prototype family also yields the Hilbert transform used by the
//! device buffer iterators: the 47-tap half-band converts into an 11-sample
//! I delay line plus a 24-tap antisymmetric Q filter.
//!
//! ## Example
//!
//! ```rust
//! use rxdsp::filter_design;
//!
//! let taps = filter_design::half_band(23).unwrap();
//! assert_eq!(taps.len(), 23);
//! assert_eq!(taps[11], 0.5);       // center tap
//! assert_eq!(taps[1], 0.0);        // odd taps are zero
//! let dc_gain: f32 = taps.iter().sum();
//! assert!((dc_gain - 1.0).abs() < 1e-5);
//! ```

use crate::types::{DspError, DspResult};
use std::f64::consts::PI;

/// Center tap value common to every half-band design.
pub const CENTER_COEFFICIENT: f32 = 0.5;

/// Number of taps in the half-band prototype behind the Hilbert transform.
pub const HILBERT_PROTOTYPE_TAPS: usize = 47;

/// Design a half-band lowpass filter with the requested odd tap count.
///
/// Uses the windowed-sinc method with a Blackman window. The tap count must
/// satisfy `(taps + 1) % 4 == 0` (11, 15, 23, 63, ...) so that the center
/// tap falls on an odd index and the folded decimation kernels apply. The
/// non-zero wing taps are normalized so the filter has exactly unity DC
/// gain.
pub fn half_band(taps: usize) -> DspResult<Vec<f32>> {
    if taps < 7 || (taps + 1) % 4 != 0 {
        return Err(DspError::InvalidHalfBand(format!(
            "tap count {taps} must be at least 7 and satisfy (taps + 1) % 4 == 0"
        )));
    }

    let center = (taps - 1) / 2;
    let mut coefficients = vec![0.0f64; taps];
    coefficients[center] = 0.5;

    // Ideal half-band response sin(pi*k/2)/(pi*k) is zero at even offsets
    // from center, so only odd offsets get a value. The left wing is
    // computed and mirrored so symmetry holds exactly.
    for n in 0..center {
        let k = center as i64 - n as i64;
        if k % 2 != 0 {
            let x = k as f64;
            let sinc = (PI * x / 2.0).sin() / (PI * x);
            let value = sinc * blackman(n, taps);
            coefficients[n] = value;
            coefficients[taps - 1 - n] = value;
        }
    }

    // Normalize the wings so the taps sum to exactly 1.0 (unity DC gain).
    let wing_sum: f64 = coefficients
        .iter()
        .enumerate()
        .filter(|(n, _)| *n != center)
        .map(|(_, c)| *c)
        .sum();
    let scale = 0.5 / wing_sum;
    for (n, coefficient) in coefficients.iter_mut().enumerate() {
        if n != center {
            *coefficient *= scale;
        }
    }

    let result: Vec<f32> = coefficients.iter().map(|&c| c as f32).collect();
    validate_half_band(&result)?;
    Ok(result)
}

/// Validate half-band structure: odd length with `(len + 1) % 4 == 0`,
/// center tap exactly 0.5, all other odd-indexed taps exactly zero, and
/// even-indexed taps mirror-symmetric about the center.
pub fn validate_half_band(coefficients: &[f32]) -> DspResult<()> {
    let len = coefficients.len();
    if len % 2 == 0 {
        return Err(DspError::InvalidFilterLength(len));
    }
    if (len + 1) % 4 != 0 {
        return Err(DspError::InvalidHalfBand(format!(
            "length {len} must satisfy (len + 1) % 4 == 0"
        )));
    }

    let center = (len - 1) / 2;
    if coefficients[center] != CENTER_COEFFICIENT {
        return Err(DspError::InvalidHalfBand(format!(
            "center tap must be exactly 0.5, found {}",
            coefficients[center]
        )));
    }

    for (n, &coefficient) in coefficients.iter().enumerate() {
        if n != center && n % 2 == 1 && coefficient != 0.0 {
            return Err(DspError::InvalidHalfBand(format!(
                "odd-indexed tap {n} must be exactly zero, found {coefficient}"
            )));
        }
        if n % 2 == 0 && coefficient != coefficients[len - 1 - n] {
            return Err(DspError::InvalidHalfBand(format!(
                "tap {n} is not mirror-symmetric with tap {}",
                len - 1 - n
            )));
        }
    }

    Ok(())
}

/// Convert a half-band prototype into Hilbert transform coefficients.
///
/// Takes the non-zero even-indexed taps, doubles them, and alternates their
/// sign, producing an antisymmetric FIR of length `(len + 1) / 2` for the Q
/// rail. The center 0.5 tap becomes the I rail's pure delay of
/// `(len + 1) / 4 - 1` samples and is dropped from the returned array.
pub fn convert_half_band_to_hilbert(coefficients: &[f32]) -> DspResult<Vec<f32>> {
    validate_half_band(coefficients)?;

    let hilbert_length = (coefficients.len() + 1) / 2;
    let mut hilbert = Vec::with_capacity(hilbert_length);

    for k in 0..hilbert_length {
        let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
        hilbert.push(sign * 2.0 * coefficients[2 * k]);
    }

    Ok(hilbert)
}

/// Blackman window coefficient for index `n` of an `len`-tap filter.
fn blackman(n: usize, len: usize) -> f64 {
    let x = 2.0 * PI * n as f64 / (len - 1) as f64;
    0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_tap_counts() {
        for taps in [11, 15, 23, 63] {
            let coefficients = half_band(taps).unwrap();
            assert_eq!(coefficients.len(), taps);
            validate_half_band(&coefficients).unwrap();
        }
    }

    #[test]
    fn test_unity_dc_gain() {
        for taps in [11, 15, 23, 63] {
            let coefficients = half_band(taps).unwrap();
            let sum: f32 = coefficients.iter().sum();
            assert!(
                (sum - 1.0).abs() < 1e-5,
                "{taps}-tap design should have unity DC gain, got {sum}"
            );
        }
    }

    #[test]
    fn test_rejects_bad_tap_counts() {
        assert!(half_band(12).is_err()); // even
        assert!(half_band(13).is_err()); // (13+1)%4 != 0
        assert!(half_band(3).is_err()); // too short
    }

    #[test]
    fn test_validation_rejects_wrong_center() {
        let mut coefficients = half_band(11).unwrap();
        coefficients[5] = 0.499;
        assert!(validate_half_band(&coefficients).is_err());
    }

    #[test]
    fn test_validation_rejects_nonzero_odd_tap() {
        let mut coefficients = half_band(11).unwrap();
        coefficients[1] = 1e-6;
        assert!(validate_half_band(&coefficients).is_err());
    }

    #[test]
    fn test_validation_rejects_asymmetry() {
        let mut coefficients = half_band(11).unwrap();
        coefficients[0] += 0.01;
        assert!(validate_half_band(&coefficients).is_err());
    }

    #[test]
    fn test_hilbert_conversion_shape() {
        let prototype = half_band(HILBERT_PROTOTYPE_TAPS).unwrap();
        let hilbert = convert_half_band_to_hilbert(&prototype).unwrap();
        assert_eq!(hilbert.len(), 24);
    }

    #[test]
    fn test_hilbert_antisymmetric() {
        let prototype = half_band(HILBERT_PROTOTYPE_TAPS).unwrap();
        let hilbert = convert_half_band_to_hilbert(&prototype).unwrap();
        let len = hilbert.len();
        for k in 0..len / 2 {
            assert!(
                (hilbert[k] + hilbert[len - 1 - k]).abs() < 1e-7,
                "tap {k} should be antisymmetric with tap {}",
                len - 1 - k
            );
        }
    }

    #[test]
    fn test_passband_flat() {
        // A low-frequency tone should pass the 63-tap design at ~unity gain.
        let coefficients = half_band(63).unwrap();
        let freq = 0.05; // cycles/sample, well inside the passband
        let n = 4096;
        let input: Vec<f32> = (0..n)
            .map(|x| (2.0 * std::f32::consts::PI * freq * x as f32).sin())
            .collect();

        // Direct convolution, steady-state region only.
        let taps = coefficients.len();
        let mut max_out = 0.0f32;
        for start in taps..n - taps {
            let acc: f32 = coefficients
                .iter()
                .enumerate()
                .map(|(k, &c)| c * input[start + k])
                .sum();
            max_out = max_out.max(acc.abs());
        }
        assert!(
            (max_out - 1.0).abs() < 0.02,
            "passband gain should be ~1.0, got {max_out}"
        );
    }
}
