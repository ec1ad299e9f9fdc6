//! Implementation variants and SIMD capability detection
//!
//! Every hot operation in the receiver (half-band decimation, FIR, mixing,
//! oscillation, FM demodulation, gain, sample conversion) exists in a
//! portable scalar form and in fixed-lane-width vector forms. The vector
//! forms group their arithmetic into 2/4/8/16-float lanes so that LLVM can
//! emit SSE/AVX/AVX-512 or NEON code for them; scalar and vector forms are
//! numerically equivalent only to within float tolerance because their
//! partial sums group differently.
//!
//! Which form actually runs is decided once per host machine by the
//! calibration registry (see [`crate::calibrate`]); this module defines the
//! closed set of variants and reports the widest vector width the current
//! hardware supports.
//!
//! ## Example
//!
//! ```rust
//! use rxdsp::vector::Implementation;
//!
//! let max = rxdsp::vector::max_supported();
//! assert!(Implementation::Vector64.is_supported(max));
//! assert_eq!(Implementation::Vector256.lanes(), Some(8));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of implementation variants for one operation kind.
///
/// `Uncalibrated` is the state of an operation kind before calibration has
/// run on this machine; factories treat it as `Scalar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Implementation {
    Scalar,
    Vector64,
    Vector128,
    Vector256,
    Vector512,
    Uncalibrated,
}

impl Implementation {
    /// All selectable variants, ordered narrowest first.
    ///
    /// The ordering matters: calibration breaks timing ties in favor of the
    /// earlier (more portable) variant.
    pub const CANDIDATES: [Implementation; 5] = [
        Implementation::Scalar,
        Implementation::Vector64,
        Implementation::Vector128,
        Implementation::Vector256,
        Implementation::Vector512,
    ];

    /// Number of f32 lanes for vector variants, `None` for scalar states.
    pub fn lanes(&self) -> Option<usize> {
        match self {
            Implementation::Vector64 => Some(2),
            Implementation::Vector128 => Some(4),
            Implementation::Vector256 => Some(8),
            Implementation::Vector512 => Some(16),
            Implementation::Scalar | Implementation::Uncalibrated => None,
        }
    }

    /// Vector register width in bits, 0 for scalar states.
    pub fn width_bits(&self) -> usize {
        self.lanes().map_or(0, |lanes| lanes * 32)
    }

    /// True when this variant can execute efficiently on hardware whose
    /// widest vector register is `max` bits.
    ///
    /// Variants wider than the hardware register are excluded from
    /// calibration entirely rather than penalized.
    pub fn is_supported(&self, max_width_bits: usize) -> bool {
        self.width_bits() <= max_width_bits
    }

    /// Stable key used when persisting a calibration record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Implementation::Scalar => "SCALAR",
            Implementation::Vector64 => "VECTOR_64",
            Implementation::Vector128 => "VECTOR_128",
            Implementation::Vector256 => "VECTOR_256",
            Implementation::Vector512 => "VECTOR_512",
            Implementation::Uncalibrated => "UNCALIBRATED",
        }
    }
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Implementation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCALAR" => Ok(Implementation::Scalar),
            "VECTOR_64" => Ok(Implementation::Vector64),
            "VECTOR_128" => Ok(Implementation::Vector128),
            "VECTOR_256" => Ok(Implementation::Vector256),
            "VECTOR_512" => Ok(Implementation::Vector512),
            "UNCALIBRATED" => Ok(Implementation::Uncalibrated),
            other => Err(format!("Unknown implementation: {other}")),
        }
    }
}

/// Widest vector register width (bits) usable on the current host.
///
/// x86-64 always has 128-bit SSE2; AVX2 raises the limit to 256 and
/// AVX-512F to 512. aarch64 has 128-bit NEON. Anything else is assumed to
/// manage only 64-bit operations.
pub fn max_supported() -> usize {
    #[cfg(target_arch = "x86_64")]
    {
        if std::arch::is_x86_feature_detected!("avx512f") {
            512
        } else if std::arch::is_x86_feature_detected!("avx2") {
            256
        } else {
            128
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        128
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_counts() {
        assert_eq!(Implementation::Scalar.lanes(), None);
        assert_eq!(Implementation::Vector64.lanes(), Some(2));
        assert_eq!(Implementation::Vector128.lanes(), Some(4));
        assert_eq!(Implementation::Vector256.lanes(), Some(8));
        assert_eq!(Implementation::Vector512.lanes(), Some(16));
        assert_eq!(Implementation::Uncalibrated.lanes(), None);
    }

    #[test]
    fn test_support_filtering() {
        assert!(Implementation::Scalar.is_supported(0));
        assert!(Implementation::Vector128.is_supported(128));
        assert!(!Implementation::Vector256.is_supported(128));
        assert!(!Implementation::Vector512.is_supported(256));
        assert!(Implementation::Vector512.is_supported(512));
    }

    #[test]
    fn test_persistence_roundtrip() {
        for variant in Implementation::CANDIDATES {
            let restored: Implementation = variant.as_str().parse().unwrap();
            assert_eq!(restored, variant);
        }
        let uncal: Implementation = "UNCALIBRATED".parse().unwrap();
        assert_eq!(uncal, Implementation::Uncalibrated);
        assert!("VECTOR_1024".parse::<Implementation>().is_err());
    }

    #[test]
    fn test_host_reports_some_width() {
        let width = max_supported();
        assert!(width >= 64, "host width should be at least 64: {width}");
    }

    #[test]
    fn test_candidates_ordered_narrowest_first() {
        let widths: Vec<usize> = Implementation::CANDIDATES
            .iter()
            .map(|c| c.width_bits())
            .collect();
        let mut sorted = widths.clone();
        sorted.sort_unstable();
        assert_eq!(widths, sorted);
    }
}
