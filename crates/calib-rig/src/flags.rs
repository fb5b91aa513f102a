//! Solver flag mask.
//!
//! Bit values follow OpenCV's `calib3d` flag contract so that a solver
//! adapter can pass the mask through unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibFlags(u32);

impl CalibFlags {
    pub const NONE: Self = Self(0);
    pub const USE_INTRINSIC_GUESS: Self = Self(1);
    pub const FIX_ASPECT_RATIO: Self = Self(2);
    pub const FIX_PRINCIPAL_POINT: Self = Self(4);
    pub const ZERO_TANGENT_DIST: Self = Self(8);
    pub const FIX_K1: Self = Self(32);
    pub const FIX_K2: Self = Self(64);
    pub const FIX_K3: Self = Self(128);
    pub const FIX_INTRINSIC: Self = Self(256);
    pub const ZERO_DISPARITY: Self = Self(1024);
    pub const FIX_K4: Self = Self(2048);
    pub const FIX_K5: Self = Self(4096);

    const DESCRIBED: [(CalibFlags, &'static str); 9] = [
        (Self::FIX_K1, "+fix_k1"),
        (Self::FIX_K2, "+fix_k2"),
        (Self::FIX_K3, "+fix_k3"),
        (Self::FIX_K4, "+fix_k4"),
        (Self::FIX_K5, "+fix_k5"),
        (Self::USE_INTRINSIC_GUESS, "+use_intrinsic_guess"),
        (Self::FIX_ASPECT_RATIO, "+fix_aspectRatio"),
        (Self::FIX_PRINCIPAL_POINT, "+fix_principal_point"),
        (Self::ZERO_TANGENT_DIST, "+zero_tangent_dist"),
    ];

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Human-readable flag list, e.g. `+fix_k3 +fix_principal_point`.
    pub fn describe(self) -> String {
        Self::DESCRIBED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl BitOr for CalibFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CalibFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for CalibFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse the five-digit "fix distortion coefficient" string (`k1 k2 k3 k4 k5`).
///
/// Returns `None` unless the input is exactly five `0`/`1` characters.
pub fn parse_fix_digits(s: &str) -> Option<[bool; 5]> {
    let bytes = s.as_bytes();
    if bytes.len() != 5 {
        return None;
    }
    let mut out = [false; 5];
    for (slot, b) in out.iter_mut().zip(bytes) {
        *slot = match b {
            b'0' => false,
            b'1' => true,
            _ => return None,
        };
    }
    Some(out)
}

/// Combine the fix-distortion digits and solver toggles into one mask.
///
/// Digit `i < 3` fixes `k(i+1)` via `FIX_K1 << i`; digits 3 and 4 skip the
/// three bits OpenCV reserves in between (`FIX_K1 << (i + 3)`).
pub fn build_flag_mask(
    digits: [bool; 5],
    fix_principal_point: bool,
    zero_tangent: bool,
    fix_aspect: bool,
) -> CalibFlags {
    let mut flags = CalibFlags::NONE;
    for (i, fixed) in digits.iter().enumerate() {
        if *fixed {
            let shift = if i < 3 { i } else { i + 3 };
            flags |= CalibFlags(CalibFlags::FIX_K1.0 << shift);
        }
    }
    if fix_principal_point {
        flags |= CalibFlags::FIX_PRINCIPAL_POINT;
    }
    if zero_tangent {
        flags |= CalibFlags::ZERO_TANGENT_DIST;
    }
    if fix_aspect {
        flags |= CalibFlags::FIX_ASPECT_RATIO;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_order_digits_skip_reserved_bits() {
        let digits = parse_fix_digits("00111").expect("digits");
        let mask = build_flag_mask(digits, true, false, false);
        assert_eq!(
            mask,
            CalibFlags::FIX_K3
                | CalibFlags::FIX_K4
                | CalibFlags::FIX_K5
                | CalibFlags::FIX_PRINCIPAL_POINT
        );
        assert_eq!(mask.bits(), 6276);
    }

    #[test]
    fn low_order_digits_and_toggles() {
        let mask = build_flag_mask([true, true, false, false, false], false, true, true);
        assert_eq!(mask.bits(), 32 | 64 | 8 | 2);
        assert!(!mask.contains(CalibFlags::FIX_K3));
    }

    #[test]
    fn digit_string_must_be_five_binary_characters() {
        assert_eq!(parse_fix_digits("10000"), Some([true, false, false, false, false]));
        assert_eq!(parse_fix_digits("0000"), None);
        assert_eq!(parse_fix_digits("000000"), None);
        assert_eq!(parse_fix_digits("00201"), None);
        assert_eq!(parse_fix_digits(""), None);
    }

    #[test]
    fn describe_lists_flags_in_fixed_order() {
        let flags = CalibFlags::ZERO_TANGENT_DIST | CalibFlags::FIX_K1 | CalibFlags::USE_INTRINSIC_GUESS;
        assert_eq!(
            flags.describe(),
            "+fix_k1 +use_intrinsic_guess +zero_tangent_dist"
        );
        assert_eq!(CalibFlags::NONE.describe(), "");
    }
}
