//! Fixed-point numeric model shared by every stage of the pipeline.
//!
//! Samples travel as Q15 (`i16`), filter state and transform data as Q31 (`i32`),
//! and every wide multiply is accumulated in Q63 (`i64`) before being narrowed.
//! Narrowing always saturates; it never wraps.

/// Narrow fractional format: 1 sign bit, 15 fraction bits.
pub type Q15 = i16;
/// Wide accumulator format: 1 sign bit, 31 fraction bits.
pub type Q31 = i32;
/// Double-wide intermediate used only for multiply accumulation.
pub type Q63 = i64;

// ============================================================================
// Constants
// ============================================================================

/// Largest representable Q15 value (just below 1.0)
pub const Q15_MAX: Q15 = i16::MAX;

/// Largest representable Q31 value (just below 1.0)
pub const Q31_MAX: Q31 = i32::MAX;

/// Fraction bits of the narrow format
pub const Q15_SHIFT: u32 = 15;

/// Fraction bits of the wide format
pub const Q31_SHIFT: u32 = 31;

/// Difference in fraction widths between Q31 and Q15
const WIDEN_SHIFT: u32 = Q31_SHIFT - Q15_SHIFT;

/// ln(2) in Q15
const LN2_Q15: i64 = 22_713;

// ============================================================================
// Saturation and Conversion
// ============================================================================

/// Saturate a wide intermediate into the Q15 range.
#[inline]
pub fn sat_q15(x: i64) -> Q15 {
    x.clamp(i16::MIN as i64, i16::MAX as i64) as Q15
}

/// Saturate a double-wide intermediate into the Q31 range.
#[inline]
pub fn sat_q31(x: Q63) -> Q31 {
    x.clamp(i32::MIN as i64, i32::MAX as i64) as Q31
}

/// Widen Q15 to Q31. Exact.
#[inline]
pub fn q15_to_q31(x: Q15) -> Q31 {
    (x as i32) << WIDEN_SHIFT
}

/// Narrow Q31 to Q15 with round-half-up and saturation.
#[inline]
pub fn q31_to_q15(x: Q31) -> Q15 {
    sat_q15((x as i64 + (1 << (WIDEN_SHIFT - 1))) >> WIDEN_SHIFT)
}

/// Q31 × Q31 → Q31, accumulated in Q63.
#[inline]
pub fn mul_q31(a: Q31, b: Q31) -> Q31 {
    sat_q31((a as i64 * b as i64) >> Q31_SHIFT)
}

/// Q15 × Q15 → Q15, accumulated in 32 bits.
#[inline]
pub fn mul_q15(a: Q15, b: Q15) -> Q15 {
    sat_q15(((a as i32 * b as i32) >> Q15_SHIFT) as i64)
}

/// Left shift with saturation instead of overflow.
#[inline]
pub fn shl_sat_q31(x: Q31, shift: u32) -> Q31 {
    if shift == 0 {
        return x;
    }
    if shift >= 32 {
        return match x {
            0 => 0,
            v if v > 0 => Q31_MAX,
            _ => i32::MIN,
        };
    }
    sat_q31((x as i64) << shift)
}

// ============================================================================
// Setup-time Helpers
// ============================================================================

/// Quantize a real value in [-1, 1] to Q31 (setup-time only).
pub fn q31_from_f64(x: f64) -> Q31 {
    sat_q31((x * 2_147_483_648.0).round() as i64)
}

/// Integer square root, floor.
pub fn isqrt_u64(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    // Newton iteration from an initial guess above the root
    let mut x = 1u64 << ((64 - n.leading_zeros()).div_ceil(2));
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}

/// Base-2 logarithm of a non-zero integer in Q.8 (8 fraction bits).
///
/// The fraction is produced bit-serially: the normalised mantissa is squared once
/// per output bit, and each time it crosses 2.0 the bit is set.
pub fn log2_q8(v: u64) -> i32 {
    if v == 0 {
        return i32::MIN;
    }
    let lz = v.leading_zeros();
    let int_part = 63 - lz as i32;
    // Mantissa in Q1.31, range [1.0, 2.0)
    let mut m = (v << lz) >> 32;
    let mut frac = 0i32;
    for _ in 0..8 {
        m = (m * m) >> 31;
        frac <<= 1;
        if m >= 1 << 32 {
            m >>= 1;
            frac |= 1;
        }
    }
    (int_part << 8) | frac
}

/// Natural log of a Q31-scaled power value, in Q7.8.
///
/// `ln_q8(1 << 31)` is 0 (ln 1.0). Zero is treated as one LSB.
pub fn ln_q8(v: u64) -> Q15 {
    let log2 = log2_q8(v.max(1)) - ((Q31_SHIFT as i32) << 8);
    sat_q15((log2 as i64 * LN2_Q15) >> Q15_SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturation() {
        assert_eq!(sat_q15(40_000), i16::MAX);
        assert_eq!(sat_q15(-40_000), i16::MIN);
        assert_eq!(sat_q15(123), 123);
        assert_eq!(sat_q31(i64::MAX), i32::MAX);
        assert_eq!(sat_q31(i64::MIN), i32::MIN);
    }

    #[test]
    fn test_widen_narrow() {
        for x in [i16::MIN, -1234, -1, 0, 1, 5678, i16::MAX] {
            assert_eq!(q31_to_q15(q15_to_q31(x)), x);
        }
        // Rounds half up
        assert_eq!(q31_to_q15(1 << 15), 1);
        assert_eq!(q31_to_q15((1 << 15) - 1), 0);
        // Saturates instead of wrapping at the top of the range
        assert_eq!(q31_to_q15(i32::MAX), i16::MAX);
    }

    #[test]
    fn test_multiply() {
        let half = 1 << 30;
        assert_eq!(mul_q31(half, half), 1 << 29);
        assert_eq!(mul_q31(i32::MIN, i32::MIN), i32::MAX);
        assert_eq!(mul_q15(16384, 16384), 8192);
        assert_eq!(mul_q15(i16::MIN, i16::MIN), i16::MAX);
    }

    #[test]
    fn test_shift_saturates() {
        assert_eq!(shl_sat_q31(1 << 20, 4), 1 << 24);
        assert_eq!(shl_sat_q31(1 << 30, 4), i32::MAX);
        assert_eq!(shl_sat_q31(-(1 << 30), 4), i32::MIN);
        assert_eq!(shl_sat_q31(-5, 40), i32::MIN);
    }

    #[test]
    fn test_isqrt() {
        for n in [0u64, 1, 2, 3, 4, 15, 16, 17, 1 << 40, u32::MAX as u64, u64::MAX] {
            let r = isqrt_u64(n);
            assert!(r * r <= n, "n={n} r={r}");
            assert!((r + 1).checked_mul(r + 1).map_or(true, |sq| sq > n), "n={n} r={r}");
        }
    }

    #[test]
    fn test_log2_q8() {
        assert_eq!(log2_q8(1), 0);
        assert_eq!(log2_q8(2), 256);
        assert_eq!(log2_q8(1 << 31), 31 << 8);
        // log2(3) = 1.58496 -> 405.75 in Q.8, truncated
        assert_eq!(log2_q8(3), 405);
    }

    #[test]
    fn test_ln_q8() {
        assert_eq!(ln_q8(1 << 31), 0);
        // ln(0.5) = -0.6931 -> -177.4 in Q7.8
        let half = ln_q8(1 << 30);
        assert!((half + 177).abs() <= 1, "got {half}");
        // Zero clamps to the smallest representable power
        assert_eq!(ln_q8(0), ln_q8(1));
        assert!(ln_q8(1) < -5400);
    }

    #[test]
    fn test_setup_quantizers() {
        assert_eq!(q31_from_f64(-1.0), i32::MIN);
        assert_eq!(q31_from_f64(0.25), 1 << 29);
    }
}
