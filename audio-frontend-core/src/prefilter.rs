//! Per-channel pre-filters: DC removal followed by pre-emphasis.

use crate::fixed_point::{mul_q15, mul_q31, q15_to_q31, q31_to_q15, sat_q15, sat_q31, Q15, Q31};

/// One-pole DC blocker, direct form I, in Q31.
///
/// `y[n] = x[n] - x[n-1] + α·y[n-1]`
#[derive(Debug, Clone, Copy, Default)]
pub struct DcRemoval {
    alpha: Q31,
    x_prev: Q31,
    y_prev: Q31,
}

impl DcRemoval {
    pub fn new(alpha: Q31) -> Self {
        Self {
            alpha,
            x_prev: 0,
            y_prev: 0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: Q31) -> Q31 {
        let feedback = mul_q31(self.alpha, self.y_prev) as i64;
        let y = sat_q31(x as i64 - self.x_prev as i64 + feedback);
        self.x_prev = x;
        self.y_prev = y;
        y
    }

    pub fn reset(&mut self) {
        self.x_prev = 0;
        self.y_prev = 0;
    }
}

/// One-zero pre-emphasis in Q15: `y[n] = x[n] - α·x[n-1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreEmphasis {
    alpha: Q15,
    x_prev: Q15,
}

impl PreEmphasis {
    pub fn new(alpha: Q15) -> Self {
        Self { alpha, x_prev: 0 }
    }

    #[inline]
    pub fn process(&mut self, x: Q15) -> Q15 {
        let scaled = mul_q15(self.alpha, self.x_prev);
        self.x_prev = x;
        sat_q15(x as i64 - scaled as i64)
    }

    pub fn reset(&mut self) {
        self.x_prev = 0;
    }
}

/// The two pre-filters of one channel, in pipeline order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelPrefilter {
    pub dc: DcRemoval,
    pub pre_emphasis: PreEmphasis,
}

impl ChannelPrefilter {
    pub fn new(dc_alpha: Q31, pre_emphasis_alpha: Q15) -> Self {
        Self {
            dc: DcRemoval::new(dc_alpha),
            pre_emphasis: PreEmphasis::new(pre_emphasis_alpha),
        }
    }

    /// Filter one Q15 input sample: widen, remove DC in Q31, narrow, pre-emphasise.
    #[inline]
    pub fn process(&mut self, x: Q15) -> Q15 {
        let dc_free = q31_to_q15(self.dc.process(q15_to_q31(x)));
        self.pre_emphasis.process(dc_free)
    }

    pub fn reset(&mut self) {
        self.dc.reset();
        self.pre_emphasis.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dc_alpha_for_cutoff;

    #[test]
    fn test_dc_removal_converges_to_zero() {
        for alpha in [dc_alpha_for_cutoff(20.0, 16_000), 1 << 30, 1 << 20] {
            let mut dc = DcRemoval::new(alpha);
            let input = q15_to_q31(12_000);
            let mut y = 0;
            for _ in 0..20_000 {
                y = dc.process(input);
            }
            assert!(y.abs() < 1 << 16, "alpha={alpha} y={y}");
        }
    }

    #[test]
    fn test_dc_removal_negative_offset() {
        let mut dc = DcRemoval::new(dc_alpha_for_cutoff(50.0, 16_000));
        let input = q15_to_q31(-20_000);
        let mut y = 0;
        for _ in 0..20_000 {
            y = dc.process(input);
        }
        // Truncating multiply leaves a small negative residue, well under one Q15 LSB
        assert!(y <= 0 && y > -(1 << 16), "y={y}");
    }

    #[test]
    fn test_dc_removal_passes_tone() {
        let mut dc = DcRemoval::new(dc_alpha_for_cutoff(20.0, 16_000));
        let mut peak = 0i32;
        for n in 0..4000 {
            let x = (0.5 * (2.0 * std::f64::consts::PI * 1000.0 * n as f64 / 16_000.0).sin()
                * 2_147_483_648.0) as i32;
            let y = dc.process(x);
            if n > 2000 {
                peak = peak.max(y.abs());
            }
        }
        let ratio = peak as f64 / (1u64 << 30) as f64;
        assert!((ratio - 1.0).abs() < 0.02, "ratio={ratio}");
    }

    #[test]
    fn test_dc_removal_saturates() {
        let mut dc = DcRemoval::new(i32::MAX);
        dc.process(i32::MIN);
        let y = dc.process(i32::MAX);
        assert_eq!(y, i32::MAX);
    }

    #[test]
    fn test_pre_emphasis_zero_alpha_is_identity() {
        let mut pre = PreEmphasis::new(0);
        for x in [0, 1, -1, 12_345, -32_768, 32_767, 42] {
            assert_eq!(pre.process(x), x);
        }
    }

    #[test]
    fn test_pre_emphasis_difference() {
        let mut pre = PreEmphasis::new(16_384);
        assert_eq!(pre.process(1000), 1000);
        assert_eq!(pre.process(1000), 500);
        assert_eq!(pre.process(0), -500);
        // Saturates rather than wrapping
        let mut pre = PreEmphasis::new(i16::MAX);
        pre.process(i16::MIN);
        assert_eq!(pre.process(i16::MAX), i16::MAX);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut filter = ChannelPrefilter::new(dc_alpha_for_cutoff(20.0, 16_000), 31_785);
        let fresh = filter;
        for x in [1000, -2000, 3000] {
            filter.process(x);
        }
        filter.reset();
        let mut fresh = fresh;
        for x in [500, 600, -700] {
            assert_eq!(filter.process(x), fresh.process(x));
        }
    }
}
