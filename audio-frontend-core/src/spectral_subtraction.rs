//! Spectral subtraction gains for the minimum-statistics suppressor
//!
//! Gains are Q6.9 with 512 as unity. A bin whose power does not clear the floor is
//! muted outright; otherwise the over-subtracted noise estimate is removed from its
//! power, the remainder is clamped to the floor, and the ratio to the unsuppressed power
//! becomes the gain. Gains scale real and imaginary parts alike, so phase is kept.

use crate::config::{Config, Q9_UNITY};
use crate::fft_processor::bin_power;
use crate::fixed_point::{sat_q31, Q31};
use crate::noise_profile::{HopActivity, MinStatistics};

/// Fraction bits of the Q6.9 gain format
pub const GAIN_SHIFT: u32 = 9;

// ============================================================================
// Spectral Subtractor
// ============================================================================

/// Suppressor tuning plus the per-channel pipeline: track, compute gains, apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectralSubtractor {
    /// Q6.9
    over_subtract: i16,
    floor: i16,
    min_track_len: u16,
}

impl SpectralSubtractor {
    pub fn new(over_subtract: i16, floor: i16, min_track_len: u16) -> Self {
        Self {
            over_subtract,
            floor,
            min_track_len,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.ns_over_subtract,
            config.ns_floor,
            config.ns_min_track_len,
        )
    }

    /// Q6.9 gain for one bin.
    #[inline]
    pub fn gain(&self, power: Q31, noise_est: Q31) -> i16 {
        let floor = self.floor as i64;
        let power = power as i64;
        if power <= floor {
            return 0;
        }
        let subtracted = (self.over_subtract as i64 * noise_est as i64) >> GAIN_SHIFT;
        let numerator = (power - subtracted).max(floor);
        let gain = (numerator << GAIN_SHIFT) / (power + 1);
        gain.clamp(0, Q9_UNITY as i64) as i16
    }

    /// Fill `gains` from the current spectrum and noise estimate.
    pub fn compute_gains(&self, re: &[Q31], im: &[Q31], noise_est: &[Q31], gains: &mut [i16]) {
        for (k, (g, &est)) in gains.iter_mut().zip(noise_est).enumerate() {
            *g = self.gain(bin_power(re[k], im[k]), est);
        }
    }

    /// Run the full suppressor on one channel's one-sided spectrum.
    ///
    /// Updates the tracker, writes the per-bin gains, and scales bins `0..n_bins` of
    /// `re`/`im` in place.
    pub fn process(
        &self,
        stats: &mut MinStatistics,
        re: &mut [Q31],
        im: &mut [Q31],
        noise_est: &mut [Q31],
        power_min: &mut [Q31],
        gains: &mut [i16],
    ) -> HopActivity {
        let activity = stats.update(re, im, noise_est, power_min, self.min_track_len);
        self.compute_gains(re, im, noise_est, gains);
        apply_gains(re, im, gains);
        activity
    }

    #[inline]
    pub fn min_track_len(&self) -> u16 {
        self.min_track_len
    }
}

/// Scale each bin by its Q6.9 gain, phase-preserving.
pub fn apply_gains(re: &mut [Q31], im: &mut [Q31], gains: &[i16]) {
    for ((r, i), &g) in re.iter_mut().zip(im.iter_mut()).zip(gains) {
        *r = sat_q31((*r as i64 * g as i64) >> GAIN_SHIFT);
        *i = sat_q31((*i as i64 * g as i64) >> GAIN_SHIFT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise_profile::POWER_MIN_RESET;

    fn subtractor() -> SpectralSubtractor {
        SpectralSubtractor::new(Q9_UNITY, 26, 25)
    }

    #[test]
    fn test_gain_below_floor_is_zero() {
        let ns = subtractor();
        assert_eq!(ns.gain(0, 0), 0);
        assert_eq!(ns.gain(26, 0), 0);
        assert_eq!(ns.gain(27, 0), 493);
    }

    #[test]
    fn test_gain_without_noise_is_near_unity() {
        let ns = subtractor();
        assert_eq!(ns.gain(1 << 20, 0), 511);
        assert_eq!(ns.gain(i32::MAX, 0), 511);
    }

    #[test]
    fn test_gain_subtracts_noise() {
        let ns = subtractor();
        // Half the power is noise -> gain 0.5
        let gain = ns.gain(1 << 20, 1 << 19);
        assert!((gain - 256).abs() <= 1, "gain={gain}");

        // Over-subtraction of 2.0 removes all of it; numerator hits the floor
        let aggressive = SpectralSubtractor::new(2 * Q9_UNITY, 26, 25);
        assert_eq!(aggressive.gain(1 << 20, 1 << 19), 0);
    }

    #[test]
    fn test_gain_floor_clamps_numerator() {
        let ns = SpectralSubtractor::new(Q9_UNITY, 1000, 25);
        // Noise exceeds power: numerator clamps to the floor, gain = floor/power
        let gain = ns.gain(4000, 1 << 20);
        assert_eq!(gain, ((1000i64 << 9) / 4001) as i16);
    }

    #[test]
    fn test_apply_gains_preserves_phase() {
        let mut re = vec![1 << 20, -(1 << 20), 1000];
        let mut im = vec![1 << 19, 1 << 21, -1000];
        apply_gains(&mut re, &mut im, &[256, 512, 0]);
        assert_eq!(re, vec![1 << 19, -(1 << 20), 0]);
        assert_eq!(im, vec![1 << 18, 1 << 21, 0]);
    }

    #[test]
    fn test_process_on_fresh_channel() {
        let ns = subtractor();
        let bins = 17;
        let mut stats = MinStatistics::new();
        let mut noise_est = vec![0; bins];
        let mut power_min = vec![POWER_MIN_RESET; bins];
        let mut gains = vec![0; bins];
        let mut re = vec![0; bins];
        let mut im = vec![0; bins];
        re[4] = 1 << 28;
        im[4] = 1 << 27;

        let activity = ns.process(&mut stats, &mut re, &mut im, &mut noise_est, &mut power_min, &mut gains);
        assert!(activity.speech);
        // The estimate has only just started to rise: the tone passes almost untouched
        assert!((490..=500).contains(&gains[4]), "gain={}", gains[4]);
        assert!(gains.iter().enumerate().all(|(k, &g)| k == 4 || g == 0));
        assert_eq!(re[4], ((1i64 << 28) * gains[4] as i64 >> 9) as i32);
    }

    #[test]
    fn test_silence_converges_to_full_suppression() {
        let ns = subtractor();
        let bins = 17;
        let mut stats = MinStatistics::new();
        let mut noise_est = vec![0; bins];
        let mut power_min = vec![POWER_MIN_RESET; bins];
        let mut gains = vec![512; bins];

        // Noise first, then silence for several tracking cycles
        for hop in 0..300 {
            let level = if hop < 50 { 1 << 24 } else { 0 };
            let mut re = vec![level; bins];
            let mut im = vec![0; bins];
            ns.process(&mut stats, &mut re, &mut im, &mut noise_est, &mut power_min, &mut gains);
        }
        assert!(noise_est.iter().all(|&e| e < 16));
        assert!(gains.iter().all(|&g| g == 0));
    }

    #[test]
    fn test_tone_over_noise_floor() {
        let ns = subtractor();
        let bins = 65;
        let tone_bin = 10;
        let mut stats = MinStatistics::new();
        let mut noise_est = vec![0; bins];
        let mut power_min = vec![POWER_MIN_RESET; bins];
        let mut gains = vec![0; bins];

        // The tone lands mid-cycle, while the tracked minimum still holds the noise
        let noise_level = 1 << 22;
        for _ in 0..90 {
            let mut re = vec![noise_level; bins];
            let mut im = vec![0; bins];
            ns.process(&mut stats, &mut re, &mut im, &mut noise_est, &mut power_min, &mut gains);
        }
        let mut re = vec![noise_level; bins];
        let mut im = vec![0; bins];
        re[tone_bin] = 1 << 29;
        ns.process(&mut stats, &mut re, &mut im, &mut noise_est, &mut power_min, &mut gains);

        assert!(gains[tone_bin] >= 500, "tone gain {}", gains[tone_bin]);
        // Stationary bins sit on the estimate: gain near the floor
        assert!(gains[40] < 32, "noise gain {}", gains[40]);
    }
}
