//! Minimum-statistics noise tracking for spectral subtraction
//!
//! Each channel keeps, per frequency bin, the smallest power seen since the last
//! tracker reset and a smoothed noise estimate that is pulled toward that minimum.
//! The smoothing rate slows down on hops that look like speech, so transients do not
//! lift the floor.
//!
//! The per-bin vectors live in the caller's arena; [`MinStatistics`] only holds the
//! per-channel counters.

use crate::fft_processor::bin_power;
use crate::fixed_point::Q31;

// ============================================================================
// Constants
// ============================================================================

/// Minimum tracker value after a reset (no observation yet)
pub const POWER_MIN_RESET: Q31 = i32::MAX;

/// Adaptation rate on speech-like hops, as a right shift (1/16)
pub const SPEECH_RATE_SHIFT: u32 = 4;

/// Adaptation rate on noise-only hops, as a right shift (1/8)
pub const NOISE_RATE_SHIFT: u32 = 3;

// ============================================================================
// Per-hop Activity
// ============================================================================

/// What the tracker observed on one hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HopActivity {
    /// Both average and peak power exceeded 1.5× the prior noise average
    pub speech: bool,
    pub average_power: Q31,
    pub peak_power: Q31,
}

// ============================================================================
// Tracker
// ============================================================================

/// Per-channel minimum-statistics state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MinStatistics {
    hops_since_reset: u16,
    last_activity: HopActivity,
}

impl MinStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear counters and re-initialise this channel's vectors.
    pub fn reset(&mut self, noise_est: &mut [Q31], power_min: &mut [Q31]) {
        *self = Self::default();
        noise_est.fill(0);
        power_min.fill(POWER_MIN_RESET);
    }

    /// Track one hop of spectrum and update the noise estimate.
    ///
    /// `re`/`im` hold at least `noise_est.len()` bins.
    pub fn update(
        &mut self,
        re: &[Q31],
        im: &[Q31],
        noise_est: &mut [Q31],
        power_min: &mut [Q31],
        min_track_len: u16,
    ) -> HopActivity {
        let n_bins = noise_est.len();
        debug_assert_eq!(power_min.len(), n_bins);

        // Power, running minimum, and hop-level statistics
        let mut total: i64 = 0;
        let mut peak: Q31 = 0;
        let mut noise_total: i64 = 0;
        for k in 0..n_bins {
            let p = bin_power(re[k], im[k]);
            if p < power_min[k] {
                power_min[k] = p;
            }
            total += p as i64;
            peak = peak.max(p);
            noise_total += noise_est[k] as i64;
        }

        let average = (total / n_bins as i64) as Q31;
        let noise_average = noise_total / n_bins as i64;
        let threshold = (noise_average * 3) >> 1;
        let speech = average as i64 > threshold && peak as i64 > threshold;

        let shift = if speech {
            SPEECH_RATE_SHIFT
        } else {
            NOISE_RATE_SHIFT
        };

        for (est, &min) in noise_est.iter_mut().zip(power_min.iter()) {
            let blend = ((min as i64 + *est as i64) >> 1) as Q31;
            *est = *est - (*est >> shift) + (blend >> shift);
        }

        self.hops_since_reset = self.hops_since_reset.saturating_add(1);
        if self.hops_since_reset >= min_track_len {
            power_min.fill(POWER_MIN_RESET);
            self.hops_since_reset = 0;
        }

        self.last_activity = HopActivity {
            speech,
            average_power: average,
            peak_power: peak,
        };
        self.last_activity
    }

    #[inline]
    pub fn last_activity(&self) -> HopActivity {
        self.last_activity
    }

    #[inline]
    pub fn hops_since_reset(&self) -> u16 {
        self.hops_since_reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BINS: usize = 33;

    fn average_noise(noise_est: &[Q31]) -> Q31 {
        let total: i64 = noise_est.iter().map(|&e| e as i64).sum();
        (total / noise_est.len() as i64) as Q31
    }

    struct Fixture {
        stats: MinStatistics,
        noise_est: Vec<Q31>,
        power_min: Vec<Q31>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut fixture = Self {
                stats: MinStatistics::new(),
                noise_est: vec![0; BINS],
                power_min: vec![0; BINS],
            };
            fixture
                .stats
                .reset(&mut fixture.noise_est, &mut fixture.power_min);
            fixture
        }

        fn hop(&mut self, re: &[Q31], min_track_len: u16) -> HopActivity {
            let im = vec![0; re.len()];
            self.stats.update(
                re,
                &im,
                &mut self.noise_est,
                &mut self.power_min,
                min_track_len,
            )
        }
    }

    #[test]
    fn test_reset_state() {
        let fixture = Fixture::new();
        assert!(fixture.noise_est.iter().all(|&e| e == 0));
        assert!(fixture.power_min.iter().all(|&m| m == POWER_MIN_RESET));
        assert_eq!(fixture.stats.hops_since_reset(), 0);
    }

    #[test]
    fn test_silence_keeps_estimate_at_zero() {
        let mut fixture = Fixture::new();
        let re = vec![0; BINS];
        for _ in 0..100 {
            let activity = fixture.hop(&re, 25);
            assert!(!activity.speech);
        }
        assert!(fixture.noise_est.iter().all(|&e| e == 0));
    }

    #[test]
    fn test_estimate_converges_to_stationary_power() {
        let mut fixture = Fixture::new();
        let re = vec![1 << 28; BINS];
        let expected = bin_power(1 << 28, 0);
        for _ in 0..300 {
            fixture.hop(&re, 25);
        }
        for &est in &fixture.noise_est {
            let error = (est as i64 - expected as i64).abs();
            assert!(error * 100 < expected as i64, "est={est} expected={expected}");
        }
    }

    #[test]
    fn test_estimate_decays_after_noise_stops() {
        let mut fixture = Fixture::new();
        let loud = vec![1 << 27; BINS];
        for _ in 0..100 {
            fixture.hop(&loud, 25);
        }
        let before = average_noise(&fixture.noise_est);
        let quiet = vec![0; BINS];
        for _ in 0..300 {
            fixture.hop(&quiet, 25);
        }
        let after = average_noise(&fixture.noise_est);
        assert!(before > 1 << 20);
        // Integer truncation leaves at most a few LSB
        assert!(after < 16, "after={after}");
    }

    #[test]
    fn test_speech_detection_and_rate() {
        let mut fixture = Fixture::new();
        let noise = vec![1 << 24; BINS];
        for _ in 0..200 {
            fixture.hop(&noise, 25);
        }
        // Same level again: not speech
        assert!(!fixture.hop(&noise, 25).speech);

        // A loud hop lifts both average and peak over 1.5x the floor
        let est_before = fixture.noise_est[0];
        let speech = vec![1 << 28; BINS];
        let activity = fixture.hop(&speech, 25);
        assert!(activity.speech);
        assert!(activity.average_power > 0);
        assert_eq!(activity.peak_power, bin_power(1 << 28, 0));

        // The minimum held the estimate; the slow rate moved it by at most 1/16
        let est_after = fixture.noise_est[0];
        assert!((est_after - est_before).abs() <= est_before / 16 + 1);
    }

    #[test]
    fn test_peak_alone_is_not_speech() {
        let mut fixture = Fixture::new();
        let noise = vec![1 << 24; BINS];
        for _ in 0..200 {
            fixture.hop(&noise, 25);
        }
        // One loud bin lifts the peak but barely moves the average
        let mut spike = noise.clone();
        spike[5] = 1 << 26;
        assert!(!fixture.hop(&spike, 25).speech);
    }

    #[test]
    fn test_minimum_resets_every_cycle() {
        let mut fixture = Fixture::new();
        let re = vec![1 << 20; BINS];
        for hop in 1..=10u16 {
            fixture.hop(&re, 4);
            if hop % 4 == 0 {
                assert!(fixture.power_min.iter().all(|&m| m == POWER_MIN_RESET));
                assert_eq!(fixture.stats.hops_since_reset(), 0);
            } else {
                assert!(fixture.power_min.iter().all(|&m| m == bin_power(1 << 20, 0)));
            }
        }
    }

    #[test]
    fn test_minimum_tracks_lowest_power() {
        let mut fixture = Fixture::new();
        fixture.hop(&vec![1 << 26; BINS], 100);
        fixture.hop(&vec![1 << 24; BINS], 100);
        fixture.hop(&vec![1 << 27; BINS], 100);
        assert!(fixture.power_min.iter().all(|&m| m == bin_power(1 << 24, 0)));
        assert_eq!(fixture.stats.last_activity().peak_power, bin_power(1 << 27, 0));
    }
}
