//! Automatic gain control on the synthesized output hop
//!
//! Feed-forward: the hop's RMS drives an envelope follower, the envelope is compared
//! with the target level, and a smoothed Q4.12 gain is applied to the hop. Attack
//! constants govern gain reduction (envelope above target), release constants govern
//! recovery. Below the gate level the gain may fall but never rise, so silence and
//! low-level hiss are not pumped up.

use crate::config::Config;
use crate::fixed_point::{isqrt_u64, sat_q15, Q15, Q15_SHIFT};

// ============================================================================
// Constants
// ============================================================================

/// Fraction bits of the gain format
pub const GAIN_Q12_SHIFT: u32 = 12;

/// Gain of 1.0 in Q4.12
pub const UNITY_GAIN_Q12: i32 = 1 << GAIN_Q12_SHIFT;

/// Largest applied gain (8.0)
pub const MAX_GAIN_Q12: i32 = 8 * UNITY_GAIN_Q12;

/// Smallest applied gain (0.125)
pub const MIN_GAIN_Q12: i32 = UNITY_GAIN_Q12 / 8;

/// Envelope level under which the gain is not raised (about -60 dBFS)
pub const GATE_LEVEL_Q15: i32 = 33;

/// Smoothing coefficient meaning "jump immediately"
const INSTANT_COEFF_Q15: i32 = i16::MAX as i32;

// ============================================================================
// AGC
// ============================================================================

/// AGC state for the mono output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Agc {
    target: i32,
    attack_q15: i32,
    release_q15: i32,
    gain_q12: i32,
    envelope: i32,
}

impl Agc {
    /// `attack_ms`/`release_ms` are converted to per-hop smoothing coefficients.
    pub fn new(target: Q15, attack_ms: u16, release_ms: u16, hop_len: usize, sample_rate: u32) -> Self {
        Self {
            target: target as i32,
            attack_q15: smoothing_coefficient(attack_ms, hop_len, sample_rate),
            release_q15: smoothing_coefficient(release_ms, hop_len, sample_rate),
            gain_q12: UNITY_GAIN_Q12,
            envelope: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.agc_target_level,
            config.agc_attack_ms,
            config.agc_release_ms,
            config.hop_len,
            config.sample_rate,
        )
    }

    /// Measure, update the gain, and apply it to `hop` in place.
    pub fn process(&mut self, hop: &mut [Q15]) {
        if hop.is_empty() {
            return;
        }
        let rms = hop_rms(hop);

        // Envelope: attack when rising, release when falling
        let coeff = if rms > self.envelope {
            self.attack_q15
        } else {
            self.release_q15
        };
        self.envelope += smooth_step(rms - self.envelope, coeff);

        let mut desired = if self.envelope > 0 {
            (((self.target as i64) << GAIN_Q12_SHIFT) / self.envelope as i64) as i32
        } else {
            MAX_GAIN_Q12
        };
        desired = desired.clamp(MIN_GAIN_Q12, MAX_GAIN_Q12);

        if self.envelope < GATE_LEVEL_Q15 && desired > self.gain_q12 {
            desired = self.gain_q12;
        }

        let coeff = if self.envelope > self.target {
            self.attack_q15
        } else {
            self.release_q15
        };
        self.gain_q12 += smooth_step(desired - self.gain_q12, coeff);

        let round = 1i64 << (GAIN_Q12_SHIFT - 1);
        for s in hop.iter_mut() {
            *s = sat_q15((*s as i64 * self.gain_q12 as i64 + round) >> GAIN_Q12_SHIFT);
        }
    }

    pub fn reset(&mut self) {
        self.gain_q12 = UNITY_GAIN_Q12;
        self.envelope = 0;
    }

    /// Current gain, Q4.12
    #[inline]
    pub fn gain_q12(&self) -> i32 {
        self.gain_q12
    }

    /// Current envelope, Q15 RMS
    #[inline]
    pub fn envelope(&self) -> i32 {
        self.envelope
    }
}

#[inline]
fn smooth_step(delta: i32, coeff_q15: i32) -> i32 {
    ((delta as i64 * coeff_q15 as i64) >> Q15_SHIFT) as i32
}

/// Root-mean-square of a Q15 hop.
pub fn hop_rms(hop: &[Q15]) -> i32 {
    if hop.is_empty() {
        return 0;
    }
    let sum: u64 = hop.iter().map(|&s| (s as i64 * s as i64) as u64).sum();
    isqrt_u64(sum / hop.len() as u64) as i32
}

/// Per-hop one-pole coefficient `1 - exp(-hop / τ)` in Q15 (setup-time only).
///
/// A zero time constant means the gain follows its target immediately.
pub fn smoothing_coefficient(time_ms: u16, hop_len: usize, sample_rate: u32) -> i32 {
    if time_ms == 0 || sample_rate == 0 {
        return INSTANT_COEFF_Q15;
    }
    let tau_samples = time_ms as f64 * 0.001 * sample_rate as f64;
    let coeff = 1.0 - (-(hop_len as f64) / tau_samples).exp();
    ((coeff * 32768.0).round() as i32).clamp(1, INSTANT_COEFF_Q15)
}
