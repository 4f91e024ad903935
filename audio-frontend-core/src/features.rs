//! Log-mel and frame-energy features from the hop's power spectrum
//!
//! Band edges are computed once at init on the HTK mel scale; triangular weights are
//! evaluated on the fly from the edges, so the filterbank itself costs 42 words of
//! state regardless of frame length.

use crate::fixed_point::{ln_q8, sat_q15, Q15, Q15_MAX, Q15_SHIFT, Q31, Q31_SHIFT};

// ============================================================================
// Constants
// ============================================================================

/// Number of mel bands
pub const FE_MEL_BINS: usize = 40;

/// Band edges: one more than the bands on each side
pub const MEL_EDGES: usize = FE_MEL_BINS + 2;

/// Words needed by [`FeatureFrame::write_into`]: the bands then the energy
pub const FEATURE_FRAME_WORDS: usize = FE_MEL_BINS + 1;

/// Q31 power to Q7.8
const ENERGY_SHIFT: u32 = Q31_SHIFT - 8;

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

// ============================================================================
// Feature Frame
// ============================================================================

/// One hop's features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFrame {
    /// Natural log of each band's energy, Q7.8
    pub log_mel: [Q15; FE_MEL_BINS],
    /// Mean-square energy of the analysed frame, linear Q7.8
    pub frame_energy: Q15,
}

impl Default for FeatureFrame {
    fn default() -> Self {
        Self {
            log_mel: [0; FE_MEL_BINS],
            frame_energy: 0,
        }
    }
}

impl FeatureFrame {
    /// Serialise as `log_mel[0..40], frame_energy`. Returns false if `out` is too short.
    pub fn write_into(&self, out: &mut [i16]) -> bool {
        if out.len() < FEATURE_FRAME_WORDS {
            return false;
        }
        out[..FE_MEL_BINS].copy_from_slice(&self.log_mel);
        out[FE_MEL_BINS] = self.frame_energy;
        true
    }
}

// ============================================================================
// Mel Filterbank
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MelFilterbank {
    edges: [u16; MEL_EDGES],
}

impl MelFilterbank {
    /// Edges from 0 Hz to Nyquist (setup-time only).
    pub fn new(sample_rate: u32, frame_len: usize) -> Self {
        let nyquist = sample_rate as f64 / 2.0;
        let max_mel = hz_to_mel(nyquist);
        let last_bin = (frame_len / 2) as f64;
        let mut edges = [0u16; MEL_EDGES];
        for (i, edge) in edges.iter_mut().enumerate() {
            let hz = mel_to_hz(max_mel * i as f64 / (MEL_EDGES - 1) as f64);
            let bin = ((frame_len + 1) as f64 * hz / sample_rate as f64).floor();
            *edge = bin.clamp(0.0, last_bin) as u16;
        }
        Self { edges }
    }

    pub fn edges(&self) -> &[u16; MEL_EDGES] {
        &self.edges
    }

    /// Q15 weight of bin `k` in band `m`.
    #[inline]
    pub fn weight(&self, m: usize, k: usize) -> Q15 {
        let lo = self.edges[m] as usize;
        let centre = self.edges[m + 1] as usize;
        let hi = self.edges[m + 2] as usize;
        if k < lo || k > hi {
            0
        } else if k == centre {
            Q15_MAX
        } else if k < centre {
            (((k - lo) << Q15_SHIFT) / (centre - lo)).min(Q15_MAX as usize) as Q15
        } else {
            (((hi - k) << Q15_SHIFT) / (hi - centre)).min(Q15_MAX as usize) as Q15
        }
    }

    /// Weighted power of band `m`, Q31.
    pub fn band_energy(&self, m: usize, spectrum: &[Q31]) -> u64 {
        let lo = self.edges[m] as usize;
        let hi = (self.edges[m + 2] as usize).min(spectrum.len().saturating_sub(1));
        let mut energy = 0u64;
        for k in lo..=hi {
            let p = spectrum[k].max(0) as u64;
            energy += (p * self.weight(m, k) as u64) >> Q15_SHIFT;
        }
        energy
    }

    /// Features of one power spectrum (`n_bins` one-sided bins).
    pub fn compute(&self, spectrum: &[Q31]) -> FeatureFrame {
        let mut frame = FeatureFrame::default();
        if spectrum.is_empty() {
            return frame;
        }
        for (m, out) in frame.log_mel.iter_mut().enumerate() {
            *out = ln_q8(self.band_energy(m, spectrum) + 1);
        }
        frame.frame_energy = frame_energy(spectrum);
        frame
    }
}

/// Mean-square energy from a one-sided power spectrum (Parseval), linear Q7.8.
pub fn frame_energy(spectrum: &[Q31]) -> Q15 {
    let n_bins = spectrum.len();
    if n_bins < 2 {
        return 0;
    }
    let edge = spectrum[0].max(0) as u64 + spectrum[n_bins - 1].max(0) as u64;
    let interior: u64 = spectrum[1..n_bins - 1].iter().map(|&p| p.max(0) as u64).sum();
    let total = edge + 2 * interior;
    sat_q15((total >> ENERGY_SHIFT).min(i64::MAX as u64) as i64)
}
