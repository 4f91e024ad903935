//! STFT framing: the sliding analysis window on the way in and overlap-add synthesis
//! on the way out.
//!
//! Both operate on buffers that live in the caller's arena; the structs here only hold
//! the geometry and the normalisation weight.

use crate::fixed_point::{sat_q15, sat_q31, Q15, Q15_SHIFT};

// ============================================================================
// Sliding Window
// ============================================================================

/// Analysis history of one channel, advanced by one hop per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopWindow {
    frame_len: usize,
    hop_len: usize,
}

impl HopWindow {
    pub fn new(frame_len: usize, hop_len: usize) -> Self {
        debug_assert!(hop_len <= frame_len);
        Self { frame_len, hop_len }
    }

    /// Discard the oldest hop and return the tail where the new hop goes.
    #[inline]
    pub fn advance<'h>(&self, history: &'h mut [Q15]) -> &'h mut [Q15] {
        debug_assert_eq!(history.len(), self.frame_len);
        history.copy_within(self.hop_len.., 0);
        &mut history[self.frame_len - self.hop_len..]
    }

    #[inline]
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    #[inline]
    pub fn hop_len(&self) -> usize {
        self.hop_len
    }
}

// ============================================================================
// Overlap-Add Synthesis
// ============================================================================

/// Overlap-add synthesis with COLA normalisation.
///
/// Every frame added to the accumulator is scaled by `1 / (cola_sum · channels)`, so a
/// signal that went through the analysis window unchanged comes out at unity gain, and
/// the per-channel frames average into one mono output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapAdd {
    frame_len: usize,
    hop_len: usize,
    /// Per-frame weight in Q15 (may exceed 1.0 slightly)
    weight_q15: i64,
}

impl OverlapAdd {
    /// `cola_sum` is the window's Q15 overlap sum at this hop (see
    /// [`cola_sum`](crate::fft_processor::cola_sum)).
    pub fn new(frame_len: usize, hop_len: usize, cola_sum: i32, channels: usize) -> Self {
        let denominator = cola_sum.max(1) as i64 * channels.max(1) as i64;
        let weight_q15 = ((1i64 << 30) + denominator / 2) / denominator;
        Self {
            frame_len,
            hop_len,
            weight_q15,
        }
    }

    /// Add one inverse-transformed frame into the accumulator.
    pub fn accumulate(&self, accumulator: &mut [i32], frame: &[Q15]) {
        debug_assert_eq!(accumulator.len(), self.frame_len);
        debug_assert_eq!(frame.len(), self.frame_len);
        let round = 1i64 << (Q15_SHIFT - 1);
        for (acc, &x) in accumulator.iter_mut().zip(frame) {
            let contribution = (x as i64 * self.weight_q15 + round) >> Q15_SHIFT;
            *acc = sat_q31(*acc as i64 + contribution);
        }
    }

    /// Emit the finished hop and slide the accumulator.
    pub fn finalize(&self, accumulator: &mut [i32], output: &mut [Q15]) {
        debug_assert_eq!(output.len(), self.hop_len);
        for (out, &acc) in output.iter_mut().zip(accumulator.iter()) {
            *out = sat_q15(acc as i64);
        }
        accumulator.copy_within(self.hop_len.., 0);
        accumulator[self.frame_len - self.hop_len..].fill(0);
    }

    /// Input-to-output delay in samples
    #[inline]
    pub fn latency_samples(&self) -> usize {
        self.frame_len - self.hop_len
    }
}
