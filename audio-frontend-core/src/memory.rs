//! Memory planner: sizes and layout of the caller-owned scratch arena.
//!
//! The arena is a slice of `i32` words. Its layout is a pure function of the
//! configuration, computed once and then reused by every hop:
//!
//! ```text
//! | frame | re | im | gain | history | overlap | spectrum | noise_est | power_min |
//!   ------------ working -----------   ------------------ persistent --------------
//! ```
//!
//! Working regions are overwritten on every hop. Persistent regions carry per-channel
//! state across hops and are cleared by `init` and `reset`. The noise-suppressor vectors
//! are only present when suppression is enabled.

use std::mem::size_of;

use crate::config::Config;
use crate::engine::FrontEnd;
use crate::fft_processor::Tables;

/// Bytes per arena word
pub const WORD_BYTES: usize = size_of::<i32>();

/// A contiguous run of arena words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub offset: usize,
    pub words: usize,
}

impl Region {
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.words
    }

    /// Borrow this region of the arena.
    #[inline]
    pub fn of<'s>(&self, arena: &'s [i32]) -> &'s [i32] {
        &arena[self.offset..self.end()]
    }
}

/// Word layout of the scratch arena for one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScratchLayout {
    pub frame_len: usize,
    pub n_bins: usize,
    pub channels: usize,
    /// Windowed frame, Q15
    pub frame: Region,
    /// Transform real part, Q31
    pub re: Region,
    /// Transform imaginary part, Q31
    pub im: Region,
    /// Suppression gains, Q6.9
    pub gain: Region,
    /// Per-channel analysis window history, Q15
    pub history: Region,
    /// Overlap-add accumulator
    pub overlap: Region,
    /// Combined power spectrum snapshot for features
    pub spectrum: Region,
    /// Per-channel noise estimate `[ch * n_bins + bin]`
    pub noise_est: Region,
    /// Per-channel minimum tracker `[ch * n_bins + bin]`
    pub power_min: Region,
    pub total_words: usize,
}

/// Mutable views of every region, carved from one arena borrow.
pub struct Carved<'s> {
    pub frame: &'s mut [i16],
    pub re: &'s mut [i32],
    pub im: &'s mut [i32],
    pub gain: &'s mut [i16],
    pub history: &'s mut [i16],
    pub overlap: &'s mut [i32],
    pub spectrum: &'s mut [i32],
    pub noise_est: &'s mut [i32],
    pub power_min: &'s mut [i32],
}

impl ScratchLayout {
    /// Compute the layout. The configuration is assumed valid.
    pub fn plan(config: &Config) -> Self {
        let frame_len = config.frame_len;
        let n_bins = config.n_bins();
        let channels = config.num_channels;
        let ns_words = if config.noise_suppression() {
            channels * n_bins
        } else {
            0
        };

        let mut cursor = 0;
        let mut next = |words: usize| {
            let region = Region { offset: cursor, words };
            cursor += words;
            region
        };

        let frame = next(frame_len.div_ceil(2));
        let re = next(frame_len);
        let im = next(frame_len);
        let gain = next(n_bins.div_ceil(2));
        let history = next((channels * frame_len).div_ceil(2));
        let overlap = next(frame_len);
        let spectrum = next(n_bins);
        let noise_est = next(ns_words);
        let power_min = next(ns_words);

        Self {
            frame_len,
            n_bins,
            channels,
            frame,
            re,
            im,
            gain,
            history,
            overlap,
            spectrum,
            noise_est,
            power_min,
            total_words: power_min.end(),
        }
    }

    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.total_words * WORD_BYTES
    }

    /// Split the arena into its regions. `arena` must hold at least `total_words`.
    pub fn carve<'s>(&self, arena: &'s mut [i32]) -> Carved<'s> {
        let (frame, rest) = arena.split_at_mut(self.frame.words);
        let (re, rest) = rest.split_at_mut(self.re.words);
        let (im, rest) = rest.split_at_mut(self.im.words);
        let (gain, rest) = rest.split_at_mut(self.gain.words);
        let (history, rest) = rest.split_at_mut(self.history.words);
        let (overlap, rest) = rest.split_at_mut(self.overlap.words);
        let (spectrum, rest) = rest.split_at_mut(self.spectrum.words);
        let (noise_est, rest) = rest.split_at_mut(self.noise_est.words);
        let (power_min, _) = rest.split_at_mut(self.power_min.words);

        Carved {
            frame: &mut bytemuck::cast_slice_mut::<i32, i16>(frame)[..self.frame_len],
            re,
            im,
            gain: &mut bytemuck::cast_slice_mut::<i32, i16>(gain)[..self.n_bins],
            history: &mut bytemuck::cast_slice_mut::<i32, i16>(history)
                [..self.channels * self.frame_len],
            overlap,
            spectrum,
            noise_est,
            power_min,
        }
    }

    /// Read-only view of the suppression gains.
    pub fn gains<'s>(&self, arena: &'s [i32]) -> &'s [i16] {
        &bytemuck::cast_slice::<i32, i16>(self.gain.of(arena))[..self.n_bins]
    }
}

/// Persistent state footprint in bytes. Independent of frame length.
pub fn state_bytes(_config: &Config) -> usize {
    size_of::<FrontEnd<&'static mut [i32], &'static Tables>>()
}

/// Scratch arena requirement in bytes, or 0 for an invalid configuration.
pub fn scratch_bytes(config: &Config) -> usize {
    scratch_words(config) * WORD_BYTES
}

/// Scratch arena requirement in `i32` words, or 0 for an invalid configuration.
pub fn scratch_words(config: &Config) -> usize {
    if config.validate().is_err() {
        return 0;
    }
    ScratchLayout::plan(config).total_words
}
