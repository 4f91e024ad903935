//! Fixed-point FFT/IFFT with analysis windowing for real-time spectral processing
//!
//! The transform is an in-place radix-2 decimation-in-time FFT over Q31 data. Every
//! stage is preceded by a uniform one-bit right shift (block scaling), so the forward
//! transform yields `X[k] / N` and can never overflow. The inverse runs the conjugate
//! butterflies with the same block scaling and then shifts the result back up.
//!
//! Window and twiddle tables are read-only constants owned by the caller, built once
//! with [`Tables::new`] or supplied with [`Tables::from_parts`].

use std::f64::consts::TAU;

use crate::config::{MAX_FRAME_LEN, MIN_FRAME_LEN};
use crate::error::FeError;
use crate::fixed_point::{mul_q15, sat_q31, shl_sat_q31, Q15, Q31, Q15_MAX, Q31_MAX, Q31_SHIFT};

// ============================================================================
// Window Function Types
// ============================================================================

/// Analysis window shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowType {
    /// Periodic Hann, COLA for every power-of-two hop up to half the frame
    #[default]
    Hann,
    /// All ones, COLA for any hop dividing the frame
    Rectangular,
}

impl WindowType {
    /// Generate Q15 window coefficients
    pub fn generate(&self, size: usize) -> Vec<Q15> {
        let mut window = vec![0; size];
        self.generate_into(&mut window);
        window
    }

    /// Generate into an existing buffer (non-allocating)
    pub fn generate_into(&self, window: &mut [Q15]) {
        match self {
            WindowType::Hann => hann_window_into(window),
            WindowType::Rectangular => window.fill(Q15_MAX),
        }
    }
}

/// Periodic Hann in Q15 whose complementary halves sum to exactly `Q15_MAX`.
///
/// Quantising only the first half and deriving `w[n + N/2] = Q15_MAX - w[n]` keeps the
/// overlap sum exactly constant after rounding.
fn hann_window_into(window: &mut [Q15]) {
    let size = window.len();
    if size < 2 {
        window.fill(Q15_MAX);
        return;
    }
    let half = size / 2;
    for n in 0..half {
        let t = TAU * n as f64 / size as f64;
        let w = (Q15_MAX as f64 * 0.5 * (1.0 - t.cos())).round() as Q15;
        window[n] = w;
        window[n + half] = Q15_MAX - w;
    }
}

/// Constant overlap-add sum of `window` at stride `hop`, or `None` if it varies.
///
/// Sums every shifted copy of the window at each offset within one hop. A window is
/// COLA at this hop when all offsets give the same sum, up to one LSB per overlapping
/// frame of rounding slack.
pub fn cola_sum(window: &[Q15], hop: usize) -> Option<i32> {
    let size = window.len();
    if hop == 0 || hop > size || size % hop != 0 {
        return None;
    }

    let overlaps = (size / hop) as i32;
    let mut max_sum = i32::MIN;
    let mut min_sum = i32::MAX;

    for offset in 0..hop {
        let sum: i32 = window[offset..]
            .iter()
            .step_by(hop)
            .map(|&w| w as i32)
            .sum();
        max_sum = max_sum.max(sum);
        min_sum = min_sum.min(sum);
    }

    if max_sum - min_sum > overlaps || max_sum <= 0 {
        return None;
    }
    Some(min_sum)
}

// ============================================================================
// Tables
// ============================================================================

/// Constant tables for one frame length: analysis window and twiddle factors.
#[derive(Debug, Clone, PartialEq)]
pub struct Tables {
    window: Vec<Q15>,
    cos: Vec<Q31>,
    sin: Vec<Q31>,
}

impl Tables {
    /// Hann window plus twiddles for `frame_len`
    pub fn new(frame_len: usize) -> Result<Self, FeError> {
        Self::with_window(frame_len, WindowType::Hann)
    }

    pub fn with_window(frame_len: usize, window_type: WindowType) -> Result<Self, FeError> {
        check_frame_len(frame_len)?;

        let half = frame_len / 2;
        let mut cos = Vec::with_capacity(half);
        let mut sin = Vec::with_capacity(half);
        for i in 0..half {
            let t = TAU * i as f64 / frame_len as f64;
            // Scale by Q31_MAX rather than 2^31 so |w| never exceeds one
            cos.push((t.cos() * Q31_MAX as f64).round() as Q31);
            sin.push((t.sin() * Q31_MAX as f64).round() as Q31);
        }

        Ok(Self {
            window: window_type.generate(frame_len),
            cos,
            sin,
        })
    }

    /// Wrap caller-provided tables. `cos`/`sin` hold `cos(2πi/N)`, `sin(2πi/N)` for
    /// `i < N/2` in Q31.
    pub fn from_parts(window: Vec<Q15>, cos: Vec<Q31>, sin: Vec<Q31>) -> Result<Self, FeError> {
        check_frame_len(window.len())?;
        if cos.len() != window.len() / 2 || sin.len() != window.len() / 2 {
            return Err(FeError::InvalidConfig(format!(
                "Twiddle tables must hold {} entries, got cos={} sin={}",
                window.len() / 2,
                cos.len(),
                sin.len()
            )));
        }
        Ok(Self { window, cos, sin })
    }

    #[inline]
    pub fn frame_len(&self) -> usize {
        self.window.len()
    }

    #[inline]
    pub fn window(&self) -> &[Q15] {
        &self.window
    }

    #[inline]
    pub fn twiddles(&self) -> (&[Q31], &[Q31]) {
        (&self.cos, &self.sin)
    }
}

fn check_frame_len(frame_len: usize) -> Result<(), FeError> {
    if !frame_len.is_power_of_two() || !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&frame_len) {
        return Err(FeError::InvalidConfig(format!(
            "FFT size {} must be power of 2 between {} and {}",
            frame_len, MIN_FRAME_LEN, MAX_FRAME_LEN
        )));
    }
    Ok(())
}

// ============================================================================
// Windowing
// ============================================================================

/// `output[n] = input[n] · window[n]`, Q15 × Q15 → Q15 with saturation.
pub fn apply_window(input: &[Q15], window: &[Q15], output: &mut [Q15]) {
    debug_assert_eq!(input.len(), window.len());
    for ((o, &x), &w) in output.iter_mut().zip(input).zip(window) {
        *o = mul_q15(x, w);
    }
}

// ============================================================================
// Transform
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Inverse,
}

/// In-place forward FFT. Returns the number of block-scaling shifts applied
/// (`log2 N`); the output is `X[k] / 2^shifts`.
pub fn forward(re: &mut [Q31], im: &mut [Q31], tables: &Tables) -> u32 {
    transform(re, im, tables, Direction::Forward)
}

/// In-place inverse FFT.
///
/// `forward_shifts` is the value returned by [`forward`]; the block-scaled inverse
/// leaves the signal divided by that much, so the result is shifted back up.
pub fn inverse(re: &mut [Q31], im: &mut [Q31], tables: &Tables, forward_shifts: u32) {
    transform(re, im, tables, Direction::Inverse);
    for v in re.iter_mut().chain(im.iter_mut()) {
        *v = shl_sat_q31(*v, forward_shifts);
    }
}

fn transform(re: &mut [Q31], im: &mut [Q31], tables: &Tables, direction: Direction) -> u32 {
    let n = re.len();
    debug_assert_eq!(n, im.len());
    debug_assert_eq!(n, tables.frame_len());

    bit_reverse(re, im);

    let (cos, sin) = tables.twiddles();
    let mut shifts = 0;
    let mut size = 2;
    while size <= n {
        // Block scaling: one bit of headroom per stage
        for v in re.iter_mut().chain(im.iter_mut()) {
            *v >>= 1;
        }
        shifts += 1;

        let half = size / 2;
        let stride = n / size;
        for start in (0..n).step_by(size) {
            for j in 0..half {
                let wr = cos[j * stride] as i64;
                let wi = sin[j * stride] as i64;
                let top = start + j;
                let bottom = top + half;
                let br = re[bottom] as i64;
                let bi = im[bottom] as i64;

                let (tr, ti) = match direction {
                    Direction::Forward => (
                        (wr * br + wi * bi) >> Q31_SHIFT,
                        (wr * bi - wi * br) >> Q31_SHIFT,
                    ),
                    Direction::Inverse => (
                        (wr * br - wi * bi) >> Q31_SHIFT,
                        (wr * bi + wi * br) >> Q31_SHIFT,
                    ),
                };

                let ar = re[top] as i64;
                let ai = im[top] as i64;
                re[top] = sat_q31(ar + tr);
                im[top] = sat_q31(ai + ti);
                re[bottom] = sat_q31(ar - tr);
                im[bottom] = sat_q31(ai - ti);
            }
        }
        size <<= 1;
    }
    shifts
}

fn bit_reverse(re: &mut [Q31], im: &mut [Q31]) {
    let n = re.len();
    if n < 2 {
        return;
    }
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - bits);
        if j > i {
            re.swap(i, j);
            im.swap(i, j);
        }
    }
}

// ============================================================================
// Spectrum Utilities
// ============================================================================

/// Rebuild bins `N/2+1..N` as conjugates of bins `1..N/2`, and zero the imaginary
/// parts of DC and Nyquist, so the inverse transform yields a real signal.
pub fn mirror_hermitian(re: &mut [Q31], im: &mut [Q31]) {
    let n = re.len();
    let half = n / 2;
    im[0] = 0;
    im[half] = 0;
    for k in 1..half {
        re[n - k] = re[k];
        im[n - k] = im[k].saturating_neg();
    }
}

/// Power of one bin, `(re² + im²) >> 31`, in Q31.
#[inline]
pub fn bin_power(re: Q31, im: Q31) -> Q31 {
    let re = re as i64;
    let im = im as i64;
    // Each square is at most 2^62, so the sum fits unsigned
    let power = (re * re) as u64 + (im * im) as u64;
    (power >> Q31_SHIFT).min(Q31_MAX as u64) as Q31
}

// ============================================================================
// Tests
// ============================================================================
