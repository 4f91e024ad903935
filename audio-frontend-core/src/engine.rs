//! Hop orchestrator: the streaming analysis/synthesis engine
//!
//! One [`FrontEnd`] owns the fixed-size per-channel state and borrows (or owns) the
//! caller's scratch arena and constant tables. Each call to [`FrontEnd::process_hop`]
//! consumes one interleaved hop and produces one mono hop, `frame_len - hop_len`
//! samples late:
//!
//! ```text
//! per channel:  DC -> pre-emphasis -> hop window -> Hann -> FFT -> suppressor
//!               -> IFFT -> overlap-add (averaged across channels)
//! once:         finalize -> AGC -> features
//! ```
//!
//! All inputs are validated before any state is touched, and nothing after validation
//! can fail, so an error leaves the engine exactly as it was.

use std::borrow::Borrow;

use crate::agc::Agc;
use crate::config::{Config, FeatureSource, Flags, MAX_CHANNELS};
use crate::error::FeError;
use crate::features::{FeatureFrame, MelFilterbank};
use crate::fft_processor::{apply_window, bin_power, cola_sum, forward, inverse, mirror_hermitian, Tables};
use crate::fixed_point::{q15_to_q31, q31_to_q15, Q15, Q31};
use crate::memory::{scratch_bytes, ScratchLayout, WORD_BYTES};
use crate::noise_profile::{HopActivity, MinStatistics};
use crate::overlap_add::{HopWindow, OverlapAdd};
use crate::prefilter::ChannelPrefilter;
use crate::spectral_subtraction::SpectralSubtractor;

/// Outcome of one successful hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HopReport {
    /// Any channel's suppressor flagged the hop as speech-like
    pub speech_detected: bool,
    /// Features were written to the caller's slice
    pub features_written: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Ready,
    Freed,
}

/// The front-end engine.
///
/// `S` is the scratch arena (`&mut [i32]`, `Vec<i32>`, `Box<[i32]>`, ...) and `T` the
/// constant tables (`Tables` or `&Tables`). The struct size does not depend on the
/// frame length; every frame-sized buffer lives in `S`.
pub struct FrontEnd<S, T> {
    scratch: S,
    tables: T,
    config: Config,
    layout: ScratchLayout,
    window: HopWindow,
    ola: OverlapAdd,
    prefilters: [ChannelPrefilter; MAX_CHANNELS],
    trackers: [MinStatistics; MAX_CHANNELS],
    subtractor: SpectralSubtractor,
    agc: Agc,
    mel: MelFilterbank,
    lifecycle: Lifecycle,
    has_frame: bool,
}

impl<S, T> FrontEnd<S, T>
where
    S: AsMut<[i32]> + AsRef<[i32]>,
    T: Borrow<Tables>,
{
    /// Validate `config` against the arena and tables, then build a ready engine.
    pub fn init(config: &Config, mut scratch: S, tables: T) -> Result<Self, FeError> {
        if let Err(e) = config.validate() {
            log::warn!("Rejected front-end configuration: {e}");
            return Err(e);
        }

        let table_set: &Tables = tables.borrow();
        if table_set.frame_len() != config.frame_len {
            return Err(FeError::InvalidConfig(format!(
                "Tables built for frame length {}, configuration uses {}",
                table_set.frame_len(),
                config.frame_len
            )));
        }
        let overlap_sum = cola_sum(table_set.window(), config.hop_len).ok_or_else(|| {
            FeError::InvalidConfig(format!(
                "Window does not overlap-add to a constant at hop {}",
                config.hop_len
            ))
        })?;

        let required = scratch_bytes(config);
        let provided = scratch.as_mut().len() * WORD_BYTES;
        if provided < required {
            log::warn!("Scratch arena too small: {provided} of {required} bytes");
            return Err(FeError::ScratchTooSmall { required, provided });
        }

        let layout = ScratchLayout::plan(config);
        let channels = config.num_channels;
        let prefilter = ChannelPrefilter::new(config.dc_alpha, config.pre_emphasis_alpha);

        if config.flags.intersects(Flags::BEAMFORMER | Flags::AEC_STUB) {
            log::warn!(
                "Flags {:?} are reserved and have no effect; channels are averaged",
                config.flags
            );
        }

        let mut engine = Self {
            scratch,
            tables,
            config: config.clone(),
            layout,
            window: HopWindow::new(config.frame_len, config.hop_len),
            ola: OverlapAdd::new(config.frame_len, config.hop_len, overlap_sum, channels),
            prefilters: [prefilter; MAX_CHANNELS],
            trackers: [MinStatistics::new(); MAX_CHANNELS],
            subtractor: SpectralSubtractor::from_config(config),
            agc: Agc::from_config(config),
            mel: MelFilterbank::new(config.sample_rate, config.frame_len),
            lifecycle: Lifecycle::Ready,
            has_frame: false,
        };
        engine.clear_state();

        log::info!(
            "Front-end ready: {} Hz, frame {}, hop {}, {} channel(s), flags {:?}, scratch {} bytes, latency {} samples",
            config.sample_rate,
            config.frame_len,
            config.hop_len,
            channels,
            config.flags,
            layout.total_bytes(),
            engine.ola.latency_samples()
        );
        Ok(engine)
    }

    /// Process one hop.
    ///
    /// `input` holds `num_channels * hop_len` interleaved samples, `output` receives
    /// `hop_len` mono samples. When FEATURES is enabled and `features` is long enough,
    /// one [`FeatureFrame`] is written to it.
    pub fn process_hop(
        &mut self,
        input: &[Q15],
        output: &mut [Q15],
        features: Option<&mut [i16]>,
    ) -> Result<HopReport, FeError> {
        if self.lifecycle != Lifecycle::Ready {
            return Err(FeError::NotInitialised);
        }
        if input.is_empty() {
            return Err(FeError::NullArgument("input"));
        }
        if output.is_empty() {
            return Err(FeError::NullArgument("output"));
        }
        let channels = self.config.num_channels;
        let hop_len = self.config.hop_len;
        if input.len() != channels * hop_len {
            return Err(FeError::InvalidConfig(format!(
                "Input hop holds {} samples, expected {}",
                input.len(),
                channels * hop_len
            )));
        }
        if output.len() != hop_len {
            return Err(FeError::InvalidConfig(format!(
                "Output hop holds {} samples, expected {}",
                output.len(),
                hop_len
            )));
        }

        let frame_len = self.config.frame_len;
        let n_bins = self.layout.n_bins;
        let suppress = self.config.noise_suppression();
        let source = self.config.feature_source;

        let tables: &Tables = self.tables.borrow();
        let carved = self.layout.carve(self.scratch.as_mut());
        carved.spectrum.fill(0);

        let mut speech_detected = false;
        for ch in 0..channels {
            let history = &mut carved.history[ch * frame_len..(ch + 1) * frame_len];
            let prefilter = &mut self.prefilters[ch];
            for (n, slot) in self.window.advance(history).iter_mut().enumerate() {
                *slot = prefilter.process(input[n * channels + ch]);
            }

            apply_window(history, tables.window(), carved.frame);
            for (r, &x) in carved.re.iter_mut().zip(carved.frame.iter()) {
                *r = q15_to_q31(x);
            }
            carved.im.fill(0);
            let shifts = forward(carved.re, carved.im, tables);

            if source == FeatureSource::PreSuppression {
                snapshot_power(carved.spectrum, carved.re, carved.im, channels);
            }

            if suppress {
                let bins = ch * n_bins..(ch + 1) * n_bins;
                let activity = self.subtractor.process(
                    &mut self.trackers[ch],
                    &mut carved.re[..n_bins],
                    &mut carved.im[..n_bins],
                    &mut carved.noise_est[bins.clone()],
                    &mut carved.power_min[bins],
                    carved.gain,
                );
                speech_detected |= activity.speech;
            }

            if source == FeatureSource::PostSuppression {
                snapshot_power(carved.spectrum, carved.re, carved.im, channels);
            }

            mirror_hermitian(carved.re, carved.im);
            inverse(carved.re, carved.im, tables, shifts);
            for (f, &r) in carved.frame.iter_mut().zip(carved.re.iter()) {
                *f = q31_to_q15(r);
            }
            self.ola.accumulate(carved.overlap, carved.frame);
        }

        self.ola.finalize(carved.overlap, output);
        if self.config.agc() {
            self.agc.process(output);
        }
        self.has_frame = true;

        let mut features_written = false;
        if self.config.features() {
            if let Some(out) = features {
                features_written = self.mel.compute(carved.spectrum).write_into(out);
            }
        }

        Ok(HopReport {
            speech_detected,
            features_written,
        })
    }

    /// Restore every filter, window, noise and AGC state to its post-init value.
    pub fn reset(&mut self) -> Result<(), FeError> {
        if self.lifecycle != Lifecycle::Ready {
            return Err(FeError::NotInitialised);
        }
        self.clear_state();
        log::debug!("Front-end reset");
        Ok(())
    }

    /// Mark the engine freed. Later calls report [`FeError::NotInitialised`].
    pub fn free(&mut self) -> Result<(), FeError> {
        if self.lifecycle != Lifecycle::Ready {
            return Err(FeError::NotInitialised);
        }
        self.lifecycle = Lifecycle::Freed;
        log::debug!("Front-end freed");
        Ok(())
    }

    /// Features of the most recent hop's spectrum.
    pub fn extract_features(&self) -> Result<FeatureFrame, FeError> {
        if self.lifecycle != Lifecycle::Ready {
            return Err(FeError::NotInitialised);
        }
        if !self.has_frame {
            return Err(FeError::NoFrame);
        }
        Ok(self.mel.compute(self.layout.spectrum.of(self.scratch.as_ref())))
    }

    fn clear_state(&mut self) {
        let carved = self.layout.carve(self.scratch.as_mut());
        carved.history.fill(0);
        carved.overlap.fill(0);
        carved.spectrum.fill(0);
        carved.gain.fill(0);
        for ch in 0..self.config.num_channels {
            self.prefilters[ch].reset();
        }
        let n_bins = self.layout.n_bins;
        for (ch, (noise_est, power_min)) in carved
            .noise_est
            .chunks_exact_mut(n_bins)
            .zip(carved.power_min.chunks_exact_mut(n_bins))
            .enumerate()
        {
            self.trackers[ch].reset(noise_est, power_min);
        }
        self.agc.reset();
        self.has_frame = false;
    }

    /// Suppression gains (Q6.9) of the last channel processed on the latest hop, if
    /// suppression is enabled.
    pub fn suppression_gains(&self) -> Option<&[i16]> {
        if !self.config.noise_suppression() {
            return None;
        }
        Some(self.layout.gains(self.scratch.as_ref()))
    }

    /// Noise estimate of one channel, if suppression is enabled.
    pub fn noise_estimate(&self, channel: usize) -> Option<&[Q31]> {
        if !self.config.noise_suppression() || channel >= self.config.num_channels {
            return None;
        }
        let n_bins = self.layout.n_bins;
        let all = self.layout.noise_est.of(self.scratch.as_ref());
        Some(&all[channel * n_bins..(channel + 1) * n_bins])
    }

    /// Tracker observations of one channel's latest hop.
    pub fn channel_activity(&self, channel: usize) -> Option<HopActivity> {
        if channel >= self.config.num_channels {
            return None;
        }
        Some(self.trackers[channel].last_activity())
    }

    #[inline]
    pub fn agc_gain_q12(&self) -> i32 {
        self.agc.gain_q12()
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Input-to-output delay in samples
    #[inline]
    pub fn latency_samples(&self) -> usize {
        self.ola.latency_samples()
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    /// Give back the arena and the tables.
    pub fn into_parts(self) -> (S, T) {
        (self.scratch, self.tables)
    }
}

/// Add this channel's share of the power spectrum to the combined snapshot.
fn snapshot_power(spectrum: &mut [Q31], re: &[Q31], im: &[Q31], channels: usize) {
    let share = channels as Q31;
    for (k, p) in spectrum.iter_mut().enumerate() {
        *p = p.saturating_add(bin_power(re[k], im[k]) / share);
    }
}
