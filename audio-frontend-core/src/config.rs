//! Engine configuration: frame geometry, stage flags and per-stage tuning.
//!
//! The configuration is filled once by the caller, validated by [`Config::validate`],
//! and never mutated by the engine afterwards.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::error::FeError;
use crate::fixed_point::{q31_from_f64, Q15, Q31};

// ============================================================================
// Constants
// ============================================================================

/// Smallest supported transform size
pub const MIN_FRAME_LEN: usize = 16;

/// Largest supported transform size
pub const MAX_FRAME_LEN: usize = 4096;

/// Upper bound on interleaved input channels
pub const MAX_CHANNELS: usize = 8;

/// Q6.9 unity (gain 1.0)
pub const Q9_UNITY: i16 = 512;

pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_FRAME_LEN: usize = 256;
pub const DEFAULT_HOP_LEN: usize = 128;

/// DC-removal cutoff used for the default pole
pub const DEFAULT_DC_CUTOFF_HZ: f64 = 20.0;

/// 0.97 in Q15
pub const DEFAULT_PRE_EMPHASIS: Q15 = 31_785;

/// 1.0 in Q6.9
pub const DEFAULT_NS_OVER_SUBTRACT: i16 = Q9_UNITY;

/// Absolute Q31 bin power; bins at or below it are muted
pub const DEFAULT_NS_FLOOR: i16 = 26;

/// ~200 ms of 8 ms hops
pub const DEFAULT_NS_MIN_TRACK_LEN: u16 = 25;

/// 0.5 in Q15
pub const DEFAULT_AGC_TARGET: Q15 = 16_384;
pub const DEFAULT_AGC_ATTACK_MS: u16 = 10;
pub const DEFAULT_AGC_RELEASE_MS: u16 = 100;

// ============================================================================
// Flags
// ============================================================================

/// Set of optional pipeline stages.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    pub const NOISE_SUPPRESS: Flags = Flags(1 << 0);
    pub const AGC: Flags = Flags(1 << 1);
    /// Reserved, no processing attached
    pub const BEAMFORMER: Flags = Flags(1 << 2);
    /// Reserved, no processing attached
    pub const AEC_STUB: Flags = Flags(1 << 3);
    pub const FEATURES: Flags = Flags(1 << 4);

    const ALL_BITS: u8 = 0x1F;

    /// Build from raw bits, rejecting unknown ones.
    pub fn from_bits(bits: u8) -> Option<Flags> {
        if bits & !Self::ALL_BITS == 0 {
            Some(Flags(bits))
        } else {
            None
        }
    }

    /// Build from raw bits without checking (validated later by [`Config::validate`]).
    pub const fn from_bits_retain(bits: u8) -> Flags {
        Flags(bits)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Flags) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Flags, &str); 5] = [
            (Flags::NOISE_SUPPRESS, "NOISE_SUPPRESS"),
            (Flags::AGC, "AGC"),
            (Flags::BEAMFORMER, "BEAMFORMER"),
            (Flags::AEC_STUB, "AEC_STUB"),
            (Flags::FEATURES, "FEATURES"),
        ];
        let mut first = true;
        write!(f, "Flags(")?;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        let unknown = self.0 & !Self::ALL_BITS;
        if unknown != 0 {
            if !first {
                write!(f, " | ")?;
            }
            write!(f, "{unknown:#04x}")?;
        }
        write!(f, ")")
    }
}

/// Which spectrum the feature extractor reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureSource {
    /// Power spectrum straight out of the forward transform
    PreSuppression,
    /// Power spectrum after suppression gains were applied
    #[default]
    PostSuppression,
}

// ============================================================================
// Configuration
// ============================================================================

/// Front-end configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Transform size, power of two
    pub frame_len: usize,
    /// New samples per call
    pub hop_len: usize,
    /// Interleaved input channels
    pub num_channels: usize,
    pub flags: Flags,
    /// DC-removal pole, `exp(-2π·fc/fs)` in Q31
    pub dc_alpha: Q31,
    /// Pre-emphasis coefficient in Q15, 0 disables the filter
    pub pre_emphasis_alpha: Q15,
    /// Over-subtraction factor, Q6.9
    pub ns_over_subtract: i16,
    /// Spectral floor in the suppressor's power domain
    pub ns_floor: i16,
    /// Hops per minimum-tracking cycle
    pub ns_min_track_len: u16,
    /// AGC target RMS level, Q15
    pub agc_target_level: Q15,
    pub agc_attack_ms: u16,
    pub agc_release_ms: u16,
    pub feature_source: FeatureSource,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_len: DEFAULT_FRAME_LEN,
            hop_len: DEFAULT_HOP_LEN,
            num_channels: 1,
            flags: Flags::NOISE_SUPPRESS | Flags::AGC,
            dc_alpha: dc_alpha_for_cutoff(DEFAULT_DC_CUTOFF_HZ, DEFAULT_SAMPLE_RATE),
            pre_emphasis_alpha: DEFAULT_PRE_EMPHASIS,
            ns_over_subtract: DEFAULT_NS_OVER_SUBTRACT,
            ns_floor: DEFAULT_NS_FLOOR,
            ns_min_track_len: DEFAULT_NS_MIN_TRACK_LEN,
            agc_target_level: DEFAULT_AGC_TARGET,
            agc_attack_ms: DEFAULT_AGC_ATTACK_MS,
            agc_release_ms: DEFAULT_AGC_RELEASE_MS,
            feature_source: FeatureSource::default(),
        }
    }
}

impl Config {
    /// Start a builder from the default configuration
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Number of unique bins of a real-input transform
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.frame_len / 2 + 1
    }

    #[inline]
    pub fn noise_suppression(&self) -> bool {
        self.flags.contains(Flags::NOISE_SUPPRESS)
    }

    #[inline]
    pub fn agc(&self) -> bool {
        self.flags.contains(Flags::AGC)
    }

    #[inline]
    pub fn features(&self) -> bool {
        self.flags.contains(Flags::FEATURES)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), FeError> {
        if self.sample_rate == 0 {
            return Err(FeError::InvalidConfig(format!(
                "Invalid sample rate: {}",
                self.sample_rate
            )));
        }

        if !self.frame_len.is_power_of_two()
            || self.frame_len < MIN_FRAME_LEN
            || self.frame_len > MAX_FRAME_LEN
        {
            return Err(FeError::InvalidConfig(format!(
                "Frame length {} must be power of 2 between {} and {}",
                self.frame_len, MIN_FRAME_LEN, MAX_FRAME_LEN
            )));
        }

        // Periodic Hann is COLA for any power-of-two hop up to half the frame
        if !self.hop_len.is_power_of_two() || self.hop_len * 2 > self.frame_len {
            return Err(FeError::InvalidConfig(format!(
                "Hop length {} must be a power of 2 no larger than frame_len/2 ({})",
                self.hop_len,
                self.frame_len / 2
            )));
        }

        if self.num_channels == 0 || self.num_channels > MAX_CHANNELS {
            return Err(FeError::InvalidConfig(format!(
                "Channel count {} out of range [1, {}]",
                self.num_channels, MAX_CHANNELS
            )));
        }

        if Flags::from_bits(self.flags.bits()).is_none() {
            return Err(FeError::InvalidConfig(format!(
                "Unknown flag bits in {:?}",
                self.flags
            )));
        }

        if self.dc_alpha < 0 {
            return Err(FeError::InvalidConfig(format!(
                "DC-removal alpha {} must be in [0, 1)",
                self.dc_alpha
            )));
        }

        if self.pre_emphasis_alpha < 0 {
            return Err(FeError::InvalidConfig(format!(
                "Pre-emphasis alpha {} must be in [0, 1)",
                self.pre_emphasis_alpha
            )));
        }

        if self.noise_suppression() {
            if self.ns_over_subtract < 0 {
                return Err(FeError::InvalidConfig(format!(
                    "Over-subtraction {} must be non-negative",
                    self.ns_over_subtract
                )));
            }
            if self.ns_floor < 0 {
                return Err(FeError::InvalidConfig(format!(
                    "Spectral floor {} must be non-negative",
                    self.ns_floor
                )));
            }
            if self.ns_min_track_len == 0 {
                return Err(FeError::InvalidConfig(
                    "Minimum tracking length must be at least one hop".to_string(),
                ));
            }
        }

        if self.agc() && self.agc_target_level <= 0 {
            return Err(FeError::InvalidConfig(format!(
                "AGC target level {} must be positive",
                self.agc_target_level
            )));
        }

        Ok(())
    }
}

/// DC-removal pole `exp(-2π·fc/fs)` quantized to Q31 (setup-time only).
pub fn dc_alpha_for_cutoff(cutoff_hz: f64, sample_rate: u32) -> Q31 {
    if sample_rate == 0 {
        return 0;
    }
    let alpha = (-2.0 * std::f64::consts::PI * cutoff_hz / sample_rate as f64).exp();
    q31_from_f64(alpha.clamp(0.0, 1.0))
}

// ============================================================================
// Builder Pattern
// ============================================================================

/// Builder for [`Config`]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create new builder with default config
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set sample rate; also re-derives the default DC pole for the new rate
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config.sample_rate = rate;
        self.config.dc_alpha = dc_alpha_for_cutoff(DEFAULT_DC_CUTOFF_HZ, rate);
        self
    }

    /// Set frame and hop lengths
    pub fn frame(mut self, frame_len: usize, hop_len: usize) -> Self {
        self.config.frame_len = frame_len;
        self.config.hop_len = hop_len;
        self
    }

    pub fn channels(mut self, num_channels: usize) -> Self {
        self.config.num_channels = num_channels;
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.config.flags = flags;
        self
    }

    /// Set the DC-removal cutoff frequency
    pub fn dc_cutoff_hz(mut self, cutoff_hz: f64) -> Self {
        self.config.dc_alpha = dc_alpha_for_cutoff(cutoff_hz, self.config.sample_rate);
        self
    }

    pub fn pre_emphasis(mut self, alpha: Q15) -> Self {
        self.config.pre_emphasis_alpha = alpha;
        self
    }

    /// Set suppressor tuning (over-subtraction in Q6.9, floor, tracking length in hops)
    pub fn noise_suppression(mut self, over_subtract: i16, floor: i16, min_track_len: u16) -> Self {
        self.config.ns_over_subtract = over_subtract;
        self.config.ns_floor = floor;
        self.config.ns_min_track_len = min_track_len;
        self
    }

    /// Set AGC target and time constants
    pub fn agc(mut self, target: Q15, attack_ms: u16, release_ms: u16) -> Self {
        self.config.agc_target_level = target;
        self.config.agc_attack_ms = attack_ms;
        self.config.agc_release_ms = release_ms;
        self
    }

    pub fn feature_source(mut self, source: FeatureSource) -> Self {
        self.config.feature_source = source;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<Config, FeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.n_bins(), 129);
        assert!(config.noise_suppression());
        assert!(config.agc());
        assert!(!config.features());
    }

    #[test]
    fn test_frame_len_must_be_power_of_two() {
        for frame_len in [0, 15, 100, 255, 8192] {
            let config = Config { frame_len, ..Config::default() };
            assert!(
                matches!(config.validate(), Err(FeError::InvalidConfig(_))),
                "frame_len {frame_len} accepted"
            );
        }
    }

    #[test]
    fn test_hop_must_be_cola_compatible() {
        for hop_len in [0, 96, 192, 256] {
            let config = Config { hop_len, ..Config::default() };
            assert!(config.validate().is_err(), "hop_len {hop_len} accepted");
        }
        for hop_len in [32, 64, 128] {
            let config = Config { hop_len, ..Config::default() };
            assert!(config.validate().is_ok(), "hop_len {hop_len} rejected");
        }
    }

    #[test]
    fn test_channel_count_bounds() {
        let config = Config { num_channels: 0, ..Config::default() };
        assert!(config.validate().is_err());
        let config = Config { num_channels: MAX_CHANNELS + 1, ..Config::default() };
        assert!(config.validate().is_err());
        let config = Config { num_channels: MAX_CHANNELS, ..Config::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_flags_rejected() {
        assert!(Flags::from_bits(0x20).is_none());
        let config = Config {
            flags: Flags::from_bits_retain(0x40),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tuning_ranges() {
        let config = Config { ns_min_track_len: 0, ..Config::default() };
        assert!(config.validate().is_err());

        // Tracking length is irrelevant when suppression is off
        let config = Config {
            ns_min_track_len: 0,
            flags: Flags::AGC,
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        let config = Config { agc_target_level: 0, ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { dc_alpha: -1, ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_flags_ops() {
        let mut flags = Flags::NOISE_SUPPRESS | Flags::FEATURES;
        assert!(flags.contains(Flags::NOISE_SUPPRESS));
        assert!(!flags.contains(Flags::AGC));
        assert!(flags.intersects(Flags::AGC | Flags::FEATURES));
        flags.remove(Flags::FEATURES);
        assert_eq!(flags, Flags::NOISE_SUPPRESS);
        flags |= Flags::BEAMFORMER;
        assert_eq!(format!("{flags:?}"), "Flags(NOISE_SUPPRESS | BEAMFORMER)");
    }

    #[test]
    fn test_dc_alpha_for_cutoff() {
        let alpha = dc_alpha_for_cutoff(20.0, 16_000);
        // exp(-2π·20/16000) = 0.99218
        let real = alpha as f64 / 2_147_483_648.0;
        assert!((real - 0.99218).abs() < 1e-4);
        assert_eq!(dc_alpha_for_cutoff(0.0, 16_000), i32::MAX);
    }

    #[test]
    fn test_builder() {
        let config = Config::builder()
            .sample_rate(48_000)
            .frame(512, 256)
            .channels(2)
            .flags(Flags::NOISE_SUPPRESS | Flags::FEATURES)
            .pre_emphasis(0)
            .noise_suppression(1024, 10, 40)
            .agc(8192, 5, 200)
            .feature_source(FeatureSource::PreSuppression)
            .build()
            .unwrap();
        assert_eq!(config.frame_len, 512);
        assert_eq!(config.num_channels, 2);
        assert_eq!(config.ns_over_subtract, 1024);
        assert_eq!(config.feature_source, FeatureSource::PreSuppression);
        assert_eq!(config.dc_alpha, dc_alpha_for_cutoff(20.0, 48_000));

        let result = Config::builder().frame(256, 200).build();
        assert!(result.is_err());
    }
}
