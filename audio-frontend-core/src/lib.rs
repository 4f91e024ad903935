//! Fixed-point real-time audio front-end
//!
//! Streams interleaved multi-channel Q15 hops through DC removal, pre-emphasis,
//! a Hann-windowed STFT, minimum-statistics spectral subtraction, overlap-add
//! resynthesis and AGC, with optional log-mel features. All frame-sized state lives
//! in a caller-provided `i32` arena sized by [`scratch_bytes`]; nothing is allocated
//! per hop.
//!
//! ```
//! use audio_frontend_core::{scratch_words, Config, FrontEnd, Tables};
//!
//! let config = Config::default();
//! let mut arena = vec![0i32; scratch_words(&config)];
//! let tables = Tables::new(config.frame_len).unwrap();
//! let mut fe = FrontEnd::init(&config, arena.as_mut_slice(), &tables).unwrap();
//!
//! let input = vec![0i16; config.hop_len];
//! let mut output = vec![0i16; config.hop_len];
//! fe.process_hop(&input, &mut output, None).unwrap();
//! ```

use wasm_bindgen::prelude::*;

/// Q15/Q31 arithmetic
pub mod fixed_point;
/// Error type and status codes
pub mod error;
/// Configuration, flags and builder
pub mod config;
/// Scratch arena sizing and layout
pub mod memory;
/// DC removal and pre-emphasis
pub mod prefilter;
/// Windowing and fixed-point FFT
pub mod fft_processor;
/// Analysis history and overlap-add synthesis
pub mod overlap_add;
/// Minimum-statistics noise tracking
pub mod noise_profile;
/// Spectral subtraction gains
pub mod spectral_subtraction;
/// Automatic gain control
pub mod agc;
/// Log-mel and energy features
pub mod features;
/// Hop orchestrator
pub mod engine;
/// Lock-free hop queue for capture/processing decoupling
pub mod ring_buffer;

pub use config::{Config, ConfigBuilder, FeatureSource, Flags};
pub use engine::{FrontEnd, HopReport};
pub use error::FeError;
pub use features::{FeatureFrame, FEATURE_FRAME_WORDS, FE_MEL_BINS};
pub use fft_processor::{Tables, WindowType};
pub use memory::{scratch_bytes, scratch_words, state_bytes};

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Packed library version, `major << 16 | minor << 8 | patch`
#[wasm_bindgen]
pub fn version() -> u32 {
    (VERSION_MAJOR << 16) | (VERSION_MINOR << 8) | VERSION_PATCH
}

/// WebAssembly-facing front-end that owns its arena and tables.
#[wasm_bindgen]
pub struct FrontEndProcessor {
    engine: FrontEnd<Box<[i32]>, Tables>,
}

#[wasm_bindgen]
impl FrontEndProcessor {
    /// Default tuning (noise suppression and AGC) at the given geometry
    #[wasm_bindgen(constructor)]
    pub fn new(
        sample_rate: u32,
        frame_len: usize,
        hop_len: usize,
        num_channels: usize,
    ) -> Result<FrontEndProcessor, JsError> {
        let config = ConfigBuilder::new()
            .sample_rate(sample_rate)
            .frame(frame_len, hop_len)
            .channels(num_channels)
            .build()?;
        let arena = vec![0i32; scratch_words(&config)].into_boxed_slice();
        let tables = Tables::new(frame_len)?;
        let engine = FrontEnd::init(&config, arena, tables)?;
        Ok(FrontEndProcessor { engine })
    }

    /// Process one interleaved hop; false if the buffers do not match the geometry.
    #[wasm_bindgen]
    pub fn process(&mut self, input: &[i16], output: &mut [i16]) -> bool {
        self.engine.process_hop(input, output, None).is_ok()
    }

    #[wasm_bindgen]
    pub fn reset(&mut self) {
        // Only fails once freed, which this wrapper never does
        let _ = self.engine.reset();
    }

    #[wasm_bindgen(getter)]
    pub fn frame_len(&self) -> usize {
        self.engine.config().frame_len
    }

    #[wasm_bindgen(getter)]
    pub fn hop_len(&self) -> usize {
        self.engine.config().hop_len
    }

    #[wasm_bindgen(getter)]
    pub fn latency(&self) -> usize {
        self.engine.latency_samples()
    }

    #[wasm_bindgen(getter)]
    pub fn version(&self) -> u32 {
        version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_packing() {
        assert_eq!(version(), 0x00_01_00);
    }

    #[test]
    fn test_processor_round_trip() {
        let Ok(mut processor) = FrontEndProcessor::new(16_000, 256, 128, 1) else {
            panic!("default geometry must be accepted");
        };
        assert_eq!(processor.frame_len(), 256);
        assert_eq!(processor.hop_len(), 128);
        assert_eq!(processor.latency(), 128);

        let input = vec![0i16; 128];
        let mut output = vec![1i16; 128];
        assert!(processor.process(&input, &mut output));
        assert!(output.iter().all(|&s| s == 0));
        assert!(!processor.process(&input[..64], &mut output));
        processor.reset();
    }

    #[test]
    fn test_state_size_is_independent_of_frame() {
        let small = ConfigBuilder::new().frame(64, 32).build().unwrap();
        let large = ConfigBuilder::new().frame(4096, 1024).build().unwrap();
        assert_eq!(state_bytes(&small), state_bytes(&large));
        assert!(scratch_bytes(&large) > scratch_bytes(&small));
    }
}
