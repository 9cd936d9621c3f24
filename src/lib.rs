//! A codec for Nintendo's GameCube DSP-ADPCM format.
//!
//! Each channel is a sequence of 8-byte frames. A frame starts with a predictor/scale
//! byte (predictor index in the high nibble, scale exponent in the low nibble) followed
//! by 14 signed 4-bit residuals. Decoding predicts every sample from the previous two
//! using one of eight coefficient pairs.
//!
//! ```
//! use gc_adpcm::{decode_gc_adpcm, encode_gc_adpcm, CodecParameters, Coefficients};
//!
//! let pcm: Vec<i16> = (0..100).map(|i| ((i as f64 * 0.2).sin() * 4000.0) as i16).collect();
//! let coefficients = Coefficients::from_pcm(&pcm);
//! let adpcm = encode_gc_adpcm(&pcm, &coefficients);
//! assert_eq!(adpcm.len(), 8 * 8);
//!
//! let decoded = decode_gc_adpcm(&adpcm, &coefficients, &CodecParameters::new(pcm.len())).unwrap();
//! assert_eq!(decoded.len(), pcm.len());
//! ```

pub mod alignment;
pub mod channel;
pub mod coefficients;
pub mod decode;
pub mod encode;
pub mod error;
pub mod format;
pub mod idsp;
pub mod loop_context;
pub mod math;
pub mod seek_table;

#[cfg(test)]
mod test_signal;

pub use alignment::GcAdpcmAlignment;
pub use channel::GcAdpcmChannel;
pub use coefficients::Coefficients;
pub use decode::{decode_gc_adpcm, get_predictor_scale};
pub use encode::{encode_gc_adpcm, encode_gc_adpcm_with_history};
pub use error::{GcAdpcmError, Result};
pub use format::GcAdpcmFormat;
pub use loop_context::GcAdpcmContext;
pub use seek_table::build_seek_table;

pub const SAMPLES_PER_FRAME: usize = 14;
pub const NIBBLES_PER_FRAME: usize = 16;
pub const BYTES_PER_FRAME: usize = 8;

/// Where a decode run starts and how long it is.
///
/// The history is the pair of samples immediately preceding `start_sample`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecParameters {
    pub sample_count: usize,
    pub start_sample: usize,
    pub history_1: i16,
    pub history_2: i16,
}

impl CodecParameters {
    pub fn new(sample_count: usize) -> Self {
        Self { sample_count, ..Default::default() }
    }

    pub fn with_history(mut self, history_1: i16, history_2: i16) -> Self {
        self.history_1 = history_1;
        self.history_2 = history_2;
        self
    }

    pub fn starting_at(mut self, start_sample: usize) -> Self {
        self.start_sample = start_sample;
        self
    }
}

/// Bytes of ADPCM data holding `sample_count` samples. The last frame is always
/// stored whole.
pub fn sample_count_to_byte_count(sample_count: usize) -> usize {
    sample_count.div_ceil(SAMPLES_PER_FRAME) * BYTES_PER_FRAME
}

/// Nibble address of a sample, counting the header nibbles of every frame.
pub fn sample_to_nibble(sample: usize) -> usize {
    let frames = sample / SAMPLES_PER_FRAME;
    let extra_samples = sample % SAMPLES_PER_FRAME;

    NIBBLES_PER_FRAME * frames + extra_samples + 2
}

pub fn sample_count_to_nibble_count(sample_count: usize) -> usize {
    let frames = sample_count / SAMPLES_PER_FRAME;
    let extra_samples = sample_count % SAMPLES_PER_FRAME;
    let extra_nibbles = if extra_samples == 0 { 0 } else { extra_samples + 2 };

    NIBBLES_PER_FRAME * frames + extra_nibbles
}
