//! Moves a loop start onto a required sample multiple.
//!
//! Some containers interleave channels in fixed-size blocks and can only loop back to
//! the start of a block. To get there the loop start is pushed forward to the next
//! multiple, and the same number of samples, copied from the start of the loop, are
//! appended after the old loop end. Audio past the loop end is dropped.

use crate::{
    coefficients::Coefficients,
    decode::decode_into,
    encode::encode_gc_adpcm_with_history,
    error::{validate_loop, GcAdpcmError, Result},
    math::next_multiple,
    BYTES_PER_FRAME, SAMPLES_PER_FRAME,
};
use log::debug;

/// An ADPCM buffer whose loop starts on `alignment_multiple`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcAdpcmAlignment {
    pub alignment_multiple: usize,
    pub loop_start: usize,
    pub loop_end: usize,
    pub sample_count: usize,
    pub adpcm: Vec<u8>,
    /// The loop already sat on the multiple, so `adpcm` is the original audio.
    pub is_aligned_already: bool,
}

/// Aligns the loop `loop_start..loop_end` of a channel to `multiple`.
///
/// Decoding starts at `origin`, a `(sample, hist_1, hist_2)` at or before both
/// `loop_start` and the last whole frame before `loop_end`. Sample 0 with the channel's
/// starting history always works.
pub fn align_loop(
    adpcm: &[u8],
    coefficients: &Coefficients,
    sample_count: usize,
    origin: (usize, i16, i16),
    loop_start: usize,
    loop_end: usize,
    multiple: usize,
) -> Result<GcAdpcmAlignment> {
    validate_loop(loop_start, loop_end, sample_count)?;

    if multiple == 0 || loop_start % multiple == 0 {
        return Ok(GcAdpcmAlignment {
            alignment_multiple: multiple,
            loop_start,
            loop_end,
            sample_count,
            adpcm: adpcm.to_vec(),
            is_aligned_already: true,
        });
    }

    // An empty loop has nothing to repeat into the gap.
    let loop_length = loop_end - loop_start;
    if loop_length == 0 {
        return Err(GcAdpcmError::InvalidLoopPoints { loop_start, loop_end, sample_count });
    }

    let aligned_loop_start = next_multiple(loop_start, multiple);
    let shift = aligned_loop_start - loop_start;
    let aligned_sample_count = loop_end + shift;

    // Whole frames before the loop end are copied untouched.
    let frames_to_keep = loop_end / SAMPLES_PER_FRAME;
    let samples_to_keep = frames_to_keep * SAMPLES_PER_FRAME;
    let bytes_to_keep = frames_to_keep * BYTES_PER_FRAME;

    let (origin_sample, origin_hist_1, origin_hist_2) = origin;
    debug_assert!(origin_sample <= loop_start.min(samples_to_keep.saturating_sub(2)));

    let mut pcm = vec![0i16; loop_end - origin_sample];
    decode_into(adpcm, coefficients, origin_sample, (origin_hist_1, origin_hist_2), &mut pcm)?;
    let sample_at = |sample: usize| pcm[sample - origin_sample];

    // With no whole frame kept the origin is sample 0.
    let (history_1, history_2) = match samples_to_keep {
        0 => (origin_hist_1, origin_hist_2),
        _ => (sample_at(samples_to_keep - 1), sample_at(samples_to_keep - 2)),
    };

    let mut pcm_aligned = Vec::with_capacity(aligned_sample_count - samples_to_keep);
    pcm_aligned.extend((samples_to_keep..loop_end).map(sample_at));
    pcm_aligned.extend((0..shift).map(|i| sample_at(loop_start + i % loop_length)));

    let encoded = encode_gc_adpcm_with_history(&pcm_aligned, coefficients, history_1, history_2);

    let mut aligned = Vec::with_capacity(bytes_to_keep + encoded.len());
    aligned.extend_from_slice(&adpcm[..bytes_to_keep]);
    aligned.extend_from_slice(&encoded);

    debug!(
        "aligned loop start {} to {} (multiple {}), re-encoded {} samples",
        loop_start,
        aligned_loop_start,
        multiple,
        pcm_aligned.len()
    );

    Ok(GcAdpcmAlignment {
        alignment_multiple: multiple,
        loop_start: aligned_loop_start,
        loop_end: aligned_sample_count,
        sample_count: aligned_sample_count,
        adpcm: aligned,
        is_aligned_already: false,
    })
}
