use crate::{
    coefficients::Coefficients,
    error::{GcAdpcmError, Result},
    math::{high_nibble, high_nibble_signed, low_nibble, low_nibble_signed, predict, reconstruct},
    sample_count_to_byte_count, CodecParameters, BYTES_PER_FRAME, SAMPLES_PER_FRAME,
};

/// Decodes `config.sample_count` samples beginning at `config.start_sample`, which may
/// fall anywhere inside a frame.
pub fn decode_gc_adpcm(
    adpcm: &[u8],
    coefficients: &Coefficients,
    config: &CodecParameters,
) -> Result<Vec<i16>> {
    let mut pcm = vec![0; config.sample_count];

    decode_into(
        adpcm,
        coefficients,
        config.start_sample,
        (config.history_1, config.history_2),
        &mut pcm,
    )?;

    Ok(pcm)
}

/// Fills `pcm` with samples decoded from `start_sample` onward and returns the history
/// `(hist_1, hist_2)` left after the last one.
pub(crate) fn decode_into(
    adpcm: &[u8],
    coefficients: &Coefficients,
    start_sample: usize,
    history: (i16, i16),
    pcm: &mut [i16],
) -> Result<(i16, i16)> {
    let end_sample = start_sample + pcm.len();
    let required = sample_count_to_byte_count(end_sample);
    if adpcm.len() < required {
        return Err(GcAdpcmError::InvalidBufferLength {
            sample_count: end_sample,
            expected: required,
            actual: adpcm.len(),
        });
    }

    let (mut hist_1, mut hist_2) = history;
    let mut scale_power = 0;
    let mut coef_1 = 0;
    let mut coef_2 = 0;

    for (i, out) in pcm.iter_mut().enumerate() {
        let sample = start_sample + i;
        let frame = sample / SAMPLES_PER_FRAME;
        let sample_in_frame = sample % SAMPLES_PER_FRAME;
        let frame_offset = frame * BYTES_PER_FRAME;

        if i == 0 || sample_in_frame == 0 {
            let predictor_scale = adpcm[frame_offset];
            let predictor = high_nibble(predictor_scale);
            if predictor >= 8 {
                return Err(GcAdpcmError::InvalidPredictor { frame, predictor });
            }

            scale_power = low_nibble(predictor_scale) as i32;
            (coef_1, coef_2) = coefficients.pair(predictor as usize);
        }

        let byte = adpcm[frame_offset + 1 + sample_in_frame / 2];
        let residual = if sample_in_frame % 2 == 0 {
            high_nibble_signed(byte)
        } else {
            low_nibble_signed(byte)
        };

        let predicted = predict(coef_1, coef_2, hist_1 as i32, hist_2 as i32);
        let decoded = reconstruct(predicted, residual as i32, scale_power);

        hist_2 = hist_1;
        hist_1 = decoded;
        *out = decoded;
    }

    Ok((hist_1, hist_2))
}

/// The predictor/scale byte of the frame holding `sample`, or 0 past the end of the data.
pub fn get_predictor_scale(adpcm: &[u8], sample: usize) -> u8 {
    adpcm.get(sample / SAMPLES_PER_FRAME * BYTES_PER_FRAME).copied().unwrap_or(0)
}
