use crate::{
    coefficients::Coefficients,
    decode::{decode_into, get_predictor_scale},
    error::Result,
};

/// Decoder state at a point in the stream: the predictor/scale byte of the frame being
/// decoded and the two samples before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcAdpcmContext {
    pub predictor_scale: u8,
    pub history_1: i16,
    pub history_2: i16,
}

/// Computes the context right before `loop_start` by decoding forward from `origin`,
/// a `(sample, hist_1, hist_2)` whose history is already known. Pass `(0, hist_1,
/// hist_2)` of the stream start when no closer point is at hand.
pub fn compute_loop_context(
    adpcm: &[u8],
    coefficients: &Coefficients,
    loop_start: usize,
    origin: (usize, i16, i16),
) -> Result<GcAdpcmContext> {
    let (origin_sample, hist_1, hist_2) = origin;
    debug_assert!(origin_sample <= loop_start);

    let mut pcm = vec![0i16; loop_start - origin_sample];
    let (history_1, history_2) =
        decode_into(adpcm, coefficients, origin_sample, (hist_1, hist_2), &mut pcm)?;

    Ok(GcAdpcmContext {
        predictor_scale: get_predictor_scale(adpcm, loop_start),
        history_1,
        history_2,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        decode::decode_gc_adpcm, encode::encode_gc_adpcm, seek_table::build_seek_table,
        test_signal, CodecParameters,
    };

    #[test]
    fn test_context_matches_direct_decode() {
        let pcm = test_signal::music_like(3000);
        let coefficients = Coefficients::from_pcm(&pcm);
        let adpcm = encode_gc_adpcm(&pcm, &coefficients);

        for loop_start in [1, 2, 15, 1000, 1001, 2999] {
            let context =
                compute_loop_context(&adpcm, &coefficients, loop_start, (0, 0, 0)).unwrap();
            let decoded =
                decode_gc_adpcm(&adpcm, &coefficients, &CodecParameters::new(loop_start)).unwrap();

            assert_eq!(context.history_1, decoded[loop_start - 1]);
            let history_2 = if loop_start >= 2 { decoded[loop_start - 2] } else { 0 };
            assert_eq!(context.history_2, history_2);
            assert_eq!(context.predictor_scale, adpcm[loop_start / 14 * 8]);
        }
    }

    #[test]
    fn test_context_from_seek_entry() {
        let pcm = test_signal::music_like(3000);
        let coefficients = Coefficients::from_pcm(&pcm);
        let adpcm = encode_gc_adpcm(&pcm, &coefficients);
        let table = build_seek_table(&adpcm, &coefficients, pcm.len(), 256, 0, 0).unwrap();

        let loop_start = 1001;
        let (hist_1, hist_2) = table[3];
        let from_entry =
            compute_loop_context(&adpcm, &coefficients, loop_start, (768, hist_1, hist_2)).unwrap();
        let from_start =
            compute_loop_context(&adpcm, &coefficients, loop_start, (0, 0, 0)).unwrap();

        assert_eq!(from_entry, from_start);
    }

    #[test]
    fn test_context_at_stream_start() {
        let pcm = test_signal::music_like(100);
        let coefficients = Coefficients::from_pcm(&pcm);
        let adpcm = encode_gc_adpcm(&pcm, &coefficients);

        let context = compute_loop_context(&adpcm, &coefficients, 0, (0, 12, 34)).unwrap();
        let expected = GcAdpcmContext { predictor_scale: adpcm[0], history_1: 12, history_2: 34 };
        assert_eq!(context, expected);
    }
}
