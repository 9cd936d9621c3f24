//! Predictor coefficient generation.
//!
//! Every 14-sample frame of the training audio contributes a second-order linear
//! predictor, found by solving the frame's autocorrelation normal equations. The
//! per-frame predictors are then clustered into eight groups, and each group's mean
//! becomes one coefficient pair.

use crate::{
    error::{GcAdpcmError, Result},
    SAMPLES_PER_FRAME,
};
use log::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coefficients {
    pub coefs: [i16; 16],
}

impl std::ops::Deref for Coefficients {
    type Target = [i16; 16];

    fn deref(&self) -> &Self::Target {
        &self.coefs
    }
}

impl AsRef<[i16]> for Coefficients {
    fn as_ref(&self) -> &[i16] {
        &self.coefs
    }
}

impl TryFrom<&[i16]> for Coefficients {
    type Error = GcAdpcmError;

    fn try_from(source: &[i16]) -> Result<Self> {
        let coefs: [i16; 16] =
            source.try_into().map_err(|_| GcAdpcmError::InvalidCoefficientCount(source.len()))?;

        Ok(Self { coefs })
    }
}

impl From<[i16; 16]> for Coefficients {
    fn from(coefs: [i16; 16]) -> Self {
        Self { coefs }
    }
}

impl Coefficients {
    /// The coefficient pair used by predictor `index` (0..8).
    pub fn pair(&self, index: usize) -> (i16, i16) {
        (self.coefs[index * 2], self.coefs[index * 2 + 1])
    }

    /// Derives eight coefficient pairs from training audio. Silent or degenerate input
    /// produces zeroed pairs rather than failing.
    pub fn from_pcm(source: &[i16]) -> Self {
        let mut pcm_hist = [0i16; SAMPLES_PER_FRAME * 2];
        let mut coefs = [0i16; 16];
        let mut vec1 = [0f64; 3];
        let mut vec2 = [0f64; 3];
        let mut buffer = [0f64; 3];
        let mut mtx = [[0f64; 3]; 3];
        let mut vec_idxs = [0usize; 3];
        let mut records: Vec<[f64; 3]> = Vec::with_capacity(source.len() / SAMPLES_PER_FRAME + 1);
        let mut vec_best = [[0f64; 3]; 8];

        for frame in source.chunks(SAMPLES_PER_FRAME) {
            let (previous, current) = pcm_hist.split_at_mut(SAMPLES_PER_FRAME);
            previous.copy_from_slice(current);
            current[..frame.len()].copy_from_slice(frame);
            current[frame.len()..].fill(0);

            inner_product_merge(&mut vec1, &pcm_hist);
            if vec1[0].abs() > 10.0 {
                outer_product_merge(&mut mtx, &pcm_hist);
                if !analyze_ranges(&mut mtx, &mut vec_idxs, &mut buffer) {
                    bidirectional_filter(&mtx, &vec_idxs, &mut vec1);
                    if !quadratic_merge(&mut vec1) {
                        let mut record = [0f64; 3];
                        finish_record(&mut vec1, &mut record);
                        records.push(record);
                    }
                }
            }
        }

        debug!("generating coefficients from {} predictor records", records.len());

        vec1 = [1.0, 0.0, 0.0];

        for record in &records {
            matrix_filter(record, &mut vec_best[0]);
            for y in 1..=2 {
                vec1[y] += vec_best[0][y];
            }
        }

        // No usable frames leaves the average at zero instead of dividing by zero.
        if !records.is_empty() {
            for y in 1..=2 {
                vec1[y] /= records.len() as f64;
            }
        }

        merge_finish_record(&vec1, &mut vec_best[0]);

        let mut exp = 1;
        for w in 1..=3 {
            vec2[0] = 0.0;
            vec2[1] = -1.0;
            vec2[2] = 0.0;
            for i in 0..exp {
                for y in 0..=2 {
                    vec_best[exp + i][y] = (0.01 * vec2[y]) + vec_best[i][y];
                }
            }
            exp = 1 << w;
            filter_records(&mut vec_best, exp, &records);
        }

        for z in 0..8 {
            coefs[z * 2] = quantize(-vec_best[z][1]);
            coefs[z * 2 + 1] = quantize(-vec_best[z][2]);
        }

        Self { coefs }
    }
}

/// Converts to the 11-bit fixed-point scale, saturating at the 16-bit range.
fn quantize(value: f64) -> i16 {
    let d = value * 2048.0;
    if d.is_nan() {
        0
    } else if d > i16::MAX as f64 {
        i16::MAX
    } else if d < i16::MIN as f64 {
        i16::MIN
    } else {
        d.round() as i16
    }
}

fn inner_product_merge(out: &mut [f64; 3], pcm: &[i16]) {
    for i in 0..=2 {
        out[i] = 0.0;
        for x in 0..SAMPLES_PER_FRAME {
            out[i] -= pcm[SAMPLES_PER_FRAME + x - i] as f64 * pcm[SAMPLES_PER_FRAME + x] as f64;
        }
    }
}

fn outer_product_merge(mtx: &mut [[f64; 3]; 3], pcm: &[i16]) {
    for x in 1..=2 {
        for y in 1..=2 {
            mtx[x][y] = 0.0;
            for z in 0..SAMPLES_PER_FRAME {
                mtx[x][y] +=
                    pcm[SAMPLES_PER_FRAME + z - x] as f64 * pcm[SAMPLES_PER_FRAME + z - y] as f64;
            }
        }
    }
}

/// LU-decomposes the 2x2 system with partial pivoting. Returns `true` when the matrix
/// is singular or too badly conditioned to solve.
fn analyze_ranges(
    mtx: &mut [[f64; 3]; 3],
    vec_idxs: &mut [usize; 3],
    recips: &mut [f64; 3],
) -> bool {
    let mut val;
    let mut tmp;

    // Get greatest distance from zero
    for x in 1..=2 {
        val = mtx[x][1].abs().max(mtx[x][2].abs());
        if val < f64::EPSILON {
            return true;
        }

        recips[x] = 1.0 / val;
    }

    let mut max_index = 0;
    for i in 1..=2 {
        for x in 1..i {
            tmp = mtx[x][i];
            for y in 1..x {
                tmp -= mtx[x][y] * mtx[y][i];
            }
            mtx[x][i] = tmp;
        }

        val = 0.0;
        for x in i..=2 {
            tmp = mtx[x][i];
            for y in 1..i {
                tmp -= mtx[x][y] * mtx[y][i];
            }

            mtx[x][i] = tmp;
            tmp = tmp.abs() * recips[x];
            if tmp >= val {
                val = tmp;
                max_index = x;
            }
        }

        if max_index != i {
            for y in 1..=2 {
                tmp = mtx[max_index][y];
                mtx[max_index][y] = mtx[i][y];
                mtx[i][y] = tmp;
            }
            recips[max_index] = recips[i];
        }
        vec_idxs[i] = max_index;

        if i != 2 {
            tmp = 1.0 / mtx[i][i];
            for x in (i + 1)..=2 {
                mtx[x][i] *= tmp;
            }
        }
    }

    let mut min = 1.0e10;
    let mut max = 0.0;

    for i in 1..=2 {
        tmp = mtx[i][i].abs();
        if tmp < min {
            min = tmp;
        }
        if tmp > max {
            max = tmp;
        }
    }

    min / max < 1.0e-10
}

/// Forward and back substitution against the decomposed matrix.
fn bidirectional_filter(mtx: &[[f64; 3]; 3], vec_idxs: &[usize; 3], vec_out: &mut [f64; 3]) {
    let mut tmp;
    let mut x = 0;
    for i in 1..=2 {
        let index = vec_idxs[i];
        tmp = vec_out[index];
        vec_out[index] = vec_out[i];
        if x != 0 {
            for y in x..i {
                tmp -= vec_out[y] * mtx[i][y];
            }
        } else if tmp != 0.0 {
            x = i;
        }
        vec_out[i] = tmp;
    }

    for i in (1..=2).rev() {
        tmp = vec_out[i];
        for y in (i + 1)..=2 {
            tmp -= vec_out[y] * mtx[i][y];
        }
        vec_out[i] = tmp / mtx[i][i];
    }

    vec_out[0] = 1.0;
}

/// Converts the predictor to reflection form. Returns `true` if it's unstable.
fn quadratic_merge(in_out: &mut [f64; 3]) -> bool {
    let v2 = in_out[2];
    let tmp = 1.0 - (v2 * v2);

    if tmp == 0.0 {
        return true;
    }

    let v0 = (in_out[0] - (v2 * v2)) / tmp;
    let v1 = (in_out[1] - (in_out[1] * v2)) / tmp;

    in_out[0] = v0;
    in_out[1] = v1;

    v1.abs() > 1.0
}

fn finish_record(in_r: &mut [f64; 3], out_r: &mut [f64; 3]) {
    for z in 1..=2 {
        if in_r[z] >= 1.0 {
            in_r[z] = 0.9999999999;
        } else if in_r[z] <= -1.0 {
            in_r[z] = -0.9999999999;
        }
    }

    out_r[0] = 1.0;
    out_r[1] = (in_r[2] * in_r[1]) + in_r[1];
    out_r[2] = in_r[2];
}

/// Step-down recursion from predictor coefficients to autocorrelation terms.
fn matrix_filter(src: &[f64; 3], dst: &mut [f64; 3]) {
    let mut mtx = [[0f64; 3]; 3];

    mtx[2][0] = 1.0;
    for i in 1..=2 {
        mtx[2][i] = -src[i];
    }

    for i in (1..=2).rev() {
        let val = 1.0 - (mtx[i][i] * mtx[i][i]);
        for y in 1..=i {
            mtx[i - 1][y] = ((mtx[i][i] * mtx[i][y]) + mtx[i][y]) / val;
        }
    }

    dst[0] = 1.0;
    for i in 1..=2 {
        dst[i] = 0.0;
        for y in 1..=i {
            dst[i] += mtx[i][y] * dst[i - y];
        }
    }
}

/// Levinson-Durbin recursion from autocorrelation terms back to a predictor.
fn merge_finish_record(src: &[f64; 3], dst: &mut [f64; 3]) {
    let mut tmp = [0f64; 3];
    let mut val = src[0];

    dst[0] = 1.0;
    for i in 1..=2 {
        let mut v2 = 0.0;
        for y in 1..i {
            v2 += dst[y] * src[i - y];
        }

        if val > 0.0 {
            dst[i] = -(v2 + src[i]) / val;
        } else {
            dst[i] = 0.0;
        }

        tmp[i] = dst[i];

        for y in 1..i {
            dst[y] += dst[i] * dst[i - y];
        }

        val *= 1.0 - (dst[i] * dst[i]);
    }

    finish_record(&mut tmp, dst);
}

/// Prediction error of applying predictor `source1` to a frame described by `source2`.
fn contrast_vectors(source1: &[f64; 3], source2: &[f64; 3]) -> f64 {
    let val = (source2[2] * source2[1] + -source2[1]) / (1.0 - source2[2] * source2[2]);
    let val1 = (source1[0] * source1[0]) + (source1[1] * source1[1]) + (source1[2] * source1[2]);
    let val2 = (source1[0] * source1[1]) + (source1[1] * source1[2]);
    let val3 = source1[0] * source1[2];
    source2[0] * val1 + (2.0 * val * val2) + (2.0 * (-source2[1] * val + -source2[2]) * val3)
}

/// Two rounds of k-means over the records using the first `exp` predictors as centroids.
fn filter_records(vec_best: &mut [[f64; 3]; 8], exp: usize, records: &[[f64; 3]]) {
    let mut buffer_list = [[0f64; 3]; 8];
    let mut buffer1 = [0usize; 8];
    let mut buffer2 = [0f64; 3];

    for _ in 0..2 {
        for y in 0..exp {
            buffer1[y] = 0;
            buffer_list[y] = [0.0; 3];
        }

        for record in records {
            let mut index = 0;
            let mut value = 1.0e30;
            for i in 0..exp {
                let temp_val = contrast_vectors(&vec_best[i], record);
                if temp_val < value {
                    value = temp_val;
                    index = i;
                }
            }
            buffer1[index] += 1;
            matrix_filter(record, &mut buffer2);
            for i in 0..=2 {
                buffer_list[index][i] += buffer2[i];
            }
        }

        for i in 0..exp {
            if buffer1[i] > 0 {
                for y in 0..=2 {
                    buffer_list[i][y] /= buffer1[i] as f64;
                }
            }
        }

        for i in 0..exp {
            merge_finish_record(&buffer_list[i], &mut vec_best[i]);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{decode_gc_adpcm, encode_gc_adpcm, test_signal, CodecParameters};

    #[test]
    fn test_coefficient_count_is_checked() {
        let short = [0i16; 15];
        assert!(matches!(
            Coefficients::try_from(&short[..]),
            Err(GcAdpcmError::InvalidCoefficientCount(15))
        ));

        let exact: Vec<i16> = (0..16).collect();
        let coefficients = Coefficients::try_from(&exact[..]).unwrap();
        assert_eq!(coefficients.pair(3), (6, 7));
    }

    #[test]
    fn test_silence_gives_zero_coefficients() {
        let coefficients = Coefficients::from_pcm(&[0i16; 1000]);
        assert_eq!(*coefficients, [0; 16]);

        let coefficients = Coefficients::from_pcm(&[]);
        assert_eq!(*coefficients, [0; 16]);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let pcm = test_signal::music_like(5000);
        assert_eq!(Coefficients::from_pcm(&pcm), Coefficients::from_pcm(&pcm));
    }

    #[test]
    fn test_generated_coefficients_predict_a_sine() {
        let pcm = test_signal::sine(14 * 200, 64.0, 10000.0);
        let generated = Coefficients::from_pcm(&pcm);
        let no_prediction = Coefficients::default();

        let squared_error = |coefficients: &Coefficients| -> f64 {
            let adpcm = encode_gc_adpcm(&pcm, coefficients);
            let decoded =
                decode_gc_adpcm(&adpcm, coefficients, &CodecParameters::new(pcm.len())).unwrap();
            pcm.iter().zip(&decoded).map(|(&a, &b)| (a as f64 - b as f64).powi(2)).sum()
        };

        let generated_error = squared_error(&generated);
        let baseline_error = squared_error(&no_prediction);
        assert!(
            generated_error * 4.0 < baseline_error,
            "{generated_error} vs {baseline_error} with {:?}",
            *generated
        );
    }
}
