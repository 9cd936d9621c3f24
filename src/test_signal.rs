//! Deterministic PCM for tests.

/// A sine wave with the given period (in samples) and amplitude.
pub fn sine(len: usize, period: f64, amplitude: f64) -> Vec<i16> {
    (0..len)
        .map(|i| ((i as f64 * std::f64::consts::TAU / period).sin() * amplitude).round() as i16)
        .collect()
}

/// Two summed sines plus a little xorshift noise, to keep every predictor busy.
pub fn music_like(len: usize) -> Vec<i16> {
    let mut state = 0x2545_F491u32;
    (0..len)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let noise = (state % 201) as f64 - 100.0;
            let t = i as f64;
            let value = (t * 0.031).sin() * 6000.0 + (t * 0.17).sin() * 1500.0 + noise;
            value.round() as i16
        })
        .collect()
}
