//! Fixed-point helpers shared by the encoder and decoder.
//!
//! Coefficients are 16-bit values on an 11-bit fixed-point scale, so a prediction is
//! `coef_1 * hist_1 + coef_2 * hist_2` followed by a shift of 11.

pub fn clamp_16(value: i32) -> i16 {
    if value > i16::MAX as i32 {
        return i16::MAX;
    }

    if value < i16::MIN as i32 {
        return i16::MIN;
    }

    value as i16
}

pub fn clamp_4(value: i32) -> i8 {
    if value > 7 {
        return 7;
    }

    if value < -8 {
        return -8;
    }

    value as i8
}

const SIGNED_NIBBLES: &[i8] = &[0, 1, 2, 3, 4, 5, 6, 7, -8, -7, -6, -5, -4, -3, -2, -1];

pub fn low_nibble(byte: u8) -> u8 {
    byte & 0xF
}

pub fn high_nibble(byte: u8) -> u8 {
    (byte >> 4) & 0xF
}

pub fn low_nibble_signed(byte: u8) -> i8 {
    SIGNED_NIBBLES[(byte & 0xF) as usize]
}

pub fn high_nibble_signed(byte: u8) -> i8 {
    SIGNED_NIBBLES[((byte >> 4) & 0xF) as usize]
}

pub fn combine_nibbles(high: i32, low: i32) -> u8 {
    (((high & 0xF) << 4) | (low & 0xF)) as u8
}

/// Unshifted prediction on the 11-bit scale.
/// Wraps on overflow like the console's 32-bit arithmetic.
pub fn predict(coef_1: i16, coef_2: i16, hist_1: i32, hist_2: i32) -> i32 {
    (coef_1 as i32 * hist_1).wrapping_add(coef_2 as i32 * hist_2)
}

/// Rebuilds a sample from its prediction and a quantized residual, exactly as the
/// hardware does. The result saturates to 16 bits.
pub fn reconstruct(predicted: i32, residual: i32, scale_power: i32) -> i16 {
    let distance = (residual * (1 << scale_power)) << 11;
    clamp_16(predicted.wrapping_add(distance).wrapping_add(1024) >> 11)
}

/// Smallest multiple of `multiple` that is `>= value`. A multiple of zero leaves the
/// value alone.
pub fn next_multiple(value: usize, multiple: usize) -> usize {
    if multiple == 0 || value % multiple == 0 {
        value
    } else {
        value + multiple - value % multiple
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clamping_saturates() {
        assert_eq!(clamp_16(40000), i16::MAX);
        assert_eq!(clamp_16(-40000), i16::MIN);
        assert_eq!(clamp_16(-5), -5);
        assert_eq!(clamp_4(9), 7);
        assert_eq!(clamp_4(-9), -8);
        assert_eq!(clamp_4(3), 3);
    }

    #[test]
    fn test_nibbles() {
        assert_eq!(high_nibble(0xA3), 0xA);
        assert_eq!(low_nibble(0xA3), 0x3);
        assert_eq!(high_nibble_signed(0xF0), -1);
        assert_eq!(low_nibble_signed(0x08), -8);
        assert_eq!(combine_nibbles(-1, 7), 0xF7);
        assert_eq!(combine_nibbles(-8, -8), 0x88);
    }

    #[test]
    fn test_reconstruct_rounds_and_saturates() {
        // 2048 * 100 is exactly 100 on the 11-bit scale.
        assert_eq!(reconstruct(2048 * 100, 0, 0), 100);
        assert_eq!(reconstruct(2048 * 100, 3, 2), 112);
        assert_eq!(reconstruct(2048 * 32000, 7, 11), i16::MAX);
        assert_eq!(reconstruct(-2048 * 32000, -8, 11), i16::MIN);
        // Half-way values round up.
        assert_eq!(reconstruct(1024, 0, 0), 1);
        assert_eq!(reconstruct(-1024, 0, 0), 0);
    }

    #[test]
    fn test_next_multiple() {
        assert_eq!(next_multiple(15, 14), 28);
        assert_eq!(next_multiple(28, 14), 28);
        assert_eq!(next_multiple(7, 0), 7);
    }
}
