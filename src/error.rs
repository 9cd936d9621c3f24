use thiserror::Error;

#[derive(Debug, Error)]
pub enum GcAdpcmError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid IDSP header")]
    InvalidHeader,

    #[error("unexpected end of data")]
    UnexpectedEof,

    /// The ADPCM buffer can't hold the number of samples it claims to.
    #[error("{sample_count} samples need {expected} bytes of ADPCM data, got {actual}")]
    InvalidBufferLength { sample_count: usize, expected: usize, actual: usize },

    #[error("expected 16 coefficients, got {0}")]
    InvalidCoefficientCount(usize),

    #[error("channel {index} requested, but the stream only has {count} channels")]
    ChannelOutOfRange { index: usize, count: usize },

    #[error("loop {loop_start}..{loop_end} doesn't fit in {sample_count} samples")]
    InvalidLoopPoints { loop_start: usize, loop_end: usize, sample_count: usize },

    #[error("frame {frame} uses predictor {predictor}, only 0 to 7 exist")]
    InvalidPredictor { frame: usize, predictor: u8 },

    #[error("IDSP interleave of {0} bytes isn't a whole number of frames")]
    InvalidInterleave(usize),

    #[error("{field} of {value} doesn't fit in a 32-bit header field")]
    ValueTooLarge { field: &'static str, value: usize },

    #[error("seek table entries must cover at least one sample")]
    InvalidSeekTableInterval,

    /// Multi-channel input where one channel has a different length than the first.
    #[error("channel {index} has {actual} samples, expected {expected}")]
    MismatchedChannelLength { index: usize, expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, GcAdpcmError>;

/// Checks loop points against a sample count before any work is done on them.
pub(crate) fn validate_loop(loop_start: usize, loop_end: usize, sample_count: usize) -> Result<()> {
    if loop_start > loop_end || loop_end > sample_count {
        return Err(GcAdpcmError::InvalidLoopPoints { loop_start, loop_end, sample_count });
    }

    Ok(())
}
