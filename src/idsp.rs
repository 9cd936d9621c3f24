//! The IDSP container: a big-endian header, one 0x60-byte record per channel, then
//! the channels' ADPCM data interleaved in fixed-size blocks.
//!
//! ```text
//! 0x00  "IDSP"             0x04  reserved
//! 0x08  channel count      0x0C  sample rate
//! 0x10  sample count       0x14  loop start
//! 0x18  loop end           0x1C  interleave size (0 = not interleaved)
//! 0x20  header size        0x24  channel record size
//! 0x28  audio data offset  0x2C  audio data length per channel
//! ```

use bytes::{Buf, BufMut, BytesMut};
use std::path::Path;

use crate::{
    channel::GcAdpcmChannel,
    error::{GcAdpcmError, Result},
    format::GcAdpcmFormat,
    loop_context::GcAdpcmContext,
    math::next_multiple,
    sample_count_to_byte_count, sample_count_to_nibble_count, sample_to_nibble, BYTES_PER_FRAME,
    SAMPLES_PER_FRAME,
};
use log::{debug, warn};

const IDSP_HEADER: &[u8] = b"IDSP";
const HEADER_SIZE: usize = 0x30;
const CHANNEL_INFO_SIZE: usize = 0x60;
/// Bytes of a channel record that carry data; the rest is padding.
const CHANNEL_INFO_USED: usize = 0x4A;

/// Options for writing IDSP files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdspConfig {
    /// Bytes of one channel's data per interleave block. Must be a whole number of
    /// frames; 0 stores each channel contiguously.
    pub interleave_size: usize,
    /// Move the loop start onto an interleave block boundary before writing.
    pub align_loop: bool,
}

impl Default for IdspConfig {
    fn default() -> Self {
        Self { interleave_size: 0x800, align_loop: true }
    }
}

impl GcAdpcmContext {
    fn read_from_buf(buf: &mut impl Buf) -> Self {
        let predictor_scale = buf.get_u16() as u8;
        let history_1 = buf.get_i16();
        let history_2 = buf.get_i16();

        Self { predictor_scale, history_1, history_2 }
    }

    fn write_to_buf(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.predictor_scale as u16);
        buf.put_i16(self.history_1);
        buf.put_i16(self.history_2);
    }
}

#[derive(Debug)]
struct ChannelMetadata {
    sample_count: usize,
    looping: bool,
    coefficients: [i16; 16],
    gain: i16,
    start_context: GcAdpcmContext,
    loop_context: GcAdpcmContext,
}

pub fn read_idsp<P: AsRef<Path>>(file_path: P) -> Result<GcAdpcmFormat> {
    let bytes = std::fs::read(file_path)?;
    read_idsp_bytes(&bytes)
}

/// `len` bytes at `offset`, or an error if the file ends first.
fn section(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or(GcAdpcmError::UnexpectedEof)
}

pub fn read_idsp_bytes(bytes: &[u8]) -> Result<GcAdpcmFormat> {
    let mut header = section(bytes, 0, HEADER_SIZE).map_err(|_| GcAdpcmError::InvalidHeader)?;

    if &header[..IDSP_HEADER.len()] != IDSP_HEADER {
        return Err(GcAdpcmError::InvalidHeader);
    }

    header.advance(IDSP_HEADER.len());
    header.advance(4);

    let channel_count = header.get_u32() as usize;
    let sample_rate = header.get_u32();
    let sample_count = header.get_u32() as usize;
    let loop_start = header.get_u32() as usize;
    let loop_end = header.get_u32() as usize;
    let interleave_size = header.get_u32() as usize;
    let header_size = header.get_u32() as usize;
    let channel_info_size = header.get_u32() as usize;
    let audio_data_offset = header.get_u32() as usize;
    let audio_data_length = header.get_u32() as usize;

    debug!(
        "IDSP: {} channels, {} Hz, {} samples, interleave {:#x}",
        channel_count, sample_rate, sample_count, interleave_size
    );

    if interleave_size % BYTES_PER_FRAME != 0 {
        return Err(GcAdpcmError::InvalidInterleave(interleave_size));
    }

    if channel_count == 0 {
        return Err(GcAdpcmError::InvalidHeader);
    }

    // Every size below comes from the file, so bound it by the file before allocating.
    let records_end = channel_count
        .checked_mul(channel_info_size.max(CHANNEL_INFO_USED))
        .and_then(|size| size.checked_add(header_size))
        .ok_or(GcAdpcmError::UnexpectedEof)?;
    if records_end > bytes.len() || audio_data_length > bytes.len() {
        return Err(GcAdpcmError::UnexpectedEof);
    }

    let mut metadata = Vec::with_capacity(channel_count);
    for i in 0..channel_count {
        let offset = i
            .checked_mul(channel_info_size)
            .and_then(|o| o.checked_add(header_size))
            .ok_or(GcAdpcmError::UnexpectedEof)?;
        let mut record = section(bytes, offset, CHANNEL_INFO_USED)?;

        let sample_count = record.get_u32() as usize;
        let _nibble_count = record.get_u32();
        let _sample_rate = record.get_u32();
        let looping = record.get_u16() == 1;
        record.advance(2);
        let _start_address = record.get_u32();
        let _end_address = record.get_u32();
        let _current_address = record.get_u32();
        let mut coefficients = [0; 16];

        for c in &mut coefficients {
            *c = record.get_i16();
        }

        let gain = record.get_i16();
        let start_context = GcAdpcmContext::read_from_buf(&mut record);
        let loop_context = GcAdpcmContext::read_from_buf(&mut record);

        metadata.push(ChannelMetadata {
            sample_count,
            looping,
            coefficients,
            gain,
            start_context,
            loop_context,
        });
    }

    let looping = metadata.iter().any(|c| c.looping);

    let stored_length = if interleave_size == 0 {
        audio_data_length
    } else {
        next_multiple(audio_data_length, interleave_size)
    };
    let data_length =
        stored_length.checked_mul(channel_count).ok_or(GcAdpcmError::UnexpectedEof)?;
    let audio_data = section(bytes, audio_data_offset, data_length)?;
    let audio = deinterleave(audio_data, interleave_size, channel_count, audio_data_length);

    let mut channels = Vec::with_capacity(channel_count);
    for (i, (meta, mut adpcm)) in metadata.into_iter().zip(audio).enumerate() {
        let required = sample_count_to_byte_count(meta.sample_count);
        if required > bytes.len() {
            return Err(GcAdpcmError::UnexpectedEof);
        }
        if adpcm.len() < required {
            warn!("IDSP channel {} holds {} bytes, padding to {}", i, adpcm.len(), required);
            adpcm.resize(required, 0);
        }

        let mut channel = GcAdpcmChannel::new(adpcm, &meta.coefficients, meta.sample_count)?
            .with_history(meta.start_context.history_1, meta.start_context.history_2)
            .with_gain(meta.gain);

        if meta.looping {
            channel.set_loop_context(loop_start, meta.loop_context);
        }

        channels.push(channel);
    }

    let format = GcAdpcmFormat::new(channels, sample_rate)?;

    if looping {
        format.with_loop(loop_start, loop_end)
    } else {
        Ok(format)
    }
}

/// Splits interleaved data into one buffer of `channel_length` bytes per channel.
fn deinterleave(
    data: &[u8],
    interleave_size: usize,
    channel_count: usize,
    channel_length: usize,
) -> Vec<Vec<u8>> {
    let block_size = if interleave_size == 0 { channel_length.max(1) } else { interleave_size };
    let mut channels = vec![Vec::with_capacity(channel_length); channel_count];

    for (i, block) in data.chunks(block_size).enumerate() {
        let channel = &mut channels[i % channel_count];
        let take = block.len().min(channel_length - channel.len());
        channel.extend_from_slice(&block[..take]);
    }

    channels
}

fn header_field(field: &'static str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| GcAdpcmError::ValueTooLarge { field, value })
}

pub fn write_idsp_bytes(format: &GcAdpcmFormat, config: &IdspConfig) -> Result<Vec<u8>> {
    if config.interleave_size % BYTES_PER_FRAME != 0 {
        return Err(GcAdpcmError::InvalidInterleave(config.interleave_size));
    }

    let mut format = format.clone();
    if config.align_loop && config.interleave_size != 0 {
        format.align_loop(config.interleave_size / BYTES_PER_FRAME * SAMPLES_PER_FRAME)?;
    }
    let loop_contexts = format.loop_contexts()?;

    let channel_count = format.channel_count();
    let sample_count = format.sample_count();
    let audio_data_length = sample_count_to_byte_count(sample_count);
    let stored_length = next_multiple(audio_data_length, config.interleave_size);
    let audio_data_offset = HEADER_SIZE + channel_count * CHANNEL_INFO_SIZE;

    let mut buf = BytesMut::with_capacity(audio_data_offset + stored_length * channel_count);

    buf.put_slice(IDSP_HEADER);
    buf.put_u32(0);
    buf.put_u32(header_field("channel count", channel_count)?);
    buf.put_u32(format.sample_rate);
    buf.put_u32(header_field("sample count", sample_count)?);
    buf.put_u32(header_field("loop start", format.loop_start())?);
    buf.put_u32(header_field("loop end", format.loop_end())?);
    buf.put_u32(header_field("interleave size", config.interleave_size)?);
    buf.put_u32(HEADER_SIZE as u32);
    buf.put_u32(CHANNEL_INFO_SIZE as u32);
    buf.put_u32(header_field("audio data offset", audio_data_offset)?);
    buf.put_u32(header_field("audio data length", audio_data_length)?);

    let (first_sample, last_sample) = if format.looping() {
        (format.loop_start(), format.loop_end().saturating_sub(1))
    } else {
        (0, sample_count.saturating_sub(1))
    };
    let start_address = sample_to_nibble(first_sample);
    let end_address = sample_to_nibble(last_sample);

    for (channel, loop_context) in format.channels().iter().zip(&loop_contexts) {
        let record_start = buf.len();

        buf.put_u32(header_field("sample count", channel.sample_count())?);
        buf.put_u32(header_field("nibble count", sample_count_to_nibble_count(sample_count))?);
        buf.put_u32(format.sample_rate);
        buf.put_u16(format.looping() as u16);
        buf.put_u16(0);
        buf.put_u32(header_field("start address", start_address)?);
        buf.put_u32(header_field("end address", end_address)?);
        buf.put_u32(header_field("current address", sample_to_nibble(0))?);

        for &coefficient in channel.coefficients().iter() {
            buf.put_i16(coefficient);
        }

        buf.put_i16(channel.gain());
        channel.start_context().write_to_buf(&mut buf);
        loop_context.write_to_buf(&mut buf);

        buf.put_bytes(0, CHANNEL_INFO_SIZE - (buf.len() - record_start));
    }

    if config.interleave_size == 0 {
        for channel in format.channels() {
            buf.put_slice(channel.adpcm());
        }
    } else {
        for block_start in (0..stored_length).step_by(config.interleave_size) {
            for channel in format.channels() {
                let adpcm = channel.adpcm();
                let block_end = (block_start + config.interleave_size).min(adpcm.len());
                let block = adpcm.get(block_start..block_end).unwrap_or(&[]);
                buf.put_slice(block);
                buf.put_bytes(0, config.interleave_size - block.len());
            }
        }
    }

    Ok(buf.to_vec())
}
