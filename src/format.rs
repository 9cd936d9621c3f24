//! Multi-channel streams.
//!
//! Channels are independent, so encoding, decoding and alignment run one channel per
//! worker when the `parallel` feature is enabled.

use crate::{
    channel::GcAdpcmChannel,
    error::{validate_loop, GcAdpcmError, Result},
    loop_context::GcAdpcmContext,
};
use log::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct GcAdpcmFormat {
    pub sample_rate: u32,
    sample_count: usize,
    looping: bool,
    loop_start: usize,
    loop_end: usize,
    channels: Vec<GcAdpcmChannel>,
}

impl GcAdpcmFormat {
    /// Groups channels into one stream. Every channel must have the same length.
    pub fn new(channels: Vec<GcAdpcmChannel>, sample_rate: u32) -> Result<Self> {
        let sample_count = channels.first().map_or(0, GcAdpcmChannel::sample_count);

        for (index, channel) in channels.iter().enumerate() {
            if channel.sample_count() != sample_count {
                return Err(GcAdpcmError::MismatchedChannelLength {
                    index,
                    expected: sample_count,
                    actual: channel.sample_count(),
                });
            }
        }

        Ok(Self { sample_rate, sample_count, looping: false, loop_start: 0, loop_end: 0, channels })
    }

    /// Encodes one PCM buffer per channel, each with its own coefficients.
    pub fn from_pcm(pcm: &[Vec<i16>], sample_rate: u32) -> Result<Self> {
        let sample_count = pcm.first().map_or(0, Vec::len);
        if let Some((index, channel)) =
            pcm.iter().enumerate().find(|(_, channel)| channel.len() != sample_count)
        {
            return Err(GcAdpcmError::MismatchedChannelLength {
                index,
                expected: sample_count,
                actual: channel.len(),
            });
        }

        #[cfg(feature = "parallel")]
        let channels = pcm.par_iter().map(|channel| GcAdpcmChannel::from_pcm(channel)).collect();
        #[cfg(not(feature = "parallel"))]
        let channels = pcm.iter().map(|channel| GcAdpcmChannel::from_pcm(channel)).collect();

        Self::new(channels, sample_rate)
    }

    pub fn with_loop(mut self, loop_start: usize, loop_end: usize) -> Result<Self> {
        validate_loop(loop_start, loop_end, self.sample_count)?;

        self.looping = true;
        self.loop_start = loop_start;
        self.loop_end = loop_end;
        Ok(self)
    }

    pub fn without_loop(mut self) -> Self {
        self.looping = false;
        self.loop_start = 0;
        self.loop_end = 0;
        self
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn loop_start(&self) -> usize {
        self.loop_start
    }

    pub fn loop_end(&self) -> usize {
        self.loop_end
    }

    pub fn channels(&self) -> &[GcAdpcmChannel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Result<&GcAdpcmChannel> {
        let count = self.channels.len();
        self.channels.get(index).ok_or(GcAdpcmError::ChannelOutOfRange { index, count })
    }

    pub fn channel_mut(&mut self, index: usize) -> Result<&mut GcAdpcmChannel> {
        let count = self.channels.len();
        self.channels.get_mut(index).ok_or(GcAdpcmError::ChannelOutOfRange { index, count })
    }

    /// Moves the loop start of every channel onto `multiple` and adopts the aligned
    /// audio. Streams without a loop are left alone. If any channel fails, no channel's
    /// audio is replaced.
    pub fn align_loop(&mut self, multiple: usize) -> Result<()> {
        if !self.looping || multiple == 0 || self.loop_start % multiple == 0 {
            return Ok(());
        }

        let (loop_start, loop_end) = (self.loop_start, self.loop_end);
        let align =
            |channel: &mut GcAdpcmChannel| channel.align_loop(loop_start, loop_end, multiple);

        #[cfg(feature = "parallel")]
        let alignments: Vec<_> = self.channels.par_iter_mut().map(align).collect::<Result<_>>()?;
        #[cfg(not(feature = "parallel"))]
        let alignments: Vec<_> = self.channels.iter_mut().map(align).collect::<Result<_>>()?;

        if let Some(alignment) = alignments.first() {
            self.sample_count = alignment.sample_count;
            self.loop_start = alignment.loop_start;
            self.loop_end = alignment.loop_end;
        }

        for (channel, alignment) in self.channels.iter_mut().zip(alignments) {
            channel.adopt_alignment(alignment);
        }

        debug!(
            "aligned {} channels to a multiple of {}, loop now {}..{}",
            self.channels.len(),
            multiple,
            self.loop_start,
            self.loop_end
        );

        Ok(())
    }

    /// The loop context of every channel, or the default context when the stream
    /// doesn't loop.
    pub fn loop_contexts(&mut self) -> Result<Vec<GcAdpcmContext>> {
        if !self.looping {
            return Ok(vec![GcAdpcmContext::default(); self.channels.len()]);
        }

        let loop_start = self.loop_start;
        let context = |channel: &mut GcAdpcmChannel| channel.loop_context(loop_start, false);

        #[cfg(feature = "parallel")]
        let contexts = self.channels.par_iter_mut().map(context).collect();
        #[cfg(not(feature = "parallel"))]
        let contexts = self.channels.iter_mut().map(context).collect();

        contexts
    }

    pub fn to_pcm(&self) -> Result<Vec<Vec<i16>>> {
        #[cfg(feature = "parallel")]
        let pcm = self.channels.par_iter().map(GcAdpcmChannel::pcm).collect();
        #[cfg(not(feature = "parallel"))]
        let pcm = self.channels.iter().map(GcAdpcmChannel::pcm).collect();

        pcm
    }
}
