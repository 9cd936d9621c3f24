use crate::{
    alignment::{align_loop, GcAdpcmAlignment},
    coefficients::Coefficients,
    decode::{decode_gc_adpcm, get_predictor_scale},
    encode::encode_gc_adpcm,
    error::{validate_loop, GcAdpcmError, Result},
    loop_context::{compute_loop_context, GcAdpcmContext},
    sample_count_to_byte_count,
    seek_table::{build_seek_table, SeekTableCache},
    CodecParameters, SAMPLES_PER_FRAME,
};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CachedLoopContext {
    loop_start: usize,
    context: GcAdpcmContext,
    self_calculated: bool,
}

/// One channel of GC-ADPCM audio along with everything needed to decode it.
///
/// Seek tables and the loop context are computed lazily and cached. Nothing is
/// invalidated implicitly: call [`GcAdpcmChannel::clear_seek_table_cache`] if the cached
/// data may be stale.
#[derive(Debug, Clone)]
pub struct GcAdpcmChannel {
    sample_count: usize,
    adpcm: Vec<u8>,
    coefficients: Coefficients,
    gain: i16,
    start_context: GcAdpcmContext,
    loop_context: Option<CachedLoopContext>,
    seek_tables: SeekTableCache,
}

impl GcAdpcmChannel {
    /// Wraps existing ADPCM data. The buffer must hold every frame of `sample_count`
    /// samples; anything past the last frame is dropped.
    pub fn new(mut adpcm: Vec<u8>, coefficients: &[i16], sample_count: usize) -> Result<Self> {
        let coefficients = Coefficients::try_from(coefficients)?;

        let expected = sample_count_to_byte_count(sample_count);
        if adpcm.len() < expected {
            return Err(GcAdpcmError::InvalidBufferLength {
                sample_count,
                expected,
                actual: adpcm.len(),
            });
        }
        adpcm.truncate(expected);

        let start_context = GcAdpcmContext {
            predictor_scale: get_predictor_scale(&adpcm, 0),
            ..Default::default()
        };

        Ok(Self {
            sample_count,
            adpcm,
            coefficients,
            gain: 0,
            start_context,
            loop_context: None,
            seek_tables: SeekTableCache::default(),
        })
    }

    /// Generates coefficients for `pcm` and encodes it.
    pub fn from_pcm(pcm: &[i16]) -> Self {
        Self::from_pcm_with_coefficients(pcm, Coefficients::from_pcm(pcm))
    }

    pub fn from_pcm_with_coefficients(pcm: &[i16], coefficients: Coefficients) -> Self {
        let adpcm = encode_gc_adpcm(pcm, &coefficients);
        let start_context = GcAdpcmContext {
            predictor_scale: get_predictor_scale(&adpcm, 0),
            ..Default::default()
        };

        Self {
            sample_count: pcm.len(),
            adpcm,
            coefficients,
            gain: 0,
            start_context,
            loop_context: None,
            seek_tables: SeekTableCache::default(),
        }
    }

    /// Sets the history preceding sample 0.
    pub fn with_history(mut self, history_1: i16, history_2: i16) -> Self {
        self.start_context.history_1 = history_1;
        self.start_context.history_2 = history_2;
        self
    }

    pub fn with_gain(mut self, gain: i16) -> Self {
        self.gain = gain;
        self
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn adpcm(&self) -> &[u8] {
        &self.adpcm
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }

    pub fn gain(&self) -> i16 {
        self.gain
    }

    pub fn start_context(&self) -> GcAdpcmContext {
        self.start_context
    }

    pub fn pcm(&self) -> Result<Vec<i16>> {
        let config = CodecParameters::new(self.sample_count)
            .with_history(self.start_context.history_1, self.start_context.history_2);

        decode_gc_adpcm(&self.adpcm, &self.coefficients, &config)
    }

    /// The seek table with one entry every `samples_per_entry` samples, built on first
    /// use. A table added with [`GcAdpcmChannel::add_seek_table`] is returned as-is
    /// unless `ensure_self_calculated` is set.
    pub fn get_seek_table(
        &mut self,
        samples_per_entry: usize,
        ensure_self_calculated: bool,
    ) -> Result<&[(i16, i16)]> {
        let start = self.start_context;
        self.seek_tables.get_or_build(samples_per_entry, ensure_self_calculated, || {
            build_seek_table(
                &self.adpcm,
                &self.coefficients,
                self.sample_count,
                samples_per_entry,
                start.history_1,
                start.history_2,
            )
        })
    }

    /// Caches a seek table that came from outside, such as a file header.
    pub fn add_seek_table(&mut self, samples_per_entry: usize, entries: Vec<(i16, i16)>) {
        self.seek_tables.insert(samples_per_entry, entries, false);
    }

    pub fn clear_seek_table_cache(&mut self) {
        self.seek_tables.clear();
    }

    /// The decoder state right before `loop_start`.
    ///
    /// A context cached for the same loop start is reused; one stored with
    /// [`GcAdpcmChannel::set_loop_context`] only counts when `ensure_self_calculated`
    /// isn't set.
    pub fn loop_context(
        &mut self,
        loop_start: usize,
        ensure_self_calculated: bool,
    ) -> Result<GcAdpcmContext> {
        validate_loop(loop_start, loop_start, self.sample_count)?;

        if let Some(cached) = self.loop_context {
            let trusted = cached.self_calculated || !ensure_self_calculated;
            if cached.loop_start == loop_start && trusted {
                return Ok(cached.context);
            }
        }

        let origin = self.decode_origin(loop_start);
        let context = compute_loop_context(&self.adpcm, &self.coefficients, loop_start, origin)?;

        self.loop_context = Some(CachedLoopContext { loop_start, context, self_calculated: true });
        Ok(context)
    }

    /// Stores a loop context read from elsewhere, replacing any cached one.
    pub fn set_loop_context(&mut self, loop_start: usize, context: GcAdpcmContext) {
        self.loop_context = Some(CachedLoopContext { loop_start, context, self_calculated: false });
    }

    /// Builds a copy of this channel's audio with the loop start moved to a multiple of
    /// `multiple`. The channel keeps its current audio until
    /// [`GcAdpcmChannel::adopt_alignment`] is called. Cached seek tables are cleared.
    pub fn align_loop(
        &mut self,
        loop_start: usize,
        loop_end: usize,
        multiple: usize,
    ) -> Result<GcAdpcmAlignment> {
        validate_loop(loop_start, loop_end, self.sample_count)?;

        let frames_to_keep_start = loop_end / SAMPLES_PER_FRAME * SAMPLES_PER_FRAME;
        let origin = self.decode_origin(loop_start.min(frames_to_keep_start.saturating_sub(2)));

        let alignment = align_loop(
            &self.adpcm,
            &self.coefficients,
            self.sample_count,
            origin,
            loop_start,
            loop_end,
            multiple,
        );

        self.clear_seek_table_cache();
        alignment
    }

    /// Replaces this channel's audio with an aligned version of it.
    pub fn adopt_alignment(&mut self, alignment: GcAdpcmAlignment) {
        if alignment.is_aligned_already {
            return;
        }

        debug!(
            "adopting aligned audio: {} -> {} samples, loop starts at {}",
            self.sample_count, alignment.sample_count, alignment.loop_start
        );

        self.sample_count = alignment.sample_count;
        self.adpcm = alignment.adpcm;
        self.start_context.predictor_scale = get_predictor_scale(&self.adpcm, 0);
        self.loop_context = None;
        self.clear_seek_table_cache();
    }

    /// Where to start decoding to reach `sample`: the closest self-calculated seek table
    /// entry, or the start of the stream.
    fn decode_origin(&self, sample: usize) -> (usize, i16, i16) {
        self.seek_tables.nearest_entry(sample).unwrap_or((
            0,
            self.start_context.history_1,
            self.start_context.history_2,
        ))
    }
}
