//! Decoder history snapshots at regular sample intervals.
//!
//! Entry `i` of a table built with `samples_per_entry` holds `(hist_1, hist_2)` as they
//! are right before sample `i * samples_per_entry` is decoded, so decoding can start
//! there without replaying the stream.

use std::collections::{btree_map::Entry, BTreeMap};

use crate::{
    coefficients::Coefficients,
    decode::decode_into,
    error::{GcAdpcmError, Result},
};
use log::trace;

pub fn build_seek_table(
    adpcm: &[u8],
    coefficients: &Coefficients,
    sample_count: usize,
    samples_per_entry: usize,
    history_1: i16,
    history_2: i16,
) -> Result<Vec<(i16, i16)>> {
    if samples_per_entry == 0 {
        return Err(GcAdpcmError::InvalidSeekTableInterval);
    }

    let entry_count = sample_count.div_ceil(samples_per_entry);
    let mut table = Vec::with_capacity(entry_count);
    let mut buffer = vec![0i16; samples_per_entry.min(sample_count)];
    let mut history = (history_1, history_2);

    for entry in 0..entry_count {
        table.push(history);

        let start = entry * samples_per_entry;
        let count = samples_per_entry.min(sample_count - start);
        history = decode_into(adpcm, coefficients, start, history, &mut buffer[..count])?;
    }

    trace!("built seek table of {} entries every {} samples", entry_count, samples_per_entry);

    Ok(table)
}

#[derive(Debug, Clone)]
struct CachedSeekTable {
    entries: Vec<(i16, i16)>,
    self_calculated: bool,
}

/// Seek tables keyed by their interval. Tables built from the audio itself are marked
/// self-calculated; tables handed in from elsewhere (a file header, say) are not.
#[derive(Debug, Clone, Default)]
pub struct SeekTableCache {
    tables: BTreeMap<usize, CachedSeekTable>,
}

impl SeekTableCache {
    /// The cached table for an interval. With `ensure_self_calculated`, supplied tables
    /// are ignored.
    pub fn get(
        &self,
        samples_per_entry: usize,
        ensure_self_calculated: bool,
    ) -> Option<&[(i16, i16)]> {
        self.tables
            .get(&samples_per_entry)
            .filter(|table| table.self_calculated || !ensure_self_calculated)
            .map(|table| table.entries.as_slice())
    }

    /// Returns the cached table, building and caching it first if it's missing or
    /// doesn't meet `ensure_self_calculated`.
    pub fn get_or_build<F>(
        &mut self,
        samples_per_entry: usize,
        ensure_self_calculated: bool,
        build: F,
    ) -> Result<&[(i16, i16)]>
    where
        F: FnOnce() -> Result<Vec<(i16, i16)>>,
    {
        let table = match self.tables.entry(samples_per_entry) {
            Entry::Occupied(entry) => {
                let table = entry.into_mut();
                if ensure_self_calculated && !table.self_calculated {
                    *table = CachedSeekTable { entries: build()?, self_calculated: true };
                }
                table
            }
            Entry::Vacant(entry) => {
                entry.insert(CachedSeekTable { entries: build()?, self_calculated: true })
            }
        };

        Ok(&table.entries)
    }

    pub fn insert(
        &mut self,
        samples_per_entry: usize,
        entries: Vec<(i16, i16)>,
        self_calculated: bool,
    ) {
        self.tables.insert(samples_per_entry, CachedSeekTable { entries, self_calculated });
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The latest self-calculated entry at or before `sample`, as
    /// `(entry_sample, hist_1, hist_2)`.
    pub fn nearest_entry(&self, sample: usize) -> Option<(usize, i16, i16)> {
        self.tables
            .iter()
            .filter(|(&samples_per_entry, table)| {
                samples_per_entry > 0 && table.self_calculated && !table.entries.is_empty()
            })
            .map(|(&samples_per_entry, table)| {
                let index = (sample / samples_per_entry).min(table.entries.len() - 1);
                let (hist_1, hist_2) = table.entries[index];
                (index * samples_per_entry, hist_1, hist_2)
            })
            .max_by_key(|&(entry_sample, _, _)| entry_sample)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{decode::decode_gc_adpcm, encode::encode_gc_adpcm, test_signal, CodecParameters};
    use proptest::prelude::*;

    fn history_before(pcm: &[i16], sample: usize) -> (i16, i16) {
        let at = |back: usize| sample.checked_sub(back).map_or(0, |i| pcm[i]);
        (at(1), at(2))
    }

    #[test]
    fn test_entries_match_decoded_history() {
        let pcm = test_signal::music_like(40_000);
        let coefficients = Coefficients::from_pcm(&pcm);
        let adpcm = encode_gc_adpcm(&pcm, &coefficients);
        let decoded =
            decode_gc_adpcm(&adpcm, &coefficients, &CodecParameters::new(pcm.len())).unwrap();

        for samples_per_entry in [256, 14336] {
            let table =
                build_seek_table(&adpcm, &coefficients, pcm.len(), samples_per_entry, 0, 0)
                    .unwrap();
            assert_eq!(table.len(), pcm.len().div_ceil(samples_per_entry));

            for (i, &entry) in table.iter().enumerate() {
                let sample = i * samples_per_entry;
                assert_eq!(entry, history_before(&decoded, sample), "entry {i}");

                let config = CodecParameters::new(pcm.len() - sample)
                    .starting_at(sample)
                    .with_history(entry.0, entry.1);
                let resumed = decode_gc_adpcm(&adpcm, &coefficients, &config).unwrap();
                assert_eq!(resumed, decoded[sample..], "entry {i}");
            }
        }
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let result = build_seek_table(&[], &Coefficients::default(), 0, 0, 0, 0);
        assert!(matches!(result, Err(GcAdpcmError::InvalidSeekTableInterval)));
    }

    #[test]
    fn test_interval_longer_than_audio() {
        let pcm = test_signal::sine(100, 30.0, 8000.0);
        let coefficients = Coefficients::from_pcm(&pcm);
        let adpcm = encode_gc_adpcm(&pcm, &coefficients);

        for samples_per_entry in [100, 101, usize::MAX] {
            let table =
                build_seek_table(&adpcm, &coefficients, pcm.len(), samples_per_entry, 3, 4)
                    .unwrap();
            assert_eq!(table, [(3, 4)]);
        }
    }

    #[test]
    fn test_cache_tracks_origin() {
        let mut cache = SeekTableCache::default();
        cache.insert(256, vec![(0, 0), (5, 6)], false);

        assert_eq!(cache.get(256, false), Some(&[(0, 0), (5, 6)][..]));
        assert_eq!(cache.get(256, true), None);
        assert_eq!(cache.nearest_entry(1000), None);

        let rebuilt = cache.get_or_build(256, true, || Ok(vec![(0, 0), (7, 8)])).unwrap();
        assert_eq!(rebuilt, &[(0, 0), (7, 8)]);
        assert_eq!(cache.get(256, true), Some(&[(0, 0), (7, 8)][..]));

        // A cached self-calculated table isn't rebuilt.
        let cached = cache
            .get_or_build(256, true, || Err(GcAdpcmError::InvalidSeekTableInterval))
            .unwrap();
        assert_eq!(cached, &[(0, 0), (7, 8)]);

        cache.insert(100, vec![(0, 0), (1, 2), (3, 4)], true);
        assert_eq!(cache.nearest_entry(260), Some((256, 7, 8)));
        assert_eq!(cache.nearest_entry(210), Some((200, 3, 4)));
        assert_eq!(cache.nearest_entry(150), Some((100, 1, 2)));

        cache.clear();
        assert!(cache.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_resuming_from_any_entry_matches(
            len in 1usize..600,
            samples_per_entry in 1usize..100,
            offset in 0usize..500,
        ) {
            let pcm = test_signal::music_like(offset + len)[offset..].to_vec();
            let coefficients = Coefficients::from_pcm(&pcm);
            let adpcm = encode_gc_adpcm(&pcm, &coefficients);
            let decoded =
                decode_gc_adpcm(&adpcm, &coefficients, &CodecParameters::new(len)).unwrap();

            let table =
                build_seek_table(&adpcm, &coefficients, len, samples_per_entry, 0, 0).unwrap();
            for (i, &entry) in table.iter().enumerate() {
                prop_assert_eq!(entry, history_before(&decoded, i * samples_per_entry));
            }
        }
    }
}
