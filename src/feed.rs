// src/feed.rs

//! Feed composition and epoch cycling.
//!
//! This module provides the [`read_webdataset`] entry point that composes the
//! source and pipeline stages per configuration, and the [`Feed`] it returns:
//! a pull interface yielding individual samples (quiet mode) or pre-collected
//! batches (raise/no modes) with the configured end-of-epoch discipline.
//!
//! # Example
//!
//! ```ignore
//! use shardfeed::{read_webdataset, CycleMode, FeedOptions};
//! use std::sync::Arc;
//!
//! let options = FeedOptions {
//!     fields: vec!["jpg;png".into(), "cls".into()],
//!     batch_size: 32,
//!     random_shuffle: true,
//!     cycle: CycleMode::Raise,
//!     ..Default::default()
//! };
//!
//! let mut feed = read_webdataset(decoder, shard_paths, options)?;
//! while let Some(batch) = feed.next_batch()? {
//!     // decode / augment / transfer batch.fields ...
//! }
//! feed.reset()?; // next epoch
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::debug;

use crate::config::{CycleMode, FeedOptions};
use crate::error::{FeedError, Result};
use crate::pipeline::{Batch, BatchCollector, BatchPadder, BatchStream, ReadAhead, ShuffleBuffer};
use crate::source::{FieldSelector, Sample, SampleStream, ShardDecoder, ShardSampleSource};

/// Compose a sample pipeline over sharded archives.
///
/// Builds the stage chain source → shuffle → pad → collect → read-ahead as
/// enabled by `options` and returns the pull-side [`Feed`]. With `read_ahead`
/// set, the first epoch is drained eagerly here, so shard errors surface from
/// this call rather than from the first pull.
///
/// # Errors
///
/// Returns a configuration error for invalid options and a shard-read error
/// when `read_ahead` hits an unreadable shard.
pub fn read_webdataset(
    decoder: Arc<dyn ShardDecoder>,
    shards: Vec<PathBuf>,
    options: FeedOptions,
) -> Result<Feed> {
    options.validate()?;
    let fields = Arc::new(FieldSelector::parse_all(&options.fields)?);

    let mut feed = Feed {
        decoder,
        shards,
        fields,
        // One generator for the feed's lifetime: epochs reshuffle
        // deterministically without repeating each other.
        shuffle_rng: StdRng::seed_from_u64(options.seed),
        options,
        state: FeedState::Finished,
    };
    feed.state = feed.build_epoch()?;
    Ok(feed)
}

enum FeedState {
    /// Quiet mode: an active epoch of individual samples.
    Samples(SampleStream),
    /// Raise/no modes: an active epoch of batches.
    Batches(BatchStream),
    /// Raise mode: epoch ended and signaled, waiting for an explicit reset.
    EpochEnd,
    /// No further items, ever (no mode after its epoch, or a fatal error).
    Finished,
}

/// The pull side of a composed pipeline.
///
/// A feed is a single-consumer, stateful handle; the only restart point is
/// the epoch boundary, where the whole chain is reconstructed from the
/// source.
pub struct Feed {
    decoder: Arc<dyn ShardDecoder>,
    shards: Vec<PathBuf>,
    fields: Arc<Vec<FieldSelector>>,
    options: FeedOptions,
    shuffle_rng: StdRng,
    state: FeedState,
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("num_shards", &self.shards.len())
            .field("arity", &self.fields.len())
            .field("cycle", &self.options.cycle)
            .finish()
    }
}

impl Feed {
    /// Pull the next sample (quiet mode only).
    ///
    /// On epoch exhaustion the chain is rebuilt transparently and pulling
    /// continues: the stream is logically infinite. A dataset that yields no
    /// samples at all is reported as a configuration error instead of
    /// looping forever.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the feed is in raise/no mode, and
    /// propagates fatal shard-read errors.
    pub fn next_sample(&mut self) -> Result<Sample> {
        let stream = match &mut self.state {
            FeedState::Samples(stream) => stream,
            _ => {
                return Err(FeedError::config(
                    "next_sample is only available with cycle = \"quiet\"",
                ))
            }
        };

        match stream.next() {
            Some(item) => item,
            None => {
                debug!("epoch exhausted; restarting quietly");
                let mut fresh = self.build_samples()?;
                match fresh.next() {
                    Some(item) => {
                        self.state = FeedState::Samples(fresh);
                        item
                    }
                    None => Err(FeedError::config(
                        "dataset yields no samples; quiet cycling would never produce an item",
                    )),
                }
            }
        }
    }

    /// Pull the next batch (raise/no modes only).
    ///
    /// `Ok(None)` is the end-of-epoch signal, not an error. In raise mode it
    /// repeats until [`reset`](Self::reset) starts a fresh epoch; in no mode
    /// it is permanent.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the feed is in quiet mode, and
    /// propagates fatal shard-read errors (after which the feed stays
    /// exhausted).
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        match &mut self.state {
            FeedState::Batches(stream) => match stream.next() {
                Some(Ok(batch)) => Ok(Some(batch)),
                Some(Err(e)) => {
                    self.state = FeedState::Finished;
                    Err(e)
                }
                None => {
                    self.state = match self.options.cycle {
                        CycleMode::Raise => FeedState::EpochEnd,
                        _ => FeedState::Finished,
                    };
                    Ok(None)
                }
            },
            FeedState::EpochEnd | FeedState::Finished => Ok(None),
            FeedState::Samples(_) => Err(FeedError::config(
                "next_batch is only available with cycle = \"raise\" or \"no\"",
            )),
        }
    }

    /// Start a fresh epoch after an end-of-epoch signal.
    ///
    /// In raise mode this rebuilds the chain from the source; in quiet mode
    /// it restarts the epoch eagerly (pulling would restart it anyway). In no
    /// mode, and after a fatal error, the feed stays exhausted.
    ///
    /// # Errors
    ///
    /// Propagates build failures, e.g. a shard-read error during an eager
    /// read-ahead pass.
    pub fn reset(&mut self) -> Result<()> {
        if matches!(self.state, FeedState::Finished) {
            return Ok(());
        }
        match self.options.cycle {
            CycleMode::Quiet => {
                self.state = FeedState::Samples(self.build_samples()?);
            }
            CycleMode::Raise => {
                debug!("explicit reset; restarting epoch");
                self.state = FeedState::Batches(self.build_batches()?);
            }
            CycleMode::No => {}
        }
        Ok(())
    }

    /// Build the state for a fresh epoch per the configured cycle mode.
    fn build_epoch(&mut self) -> Result<FeedState> {
        Ok(match self.options.cycle {
            CycleMode::Quiet => FeedState::Samples(self.build_samples()?),
            CycleMode::Raise | CycleMode::No => FeedState::Batches(self.build_batches()?),
        })
    }

    /// Compose source → shuffle → pad for one epoch.
    fn build_sample_chain(&mut self) -> Result<SampleStream> {
        let mut stream: SampleStream = Box::new(ShardSampleSource::new(
            self.decoder.clone(),
            self.shards.clone(),
            self.fields.clone(),
        ));
        if self.options.random_shuffle {
            let epoch_seed = self.shuffle_rng.next_u64();
            stream = Box::new(ShuffleBuffer::new(
                stream,
                self.options.initial_fill,
                epoch_seed,
            )?);
        }
        if self.options.pad_last_batch {
            stream = Box::new(BatchPadder::new(stream, self.options.batch_size)?);
        }
        Ok(stream)
    }

    fn build_samples(&mut self) -> Result<SampleStream> {
        let stream = self.build_sample_chain()?;
        if self.options.read_ahead {
            Ok(Box::new(ReadAhead::drain(stream)?))
        } else {
            Ok(stream)
        }
    }

    fn build_batches(&mut self) -> Result<BatchStream> {
        let stream = self.build_sample_chain()?;
        let batches: BatchStream =
            Box::new(BatchCollector::new(stream, self.options.batch_size)?);
        if self.options.read_ahead {
            Ok(Box::new(ReadAhead::drain(batches)?))
        } else {
            Ok(batches)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ShardEntry;
    use std::collections::HashMap;
    use std::path::Path;

    /// Mock decoder over in-memory shards
    struct MemoryShards {
        shards: HashMap<PathBuf, Vec<ShardEntry>>,
    }

    impl MemoryShards {
        fn new() -> Self {
            Self {
                shards: HashMap::new(),
            }
        }

        fn add_shard(&mut self, path: impl Into<PathBuf>, entries: Vec<ShardEntry>) {
            self.shards.insert(path.into(), entries);
        }
    }

    impl ShardDecoder for MemoryShards {
        fn open(
            &self,
            shard: &Path,
        ) -> Result<Box<dyn Iterator<Item = Result<ShardEntry>> + Send>> {
            let entries = self
                .shards
                .get(shard)
                .ok_or_else(|| FeedError::shard_read(shard, "not found"))?
                .clone();
            Ok(Box::new(entries.into_iter().map(Ok)))
        }
    }

    /// Three shards of 5, 5, and 2 image+label pairs, keys 0000..0011
    fn twelve_pairs() -> (Arc<MemoryShards>, Vec<PathBuf>) {
        let mut decoder = MemoryShards::new();
        let mut key = 0usize;
        for (shard, count) in [("a.tar", 5usize), ("b.tar", 5), ("c.tar", 2)] {
            let mut entries = Vec::new();
            for _ in 0..count {
                entries.push(ShardEntry::new(
                    format!("{key:04}.jpg"),
                    format!("img{key}").into_bytes(),
                ));
                entries.push(ShardEntry::new(
                    format!("{key:04}.cls"),
                    format!("{key}").into_bytes(),
                ));
                key += 1;
            }
            decoder.add_shard(shard, entries);
        }
        (
            Arc::new(decoder),
            ["a.tar", "b.tar", "c.tar"].iter().map(PathBuf::from).collect(),
        )
    }

    fn options(cycle: CycleMode, batch_size: usize) -> FeedOptions {
        FeedOptions {
            fields: vec!["jpg".to_string(), "cls".to_string()],
            batch_size,
            cycle,
            ..Default::default()
        }
    }

    fn expected_keys() -> Vec<String> {
        (0..12).map(|i| format!("{i:04}")).collect()
    }

    fn drain_epoch(feed: &mut Feed) -> Vec<Batch> {
        let mut batches = Vec::new();
        while let Some(batch) = feed.next_batch().unwrap() {
            batches.push(batch);
        }
        batches
    }

    #[test]
    fn test_identity_law() {
        // No shuffle, no padding: output equals the literal concatenation of
        // shard contents in shard-list order.
        let (decoder, shards) = twelve_pairs();
        let mut feed =
            read_webdataset(decoder, shards, options(CycleMode::Raise, 4)).unwrap();

        let batches = drain_epoch(&mut feed);
        let keys: Vec<String> = batches.iter().flat_map(|b| b.keys.clone()).collect();
        assert_eq!(keys, expected_keys());
    }

    #[test]
    fn test_raise_batches_of_four_then_signal() {
        let (decoder, shards) = twelve_pairs();
        let mut feed =
            read_webdataset(decoder, shards, options(CycleMode::Raise, 4)).unwrap();

        let sizes: Vec<usize> = drain_epoch(&mut feed).iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![4, 4, 4]);

        // The signal repeats until reset
        assert!(feed.next_batch().unwrap().is_none());
        assert!(feed.next_batch().unwrap().is_none());

        feed.reset().unwrap();
        let sizes: Vec<usize> = drain_epoch(&mut feed).iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![4, 4, 4]);
    }

    #[test]
    fn test_short_final_batch_without_padding() {
        let (decoder, shards) = twelve_pairs();
        let mut feed =
            read_webdataset(decoder, shards, options(CycleMode::Raise, 5)).unwrap();

        let sizes: Vec<usize> = drain_epoch(&mut feed).iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
    }

    #[test]
    fn test_padded_final_batch() {
        let (decoder, shards) = twelve_pairs();
        let mut opts = options(CycleMode::Raise, 5);
        opts.pad_last_batch = true;
        let mut feed = read_webdataset(decoder, shards, opts).unwrap();

        let batches = drain_epoch(&mut feed);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![5, 5, 5]);

        // The tail is three repeats of sample #12
        let last = &batches[2];
        assert_eq!(last.keys, vec!["0010", "0011", "0011", "0011", "0011"]);
        assert_eq!(last.fields[1][2], b"11".to_vec());
        assert_eq!(last.fields[1][4], b"11".to_vec());
    }

    #[test]
    fn test_no_mode_is_single_epoch() {
        let (decoder, shards) = twelve_pairs();
        let mut feed = read_webdataset(decoder, shards, options(CycleMode::No, 5)).unwrap();

        assert_eq!(drain_epoch(&mut feed).len(), 3);
        assert!(feed.next_batch().unwrap().is_none());

        // Reset does not revive a no-mode feed
        feed.reset().unwrap();
        assert!(feed.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_quiet_mode_wraps_around() {
        let (decoder, shards) = twelve_pairs();
        let mut feed =
            read_webdataset(decoder, shards, options(CycleMode::Quiet, 1)).unwrap();

        let mut keys = Vec::new();
        for _ in 0..29 {
            keys.push(feed.next_sample().unwrap().key);
        }

        // Sample N equals sample (N mod 12) of a restarted epoch
        let expected = expected_keys();
        for (n, key) in keys.iter().enumerate() {
            assert_eq!(key, &expected[n % 12], "sample {n}");
        }
    }

    #[test]
    fn test_quiet_mode_rejects_empty_dataset() {
        let mut decoder = MemoryShards::new();
        decoder.add_shard("a.tar", vec![]);
        let mut feed = read_webdataset(
            Arc::new(decoder),
            vec![PathBuf::from("a.tar")],
            options(CycleMode::Quiet, 1),
        )
        .unwrap();

        let err = feed.next_sample().unwrap_err();
        assert!(matches!(err, FeedError::Config { .. }));
    }

    #[test]
    fn test_wrong_pull_method_for_mode() {
        let (decoder, shards) = twelve_pairs();
        let mut quiet =
            read_webdataset(decoder.clone(), shards.clone(), options(CycleMode::Quiet, 1))
                .unwrap();
        assert!(matches!(
            quiet.next_batch(),
            Err(FeedError::Config { .. })
        ));

        let mut raise =
            read_webdataset(decoder, shards, options(CycleMode::Raise, 4)).unwrap();
        assert!(matches!(
            raise.next_sample(),
            Err(FeedError::Config { .. })
        ));
    }

    #[test]
    fn test_shuffled_feed_preserves_multiset() {
        let (decoder, shards) = twelve_pairs();
        let mut opts = options(CycleMode::Raise, 4);
        opts.random_shuffle = true;
        opts.initial_fill = 4;
        opts.seed = 7;
        let mut feed = read_webdataset(decoder, shards, opts).unwrap();

        let mut keys: Vec<String> = drain_epoch(&mut feed)
            .iter()
            .flat_map(|b| b.keys.clone())
            .collect();
        keys.sort();
        assert_eq!(keys, expected_keys());
    }

    #[test]
    fn test_shuffled_epochs_differ_but_runs_agree() {
        let epoch_keys = |seed: u64| -> Vec<Vec<String>> {
            let (decoder, shards) = twelve_pairs();
            let mut opts = options(CycleMode::Raise, 4);
            opts.random_shuffle = true;
            opts.initial_fill = 8;
            opts.seed = seed;
            let mut feed = read_webdataset(decoder, shards, opts).unwrap();

            let mut epochs = Vec::new();
            for _ in 0..2 {
                let keys = drain_epoch(&mut feed)
                    .iter()
                    .flat_map(|b| b.keys.clone())
                    .collect();
                epochs.push(keys);
                feed.reset().unwrap();
            }
            epochs
        };

        let run_a = epoch_keys(3);
        let run_b = epoch_keys(3);

        // Reproducible across runs, epoch for epoch
        assert_eq!(run_a, run_b);
        // The generator carries across epochs, so they reshuffle differently
        assert_ne!(run_a[0], run_a[1]);
    }

    #[test]
    fn test_unshuffled_output_ignores_seed() {
        let (decoder, shards) = twelve_pairs();
        let mut opts = options(CycleMode::Raise, 4);
        opts.seed = 1234;
        let mut feed = read_webdataset(decoder, shards, opts).unwrap();

        let keys: Vec<String> = drain_epoch(&mut feed)
            .iter()
            .flat_map(|b| b.keys.clone())
            .collect();
        assert_eq!(keys, expected_keys());
    }

    #[test]
    fn test_streaming_shard_error_surfaces_at_first_access() {
        let (decoder, _) = twelve_pairs();
        let shards = vec![PathBuf::from("a.tar"), PathBuf::from("missing.tar")];
        let mut feed =
            read_webdataset(decoder, shards, options(CycleMode::Raise, 5)).unwrap();

        // The first batch comes entirely from the readable shard
        assert!(feed.next_batch().unwrap().is_some());

        let err = feed.next_batch().unwrap_err();
        assert!(matches!(err, FeedError::ShardRead { .. }));

        // Fatal: the feed stays exhausted, reset does not revive it
        assert!(feed.next_batch().unwrap().is_none());
        feed.reset().unwrap();
        assert!(feed.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_read_ahead_fails_at_construction() {
        let (decoder, _) = twelve_pairs();
        let shards = vec![PathBuf::from("a.tar"), PathBuf::from("missing.tar")];
        let mut opts = options(CycleMode::Raise, 5);
        opts.read_ahead = true;

        let err = read_webdataset(decoder, shards, opts).unwrap_err();
        assert!(matches!(err, FeedError::ShardRead { .. }));
    }

    #[test]
    fn test_read_ahead_replays_identically() {
        let run = |read_ahead: bool| -> Vec<Vec<String>> {
            let (decoder, shards) = twelve_pairs();
            let mut opts = options(CycleMode::Raise, 4);
            opts.read_ahead = read_ahead;
            let mut feed = read_webdataset(decoder, shards, opts).unwrap();
            drain_epoch(&mut feed).iter().map(|b| b.keys.clone()).collect()
        };

        assert_eq!(run(false), run(true));
    }

    #[test]
    fn test_feed_debug_is_opaque() {
        // Trait-object fields format opaquely; Debug must still exist so
        // Result<Feed> assertions work in consumer tests.
        let (decoder, shards) = twelve_pairs();
        let feed = read_webdataset(decoder, shards, options(CycleMode::Raise, 4)).unwrap();

        let rendered = format!("{feed:?}");
        assert!(rendered.contains("num_shards: 3"));
        assert!(rendered.contains("arity: 2"));
    }

    #[test]
    fn test_invalid_options_rejected() {
        let (decoder, shards) = twelve_pairs();

        let mut opts = options(CycleMode::Raise, 0);
        let err = read_webdataset(decoder.clone(), shards.clone(), opts.clone()).unwrap_err();
        assert!(matches!(err, FeedError::Config { .. }));

        opts = options(CycleMode::Quiet, 1);
        opts.random_shuffle = true;
        opts.initial_fill = 0;
        assert!(read_webdataset(decoder, shards, opts).is_err());
    }
}
