// src/source/iterator.rs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::Result;

use super::traits::{FieldSelector, Sample, ShardDecoder, ShardEntry};

/// A group of adjacent entries sharing one sample key, still being assembled.
struct Group {
    key: String,
    slots: Vec<Option<Vec<u8>>>,
}

/// A lazy, finite, non-restartable stream of samples over an ordered shard list.
///
/// Shards are read strictly in list order and, within a shard, in archive
/// order. Adjacent entries with the same key form a sample group; a group is
/// emitted only when every requested field selector matched at least one of
/// its entries, and skipped silently otherwise. Groups never span shards.
pub struct ShardSampleSource {
    decoder: Arc<dyn ShardDecoder>,
    remaining: std::vec::IntoIter<PathBuf>,
    fields: Arc<Vec<FieldSelector>>,
    current: Option<Box<dyn Iterator<Item = Result<ShardEntry>> + Send>>,
    group: Option<Group>,
    exhausted: bool,
}

impl ShardSampleSource {
    pub fn new(
        decoder: Arc<dyn ShardDecoder>,
        shards: Vec<PathBuf>,
        fields: Arc<Vec<FieldSelector>>,
    ) -> Self {
        Self {
            decoder,
            remaining: shards.into_iter(),
            fields,
            current: None,
            group: None,
            exhausted: false,
        }
    }

    /// Read the next sample from the shard sequence.
    ///
    /// Returns `Ok(Some(sample))` if a complete group was assembled,
    /// `Ok(None)` once the final shard's final sample has been emitted, or an
    /// error if a shard cannot be read. Errors are fatal: the stream stays
    /// exhausted afterwards.
    pub fn next_sample(&mut self) -> Result<Option<Sample>> {
        loop {
            if self.exhausted {
                return Ok(None);
            }

            if let Some(entries) = self.current.as_mut() {
                match entries.next() {
                    Some(Ok(entry)) => {
                        if let Some(sample) = self.absorb(entry) {
                            return Ok(Some(sample));
                        }
                    }
                    Some(Err(e)) => {
                        self.exhausted = true;
                        return Err(e);
                    }
                    None => {
                        // Shard finished; a group never spans shards.
                        self.current = None;
                        if let Some(sample) = self.finish_group() {
                            return Ok(Some(sample));
                        }
                    }
                }
            } else {
                match self.remaining.next() {
                    Some(path) => {
                        debug!(shard = %path.display(), "opening shard");
                        match self.decoder.open(&path) {
                            Ok(entries) => self.current = Some(entries),
                            Err(e) => {
                                self.exhausted = true;
                                return Err(e);
                            }
                        }
                    }
                    None => {
                        self.exhausted = true;
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Fold one entry into the current group, returning the previous group's
    /// sample if this entry started a new key and the previous group was
    /// complete.
    fn absorb(&mut self, entry: ShardEntry) -> Option<Sample> {
        let (key, extension) = {
            let (k, e) = entry.split_name();
            (k.to_string(), e.to_string())
        };

        let finished = match &self.group {
            Some(group) if group.key != key => self.finish_group(),
            _ => None,
        };

        let arity = self.fields.len();
        let group = self.group.get_or_insert_with(|| Group {
            key,
            slots: vec![None; arity],
        });

        // First matching entry wins per field; an entry fills at most one slot.
        for (i, selector) in self.fields.iter().enumerate() {
            if group.slots[i].is_none() && selector.matches(&extension) {
                group.slots[i] = Some(entry.data);
                break;
            }
        }

        finished
    }

    /// Finalize the pending group: emit it if every field matched, otherwise
    /// skip it. Missing fields are a filter, not an error.
    fn finish_group(&mut self) -> Option<Sample> {
        let group = self.group.take()?;
        if group.slots.iter().all(Option::is_some) {
            Some(Sample {
                key: group.key,
                fields: group.slots.into_iter().map(Option::unwrap).collect(),
            })
        } else {
            trace!(key = %group.key, "skipping sample group with missing fields");
            None
        }
    }
}

impl Iterator for ShardSampleSource {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_sample() {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
