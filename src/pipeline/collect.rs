// src/pipeline/collect.rs

use crate::error::{FeedError, Result};
use crate::source::{Sample, SampleStream};

/// A fixed-size group of samples, transposed into per-field columns.
///
/// Arity matches the sample arity; each column holds one payload per sample,
/// in upstream order. Concatenating the columns of consecutive batches
/// reproduces the upstream per-field sample order exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Sample keys in batch order.
    pub keys: Vec<String>,
    /// One column per field, each of length `len()`.
    pub fields: Vec<Vec<Vec<u8>>>,
}

impl Batch {
    /// Number of samples in this batch.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of fields.
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    fn from_samples(samples: Vec<Sample>) -> Self {
        let arity = samples.first().map_or(0, Sample::arity);
        let mut keys = Vec::with_capacity(samples.len());
        let mut fields: Vec<Vec<Vec<u8>>> =
            (0..arity).map(|_| Vec::with_capacity(samples.len())).collect();
        for sample in samples {
            keys.push(sample.key);
            for (column, payload) in fields.iter_mut().zip(sample.fields) {
                column.push(payload);
            }
        }
        Self { keys, fields }
    }
}

/// A fallible, fused stream of batches.
pub type BatchStream = Box<dyn Iterator<Item = Result<Batch>> + Send>;

/// Groups a flat sample stream into fixed-size batches.
///
/// The final batch may be short when upstream length is not a multiple of
/// `batch_size`; an empty trailing group emits nothing.
pub struct BatchCollector {
    upstream: SampleStream,
    batch_size: usize,
    done: bool,
}

impl BatchCollector {
    /// # Errors
    ///
    /// Returns a configuration error if `batch_size` is zero.
    pub fn new(upstream: SampleStream, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(FeedError::config("batch_size must be greater than 0"));
        }
        Ok(Self {
            upstream,
            batch_size,
            done: false,
        })
    }
}

impl Iterator for BatchCollector {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut group = Vec::with_capacity(self.batch_size);
        loop {
            match self.upstream.next() {
                Some(Ok(sample)) => {
                    group.push(sample);
                    if group.len() == self.batch_size {
                        return Some(Ok(Batch::from_samples(group)));
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    if group.is_empty() {
                        return None;
                    }
                    return Some(Ok(Batch::from_samples(group)));
                }
            }
        }
    }
}
