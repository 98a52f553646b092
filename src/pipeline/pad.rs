// src/pipeline/pad.rs

use crate::error::{FeedError, Result};
use crate::source::{Sample, SampleStream};

/// Pads the epoch tail up to a full batch.
///
/// Samples pass through unchanged while their position is counted modulo
/// `batch_size`; when upstream exhausts mid-batch, the last real sample is
/// repeated until the count reaches the next multiple of `batch_size`. An
/// empty upstream emits nothing, since no sample exists to repeat.
pub struct BatchPadder {
    upstream: SampleStream,
    batch_size: usize,
    /// Position of the next sample within its batch.
    position: usize,
    last: Option<Sample>,
    pad_remaining: usize,
    done: bool,
}

impl BatchPadder {
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
            position: 0,
            last: None,
            pad_remaining: 0,
            done: false,
        })
    }
}

impl Iterator for BatchPadder {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pad_remaining > 0 {
            self.pad_remaining -= 1;
            return self.last.clone().map(Ok);
        }
        if self.done {
            return None;
        }

        match self.upstream.next() {
            Some(Ok(sample)) => {
                self.position = (self.position + 1) % self.batch_size;
                self.last = Some(sample.clone());
                Some(Ok(sample))
            }
            Some(Err(e)) => {
                // Fatal: no padding after an aborted stream
                self.done = true;
                Some(Err(e))
            }
            None => {
                self.done = true;
                if self.position == 0 || self.last.is_none() {
                    return None;
                }
                self.pad_remaining = self.batch_size - self.position - 1;
                self.last.clone().map(Ok)
            }
        }
    }
}
