// src/source/mod.rs

//! Shard traversal and sample assembly.
//!
//! This module turns an ordered list of shard locations into a lazy stream of
//! samples. Archive decoding itself lives behind the [`ShardDecoder`] trait;
//! this crate only groups the decoded entries into samples and filters them
//! against the requested field selectors.

mod iterator;
mod traits;

pub use iterator::ShardSampleSource;
pub use traits::{FieldSelector, Sample, SampleStream, ShardDecoder, ShardEntry};
