// src/lib.rs

//! Streaming sample-pipeline composer for sharded archive datasets.
//!
//! This crate turns an ordered list of sharded archives into a pull-driven
//! stream of samples or fixed-size batches for a downstream training
//! pipeline: shard traversal, bounded-memory shuffling, last-batch padding,
//! batch collection, optional eager read-ahead, and three end-of-epoch
//! disciplines. Archive decoding itself lives behind the [`ShardDecoder`]
//! trait; payloads cross every boundary as raw named byte blobs.

pub mod config;
pub mod error;
pub mod source;

// Re-export commonly used types for convenience
pub use config::{CycleMode, FeedOptions, DEFAULT_IMAGE_FIELD};
pub use error::{FeedError, Result};
pub use source::{FieldSelector, Sample, SampleStream, ShardDecoder, ShardEntry, ShardSampleSource};

pub mod pipeline;
pub use pipeline::{Batch, BatchCollector, BatchPadder, BatchStream, ReadAhead, ShuffleBuffer};

pub mod feed;
pub use feed::{read_webdataset, Feed};
