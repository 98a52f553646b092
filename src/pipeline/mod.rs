// src/pipeline/mod.rs

//! Stream-transformation stages.
//!
//! Each stage wraps an upstream sample stream and is itself a fallible, fused
//! iterator; stages hold no knowledge of what runs downstream of them. The
//! feed entry point composes them in a fixed order: shuffle, pad, collect,
//! read-ahead.

mod collect;
mod materialize;
mod pad;
mod shuffle;

pub use collect::{Batch, BatchCollector, BatchStream};
pub use materialize::{ReadAhead, ReadAheadHandle};
pub use pad::BatchPadder;
pub use shuffle::ShuffleBuffer;
