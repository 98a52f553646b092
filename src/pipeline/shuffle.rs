// src/pipeline/shuffle.rs

//! Bounded-memory reservoir-style shuffling.
//!
//! The buffer holds at most `capacity` samples. After an initial fill phase it
//! repeatedly swaps the next upstream sample into a uniformly random slot and
//! emits the displaced sample; when upstream exhausts, the occupied slots are
//! permuted once and drained. This is an approximate streaming shuffle, not a
//! uniform permutation of the whole stream: buffer occupancy determines the
//! shuffling radius.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::{FeedError, Result};
use crate::source::{Sample, SampleStream};

enum Phase {
    /// Pulling upstream samples until the slot vector holds `capacity`.
    Filling,
    /// Swap-and-emit against a full slot vector.
    Steady,
    /// Upstream exhausted; emitting the final permutation.
    Draining(std::vec::IntoIter<Sample>),
}

pub struct ShuffleBuffer {
    upstream: SampleStream,
    slots: Vec<Sample>,
    rng: StdRng,
    capacity: usize,
    phase: Phase,
    failed: bool,
}

impl ShuffleBuffer {
    /// Wrap `upstream` with a shuffle buffer of the given capacity, seeding
    /// the generator once.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `capacity` is zero.
    pub fn new(upstream: SampleStream, capacity: usize, seed: u64) -> Result<Self> {
        if capacity == 0 {
            return Err(FeedError::config(
                "shuffle buffer capacity must be greater than 0",
            ));
        }
        Ok(Self {
            upstream,
            slots: Vec::with_capacity(capacity),
            rng: StdRng::seed_from_u64(seed),
            capacity,
            phase: Phase::Filling,
            failed: false,
        })
    }

    /// Shuffle exactly the currently-occupied slots and switch to draining.
    fn start_drain(&mut self) {
        let mut slots = std::mem::take(&mut self.slots);
        slots.shuffle(&mut self.rng);
        self.phase = Phase::Draining(slots.into_iter());
    }
}

impl Iterator for ShuffleBuffer {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if let Phase::Filling = self.phase {
            while self.slots.len() < self.capacity {
                match self.upstream.next() {
                    Some(Ok(sample)) => self.slots.push(sample),
                    Some(Err(e)) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                    None => {
                        self.start_drain();
                        break;
                    }
                }
            }
            if let Phase::Filling = self.phase {
                self.phase = Phase::Steady;
            }
        }

        match &mut self.phase {
            Phase::Steady => match self.upstream.next() {
                Some(Ok(mut sample)) => {
                    let idx = self.rng.random_range(0..self.capacity);
                    std::mem::swap(&mut self.slots[idx], &mut sample);
                    Some(Ok(sample))
                }
                Some(Err(e)) => {
                    self.failed = true;
                    Some(Err(e))
                }
                None => {
                    self.start_drain();
                    match &mut self.phase {
                        Phase::Draining(drain) => drain.next().map(Ok),
                        _ => unreachable!(),
                    }
                }
            },
            Phase::Draining(drain) => drain.next().map(Ok),
            Phase::Filling => unreachable!(),
        }
    }
}
