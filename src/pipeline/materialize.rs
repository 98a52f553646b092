// src/pipeline/materialize.rs

//! Eager read-ahead materialization.
//!
//! Draining consumes the entire composed stream into memory before the
//! consumer pulls anything; consumption then replays the drained sequence.
//! The drain may also run on a background thread, but its result becomes
//! visible only once the full pass has completed.

use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::error::Result;

/// A fully materialized stream, replayed in drain order.
pub struct ReadAhead<T> {
    items: std::vec::IntoIter<T>,
}

impl<T> ReadAhead<T> {
    /// Eagerly consume `stream` to its end.
    ///
    /// # Errors
    ///
    /// Any failure during the pass is returned here, not deferred to the
    /// first pull; nothing is materialized in that case.
    pub fn drain(stream: impl Iterator<Item = Result<T>>) -> Result<Self> {
        let items: Vec<T> = stream.collect::<Result<_>>()?;
        debug!(items = items.len(), "read-ahead pass complete");
        Ok(Self {
            items: items.into_iter(),
        })
    }

    /// Run the drain on a background thread.
    ///
    /// The handle's `wait` publishes the materialized sequence only after the
    /// full pass completes; there is no partial-read visibility.
    pub fn spawn<S>(stream: S) -> ReadAheadHandle<T>
    where
        T: Send + 'static,
        S: Iterator<Item = Result<T>> + Send + 'static,
    {
        ReadAheadHandle {
            handle: thread::spawn(move || Self::drain(stream)),
        }
    }

    /// Number of items not yet replayed.
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

impl<T> Iterator for ReadAhead<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next().map(Ok)
    }
}

/// Handle to a background read-ahead pass.
pub struct ReadAheadHandle<T> {
    handle: JoinHandle<Result<ReadAhead<T>>>,
}

impl<T> ReadAheadHandle<T> {
    /// Block until the drain finishes and publish the result.
    pub fn wait(self) -> Result<ReadAhead<T>> {
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
