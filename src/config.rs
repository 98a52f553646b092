// src/config.rs

//! Feed configuration.
//!
//! This module provides the options accepted by [`read_webdataset`], with TOML
//! parsing, environment variable overrides, and validation of option values.
//!
//! [`read_webdataset`]: crate::read_webdataset

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{FeedError, Result};

/// Default field selector: any of the common image extensions satisfies the
/// single default field.
pub const DEFAULT_IMAGE_FIELD: &str = "jpg;jpeg;png;ppm;pgm;pnm";

/// End-of-epoch discipline exposed to the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleMode {
    /// Individual samples, epochs restart transparently, never signals.
    #[default]
    Quiet,
    /// Batches; signals end of epoch once, then waits for an explicit reset.
    Raise,
    /// Batches; signals end of epoch once, then stays exhausted forever.
    No,
}

impl FromStr for CycleMode {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "quiet" => Ok(Self::Quiet),
            "raise" => Ok(Self::Raise),
            "no" => Ok(Self::No),
            _ => Err(FeedError::config(format!(
                "unknown cycle mode: '{s}'. Expected 'quiet', 'raise', or 'no'"
            ))),
        }
    }
}

// Options accepted by the feed entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedOptions {
    /// Ordered field selectors; each may list `;`-separated alternative
    /// extensions. Fixes sample and batch arity.
    pub fields: Vec<String>,
    /// Whether to reshuffle samples through the bounded buffer.
    pub random_shuffle: bool,
    /// Shuffle buffer capacity; only meaningful when random_shuffle is set.
    pub initial_fill: usize,
    /// Seed for the shuffle buffer's generator.
    pub seed: u64,
    /// Number of samples per batch (raise/no modes and padding).
    pub batch_size: usize,
    /// Whether to repeat the last sample up to a full final batch.
    pub pad_last_batch: bool,
    /// Whether to drain the composed stream eagerly before consumption.
    pub read_ahead: bool,
    /// End-of-epoch discipline: "quiet", "raise", or "no".
    pub cycle: CycleMode,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            fields: vec![DEFAULT_IMAGE_FIELD.to_string()],
            random_shuffle: false,
            initial_fill: 1024,
            seed: 0,
            batch_size: 1,
            pad_last_batch: false,
            read_ahead: false,
            cycle: CycleMode::Quiet,
        }
    }
}

impl FromStr for FeedOptions {
    type Err = FeedError;

    /// Parse options from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| FeedError::config(format!("failed to parse TOML options: {e}")))
    }
}

impl FeedOptions {
    // Load options from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read or parsed, or if the
    // parsed options are invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FeedError::config(format!("failed to read options file '{}': {e}", path.display()))
        })?;
        let options: Self = content.parse()?;
        options.validate()?;
        Ok(options)
    }

    // Apply environment variable overrides.
    //
    // Variables are prefixed with `SHARDFEED_`:
    // - `SHARDFEED_RANDOM_SHUFFLE` overrides `random_shuffle`
    // - `SHARDFEED_INITIAL_FILL` overrides `initial_fill`
    // - `SHARDFEED_SEED` overrides `seed`
    // - `SHARDFEED_BATCH_SIZE` overrides `batch_size`
    // - `SHARDFEED_PAD_LAST_BATCH` overrides `pad_last_batch`
    // - `SHARDFEED_READ_AHEAD` overrides `read_ahead`
    // - `SHARDFEED_CYCLE` overrides `cycle`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("SHARDFEED_RANDOM_SHUFFLE") {
            if let Ok(v) = val.parse() {
                self.random_shuffle = v;
            }
        }
        if let Ok(val) = std::env::var("SHARDFEED_INITIAL_FILL") {
            if let Ok(v) = val.parse() {
                self.initial_fill = v;
            }
        }
        if let Ok(val) = std::env::var("SHARDFEED_SEED") {
            if let Ok(v) = val.parse() {
                self.seed = v;
            }
        }
        if let Ok(val) = std::env::var("SHARDFEED_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                self.batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("SHARDFEED_PAD_LAST_BATCH") {
            if let Ok(v) = val.parse() {
                self.pad_last_batch = v;
            }
        }
        if let Ok(val) = std::env::var("SHARDFEED_READ_AHEAD") {
            if let Ok(v) = val.parse() {
                self.read_ahead = v;
            }
        }
        if let Ok(val) = std::env::var("SHARDFEED_CYCLE") {
            if let Ok(v) = val.parse() {
                self.cycle = v;
            }
        }
        self
    }

    // Validate all option values.
    //
    // # Errors
    //
    // Returns an error if any option value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(FeedError::config("fields must not be empty"));
        }
        for field in &self.fields {
            if field.is_empty() || field.split(';').any(str::is_empty) {
                return Err(FeedError::config(format!(
                    "invalid field selector: '{field}'"
                )));
            }
        }

        if self.random_shuffle && self.initial_fill == 0 {
            return Err(FeedError::config(
                "initial_fill must be greater than 0 when random_shuffle is set",
            ));
        }

        // Batching only happens in raise/no modes or when padding; quiet mode
        // without padding never consults batch_size.
        let needs_batch_size = self.pad_last_batch || self.cycle != CycleMode::Quiet;
        if needs_batch_size && self.batch_size == 0 {
            return Err(FeedError::config("batch_size must be greater than 0"));
        }

        Ok(())
    }
}
