// src/source/traits.rs

use std::path::Path;

use crate::error::Result;

/// One named byte blob from inside a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardEntry {
    /// Entry name as stored in the archive, e.g. `train/0001.jpg`.
    pub name: String,
    pub data: Vec<u8>,
}

impl ShardEntry {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Split the entry name into its sample key and extension.
    ///
    /// The key is everything up to the first dot of the basename (directory
    /// components included); the extension is everything after it, so
    /// multi-part extensions like `seg.png` stay intact.
    pub fn split_name(&self) -> (&str, &str) {
        let basename_start = self.name.rfind('/').map_or(0, |i| i + 1);
        match self.name[basename_start..].find('.') {
            Some(dot) => {
                let dot = basename_start + dot;
                (&self.name[..dot], &self.name[dot + 1..])
            }
            None => (self.name.as_str(), ""),
        }
    }
}

/// Decodes a shard location into its sequence of named byte blobs.
///
/// This is the boundary to the external archive/container reader: the crate
/// never parses a container format itself. Implementations may parallelize
/// reads internally but must yield entries in archive order. An unreadable
/// shard is reported either from `open` or from the returned iterator as a
/// `ShardRead` error.
pub trait ShardDecoder: Send + Sync {
    fn open(&self, shard: &Path) -> Result<Box<dyn Iterator<Item = Result<ShardEntry>> + Send>>;
}

/// A single pipeline sample: one payload per requested field, in field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// The shared basename stem of the entries that formed this sample.
    pub key: String,
    pub fields: Vec<Vec<u8>>,
}

impl Sample {
    /// Number of fields (fixed for the lifetime of a pipeline instance).
    pub fn arity(&self) -> usize {
        self.fields.len()
    }
}

/// The seam between pipeline stages: a fallible, fused stream of samples.
pub type SampleStream = Box<dyn Iterator<Item = Result<Sample>> + Send>;

/// A named payload selector, possibly listing alternative extensions.
///
/// A selector like `"jpg;jpeg;png"` is satisfied by an entry whose extension
/// equals any of its alternatives; the first matching entry in a group wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    alternatives: Vec<String>,
}

impl FieldSelector {
    /// Parse a selector spec of `;`-separated extensions.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the spec or any alternative is empty.
    pub fn parse(spec: &str) -> Result<Self> {
        if spec.is_empty() || spec.split(';').any(str::is_empty) {
            return Err(crate::error::FeedError::config(format!(
                "invalid field selector: '{spec}'"
            )));
        }
        Ok(Self {
            alternatives: spec.split(';').map(str::to_string).collect(),
        })
    }

    /// Parse an ordered selector list, fixing sample arity.
    pub fn parse_all(specs: &[String]) -> Result<Vec<Self>> {
        if specs.is_empty() {
            return Err(crate::error::FeedError::config("fields must not be empty"));
        }
        specs.iter().map(|s| Self::parse(s)).collect()
    }

    pub fn matches(&self, extension: &str) -> bool {
        self.alternatives.iter().any(|alt| alt == extension)
    }
}
