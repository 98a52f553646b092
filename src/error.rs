// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },

    #[error("Shard read error at '{shard}': {message}")]
    ShardRead {
        shard: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

pub type Result<T> = std::result::Result<T, FeedError>;

// Convenience constructors
impl FeedError {

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn shard_read(shard: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ShardRead {
            shard: shard.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn shard_read_with_source(
        shard: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::ShardRead {
            shard: shard.into(),
            message: message.into(),
            source: Some(source),
        }
    }
}
