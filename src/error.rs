use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

/// Errors that abort a run before any tile is requested.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown map type `{0}`")]
    UnknownMapType(String),

    #[error("a file suffix (e.g. `png`) is required")]
    MissingSuffix,

    #[error("invalid file suffix `{0}`: must not contain path separators")]
    InvalidSuffix(String),

    #[error("invalid output name `{0}`: must be non-empty and must not contain path separators")]
    InvalidName(String),

    #[error("malformed tile box: {0}")]
    MalformedTileBox(String),

    #[error("zoom level {zoom} is out of range (max {max})")]
    ZoomOutOfRange { zoom: u8, max: u8 },

    #[error("bounding box crosses the antimeridian (west {west}° > east {east}°), which is not supported")]
    AntimeridianSpan { west: f64, east: f64 },

    #[error("invalid URL template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("map type `{0}` has no shards configured")]
    NoShards(String),

    #[error("at least one worker lane is required")]
    NoWorkers,

    #[error("failed loading provider configuration from {path}")]
    ProviderFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed parsing provider configuration")]
    ProviderJson(#[from] serde_json::Error),
}

/// Errors affecting a single tile. These are retried according to
/// [`TileError::is_retryable`] and end up in the download report.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {status}")]
    BadStatus {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("server answered with an empty body")]
    EmptyBody,

    #[error("failed creating directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed removing corrupt tile {path}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed writing tile to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed formatting tile URL: {0}")]
    Template(String),
}

impl TileError {
    /// Whether another attempt at the same tile could succeed.
    ///
    /// Write failures happen after the directory exists, so they point at
    /// a problem retrying will not fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            TileError::Transport(_)
            | TileError::BadStatus { .. }
            | TileError::EmptyBody
            | TileError::CreateDir { .. }
            | TileError::Remove { .. } => true,
            TileError::Write { .. } | TileError::Template(_) => false,
        }
    }

    /// Minimum delay the server asked for before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TileError::BadStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
