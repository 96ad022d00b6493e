use std::{path::PathBuf, time::Duration};

use crate::download::Backoff;
use crate::error::ConfigError;

/// Tile downloading configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadConfig {
    /// Directory below which every mosaic gets its own folder.
    pub root: PathBuf,

    /// Number of worker lanes fetching tiles in parallel.
    pub workers: usize,

    /// Minimum delay between the starts of two requests on the same lane.
    pub request_delay: Duration,

    /// How many times a failed tile is retried after its first attempt.
    pub retries: u32,

    /// Delay schedule between attempts on the same tile.
    pub backoff: Backoff,

    /// Timeout for fetching a single tile.
    ///
    /// Pass the zero duration to disable the timeout.
    pub timeout: Duration,
}

impl DownloadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }

        Ok(())
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("tiles"),
            workers: 4,
            request_delay: Duration::from_millis(500),
            retries: 3,
            backoff: Backoff::default(),
            timeout: Duration::from_secs(30),
        }
    }
}
