//! Download a rectangle of map tiles to your disk, laid out as
//! `<root>/<name>/<z>/<x>/<y>.<suffix>` so they can be stitched into a mosaic.
//!
//! **Use with caution.** Downloading tiles en-masse can hog down a tile
//! server easily. Respect the usage policy of the provider you fetch from.
//!
//! Tiles that already exist with a non-zero size are skipped, so an
//! interrupted run can simply be started again. Empty files left behind by
//! earlier failures are replaced.
//!
//! # CLI Example
//!
//! ```bash
//! mosaic-tile-downloader bbox \
//!   --north 50.811 \
//!   --west 6.031 \
//!   --south 50.7492 \
//!   --east 6.1649 \
//!   --zoom 15 \
//!   --suffix png \
//!   --name aachen
//! ```
//!
//! # Library Example
//! ```rust,no_run
//! use mosaic_tile_downloader::{DownloadConfig, Downloader, OutputSpec, ProviderRegistry, TileBox};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let downloader = Downloader::with_http(ProviderRegistry::default(), DownloadConfig::default())?;
//!
//! let report = downloader
//!     .process_tile_box(&TileBox::new(0, 1, 0, 1, 2), &OutputSpec::new("png"))
//!     .await?;
//!
//! assert!(report.is_complete());
//! # Ok(())
//! # }
//! ```

mod bounding_box;
mod client;
mod config;
mod download;
mod error;
mod layout;
mod probe;
mod provider;
mod tile;
mod url;

pub use bounding_box::{geo_box_to_tile_box, Fixture, GeoBox, TileBox};
pub use client::{FetchClient, HttpTransport, Transport, TransportResponse};
pub use config::DownloadConfig;
pub use download::{
    Backoff, DownloadReport, Downloader, FailedTile, JobState, OutputSpec, DEFAULT_OUTPUT_NAME,
};
pub use error::{ConfigError, TileError};
pub use layout::{tile_path, write_atomic, TileLayout};
pub use probe::{probe, ProbeDecision};
pub use provider::{Provider, ProviderRegistry, DEFAULT_MAP_TYPE};
pub use tile::{lat_lng_to_tile, tile_count_per_axis, Tile, MAX_ZOOM};
pub use url::{format_template, UrlFormat};

/// Re-exported so callers can cancel a run without depending on
/// `tokio-util` themselves.
pub use tokio_util::sync::CancellationToken;
