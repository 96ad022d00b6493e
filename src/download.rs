//! Downloading whole tile rectangles with a pool of worker lanes.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::future::join_all;
use indicatif::ProgressBar;
use tokio::{
    fs,
    time::{sleep, sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, trace, warn, Instrument};

use crate::bounding_box::{GeoBox, TileBox};
use crate::client::{FetchClient, HttpTransport, Transport};
use crate::config::DownloadConfig;
use crate::error::{ConfigError, TileError};
use crate::layout::TileLayout;
use crate::probe::{probe, ProbeDecision};
use crate::provider::{Provider, ProviderRegistry, DEFAULT_MAP_TYPE};
use crate::tile::Tile;

/// Output name used when the caller doesn't pick one.
pub const DEFAULT_OUTPUT_NAME: &str = "mosaic";

/// Exponential delay between attempts on the same tile: `base` after the
/// first failure, doubling with every further failure, never above `max`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Delay to wait after the `failures`-th failed attempt (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exp)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(8),
        }
    }
}

/// Where downloaded tiles end up and which provider they come from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub map_type: String,
    pub suffix: String,
}

impl OutputSpec {
    /// Output named `mosaic` using the default map type.
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_OUTPUT_NAME.to_owned(),
            map_type: DEFAULT_MAP_TYPE.to_owned(),
            suffix: suffix.into(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn map_type(mut self, map_type: impl Into<String>) -> Self {
        self.map_type = map_type.into();
        self
    }

    /// The suffix without a leading dot.
    fn normalized_suffix(&self) -> Result<&str, ConfigError> {
        let suffix = self.suffix.trim_start_matches('.');
        if suffix.is_empty() {
            return Err(ConfigError::MissingSuffix);
        }
        if has_separator(suffix) {
            return Err(ConfigError::InvalidSuffix(self.suffix.clone()));
        }

        Ok(suffix)
    }

    fn validate_name(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() || self.name == "." || self.name == ".." || has_separator(&self.name)
        {
            return Err(ConfigError::InvalidName(self.name.clone()));
        }

        Ok(())
    }
}

fn has_separator(s: &str) -> bool {
    s.contains('/') || s.contains('\\')
}

/// Lifecycle of a single tile within a run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JobState {
    Pending,
    Probing,
    Skipped,
    Fetching { attempt: u32 },
    Done,
    Failed { attempt: u32 },
    Cancelled,
}

impl JobState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_advance(self, next: JobState) -> bool {
        use JobState::*;

        match (self, next) {
            (Pending, Probing) => true,
            (Probing, Skipped) | (Probing, Fetching { attempt: 1 }) => true,
            (Fetching { .. }, Done) => true,
            (Fetching { attempt: a }, Failed { attempt: b }) => a == b,
            (Failed { attempt: a }, Fetching { attempt: b }) => b == a + 1,
            (Probing, Cancelled) | (Failed { .. }, Cancelled) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Skipped | JobState::Done | JobState::Failed { .. } | JobState::Cancelled
        )
    }
}

/// One tile's unit of work, owned by exactly one lane.
#[derive(Debug)]
struct TileJob {
    tile: Tile,
    path: PathBuf,
    state: JobState,
}

impl TileJob {
    fn new(tile: Tile, path: PathBuf) -> Self {
        Self {
            tile,
            path,
            state: JobState::Pending,
        }
    }

    fn advance(&mut self, next: JobState) {
        debug_assert!(
            self.state.can_advance(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!(from = ?self.state, to = ?next, "tile state");
        self.state = next;
    }
}

#[derive(Debug)]
enum TileOutcome {
    Skipped,
    Downloaded {
        bytes: u64,
        replaced: bool,
        attempts: u32,
    },
    Failed {
        error: TileError,
        attempts: u32,
    },
    Cancelled {
        attempts: u32,
    },
}

/// A tile that could not be downloaded.
#[derive(Debug)]
pub struct FailedTile {
    pub tile: Tile,
    /// Amount of requests made for this tile.
    pub attempts: u32,
    /// The error of the last attempt.
    pub error: TileError,
}

/// Aggregate result of a run.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Amount of tiles in the requested box.
    pub total: usize,
    /// Tiles that were already cached.
    pub skipped: usize,
    /// Tiles that were fetched and stored.
    pub downloaded: usize,
    /// Of the downloaded tiles, how many replaced a corrupt (empty) file.
    pub replaced: usize,
    /// Bytes written to disk.
    pub bytes: u64,
    /// Requests issued in total, retries included.
    pub requests: usize,
    /// Tiles that failed for good, sorted by coordinate.
    pub failed: Vec<FailedTile>,
    /// Tiles that were never finished because the run was cancelled,
    /// sorted by coordinate.
    pub cancelled: Vec<Tile>,
}

impl DownloadReport {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Whether every tile of the box is now on disk.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    fn record(&mut self, tile: Tile, outcome: TileOutcome) {
        match outcome {
            TileOutcome::Skipped => self.skipped += 1,
            TileOutcome::Downloaded {
                bytes,
                replaced,
                attempts,
            } => {
                self.downloaded += 1;
                self.bytes += bytes;
                self.requests += attempts as usize;
                if replaced {
                    self.replaced += 1;
                }
            }
            TileOutcome::Failed { error, attempts } => {
                self.requests += attempts as usize;
                self.failed.push(FailedTile {
                    tile,
                    attempts,
                    error,
                });
            }
            TileOutcome::Cancelled { attempts } => {
                self.requests += attempts as usize;
                self.cancelled.push(tile);
            }
        }
    }

    fn sort(&mut self) {
        self.failed.sort_by_key(|failed| failed.tile);
        self.cancelled.sort();
    }
}

/// Keeps request starts on one lane at least `delay` apart.
struct Pacer {
    delay: Duration,
    last_start: Option<Instant>,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_start: None,
        }
    }

    /// Waits until the next request may start. Returns `false` if the run
    /// got cancelled in the meantime.
    async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        if let Some(last) = self.last_start {
            let ready = tokio::select! {
                _ = sleep_until(last + self.delay) => true,
                _ = cancel.cancelled() => false,
            };
            if !ready {
                return false;
            }
        }

        self.last_start = Some(Instant::now());
        true
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}

async fn remove_corrupt(path: &Path) -> Result<(), TileError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(TileError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Downloads rectangles of tiles into a `<root>/<name>/<z>/<x>/<y>.<suffix>`
/// tree, skipping tiles that are already there.
///
/// # Example
/// ```rust,no_run
/// use mosaic_tile_downloader::{DownloadConfig, Downloader, GeoBox, OutputSpec, ProviderRegistry};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let downloader = Downloader::with_http(ProviderRegistry::default(), DownloadConfig::default())?;
///
/// let aachen = GeoBox::new(50.811, 6.031, 50.7492, 6.1649);
/// let report = downloader
///     .process_geo_box(&aachen, 14, &OutputSpec::new("png").name("aachen"))
///     .await?;
///
/// println!("{} downloaded, {} failed", report.downloaded, report.failed_count());
/// # Ok(())
/// # }
/// ```
pub struct Downloader {
    registry: ProviderRegistry,
    client: FetchClient,
    config: DownloadConfig,
    progress: ProgressBar,
    cancel: CancellationToken,
}

impl Downloader {
    pub fn new(
        registry: ProviderRegistry,
        transport: Arc<dyn Transport>,
        config: DownloadConfig,
    ) -> Self {
        Self {
            registry,
            client: FetchClient::new(transport, config.timeout),
            config,
            progress: ProgressBar::hidden(),
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a downloader talking HTTP via `reqwest`.
    pub fn with_http(
        registry: ProviderRegistry,
        config: DownloadConfig,
    ) -> Result<Self, reqwest::Error> {
        let transport = HttpTransport::new(config.timeout)?;
        Ok(Self::new(registry, Arc::new(transport), config))
    }

    /// Reports progress, one tick per finished tile, on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Stops dispatching tiles once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Downloads every tile covering the geographic box at `zoom`.
    ///
    /// Boxes crossing the antimeridian (`west > east`) are rejected. A box
    /// whose north edge lies south of its south edge covers no tiles.
    pub async fn process_geo_box(
        &self,
        geo: &GeoBox,
        zoom: u8,
        output: &OutputSpec,
    ) -> Result<DownloadReport, ConfigError> {
        let tile_box = geo.to_tile_box(zoom)?;
        let (provider, layout) = self.prepare(output)?;
        if tile_box.is_empty() {
            warn!(?geo, "bounding box covers no tiles");
        }

        Ok(self.run(&tile_box, provider, &layout).await)
    }

    /// Downloads every tile in the inclusive tile rectangle.
    pub async fn process_tile_box(
        &self,
        tile_box: &TileBox,
        output: &OutputSpec,
    ) -> Result<DownloadReport, ConfigError> {
        tile_box.validate()?;
        let (provider, layout) = self.prepare(output)?;

        Ok(self.run(tile_box, provider, &layout).await)
    }

    fn prepare(&self, output: &OutputSpec) -> Result<(&Provider, TileLayout), ConfigError> {
        self.config.validate()?;
        output.validate_name()?;
        let suffix = output.normalized_suffix()?;
        let provider = self.registry.get(&output.map_type)?;

        let layout = TileLayout::new(&self.config.root, &output.name, suffix);
        Ok((provider, layout))
    }

    async fn run(&self, tile_box: &TileBox, provider: &Provider, layout: &TileLayout) -> DownloadReport {
        let total = tile_box.len();
        let mut report = DownloadReport {
            total,
            ..DownloadReport::default()
        };
        if total == 0 {
            return report;
        }

        let lanes = self.config.workers.min(total);
        info!(
            total,
            lanes,
            zoom = tile_box.zoom,
            provider = provider.name(),
            output = %layout.mosaic_dir().display(),
            "downloading tiles"
        );

        self.progress.set_length(total as u64);

        let queue = Mutex::new(tile_box.tiles());
        let outcomes = join_all((0..lanes).map(|lane| {
            self.lane(&queue, provider, layout)
                .instrument(debug_span!("lane", lane))
        }))
        .await;

        for (tile, outcome) in outcomes.into_iter().flatten() {
            report.record(tile, outcome);
        }

        // whatever is left in the queue was never dispatched
        let remaining = queue.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        report.cancelled.extend(remaining);
        report.sort();

        self.progress.finish_and_clear();

        info!(
            skipped = report.skipped,
            downloaded = report.downloaded,
            replaced = report.replaced,
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            bytes = report.bytes,
            "finished downloading tiles"
        );

        report
    }

    async fn lane<I>(
        &self,
        queue: &Mutex<I>,
        provider: &Provider,
        layout: &TileLayout,
    ) -> Vec<(Tile, TileOutcome)>
    where
        I: Iterator<Item = Tile>,
    {
        let mut pacer = Pacer::new(self.config.request_delay);
        let mut outcomes = Vec::new();

        while !self.cancel.is_cancelled() {
            // the lock is released before anything is awaited
            let next = queue
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .next();
            let tile = match next {
                Some(tile) => tile,
                None => break,
            };

            let span = debug_span!("tile", z = tile.z, x = tile.x, y = tile.y);
            let outcome = self
                .process_tile(tile, provider, layout, &mut pacer)
                .instrument(span)
                .await;

            self.progress.inc(1);
            outcomes.push((tile, outcome));
        }

        outcomes
    }

    async fn process_tile(
        &self,
        tile: Tile,
        provider: &Provider,
        layout: &TileLayout,
        pacer: &mut Pacer,
    ) -> TileOutcome {
        let mut job = TileJob::new(tile, layout.path(&tile));

        job.advance(JobState::Probing);
        let replaced = match probe(&job.path).await {
            ProbeDecision::Skip => {
                debug!("tile already cached");
                job.advance(JobState::Skipped);
                return TileOutcome::Skipped;
            }
            ProbeDecision::Fetch => false,
            ProbeDecision::Replace => {
                debug!(path = %job.path.display(), "replacing empty tile file");
                true
            }
        };

        let mut corrupt = replaced;
        let mut attempt = 0;
        loop {
            if !pacer.wait(&self.cancel).await {
                job.advance(JobState::Cancelled);
                return TileOutcome::Cancelled { attempts: attempt };
            }

            attempt += 1;
            job.advance(JobState::Fetching { attempt });

            match self.attempt(&job, provider, layout, &mut corrupt).await {
                Ok(bytes) => {
                    job.advance(JobState::Done);
                    debug!(bytes, attempt, "downloaded tile");
                    return TileOutcome::Downloaded {
                        bytes,
                        replaced,
                        attempts: attempt,
                    };
                }
                Err(error) => {
                    job.advance(JobState::Failed { attempt });

                    if !error.is_retryable() || attempt > self.config.retries {
                        warn!(%error, attempt, "giving up on tile");
                        return TileOutcome::Failed {
                            error,
                            attempts: attempt,
                        };
                    }

                    let delay = self
                        .config
                        .backoff
                        .delay(attempt)
                        .max(error.retry_after().unwrap_or_default());
                    warn!(%error, attempt, ?delay, "tile attempt failed, retrying");

                    if !sleep_or_cancel(delay, &self.cancel).await {
                        job.advance(JobState::Cancelled);
                        return TileOutcome::Cancelled { attempts: attempt };
                    }
                }
            }
        }
    }

    async fn attempt(
        &self,
        job: &TileJob,
        provider: &Provider,
        layout: &TileLayout,
        corrupt: &mut bool,
    ) -> Result<u64, TileError> {
        let path = layout.ensure_dir(&job.tile).await?;

        if *corrupt {
            remove_corrupt(&path).await?;
            *corrupt = false;
        }

        self.client.fetch_to(&job.tile, provider, &path).await
    }
}
