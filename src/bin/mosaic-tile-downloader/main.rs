mod args;
mod validators;

use anyhow::{bail, Context, Result};
use args::{Area, Args};
use indicatif::{ProgressBar, ProgressStyle};
use mosaic_tile_downloader::{CancellationToken, Downloader, ProviderRegistry};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();

    if args.dry_run {
        let tile_count = args.area.tile_box()?.len();

        eprintln!(
            "would download {} tiles (approx {}, assuming 10 kb per tile)",
            tile_count,
            pretty_bytes::converter::convert((tile_count as f64) * 10_000f64)
        );

        return Ok(());
    }

    let registry = match &args.providers {
        Some(path) => ProviderRegistry::from_json_file(path)
            .with_context(|| format!("failed loading providers from {}", path.display()))?,
        None => ProviderRegistry::default(),
    };

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:60.cyan/blue} {pos:>7}/{len:7} ETA: {eta} {msg}")
            .progress_chars("##-"),
    );

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing tiles in flight");
            on_ctrl_c.cancel();
        }
    });

    let downloader = Downloader::with_http(registry, args.config)
        .context("failed creating HTTP client")?
        .with_progress(pb)
        .with_cancellation(cancel);

    let report = match &args.area {
        Area::Geo { geo, zoom } => downloader.process_geo_box(geo, *zoom, &args.output).await?,
        Area::Tiles(tile_box) => downloader.process_tile_box(tile_box, &args.output).await?,
    };

    for failed in &report.failed {
        error!(
            tile = %failed.tile,
            attempts = failed.attempts,
            error = %failed.error,
            "failed fetching tile"
        );
    }

    eprintln!(
        "{} downloaded ({}), {} already present, {} failed, {} not attempted",
        report.downloaded,
        pretty_bytes::converter::convert(report.bytes as f64),
        report.skipped,
        report.failed_count(),
        report.cancelled.len(),
    );

    if !report.cancelled.is_empty() {
        bail!("cancelled before all tiles were fetched");
    }
    if !report.failed.is_empty() {
        bail!("failed fetching {} tiles", report.failed_count());
    }

    Ok(())
}
