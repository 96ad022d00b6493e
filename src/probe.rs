use std::{io, path::Path};

use tokio::fs;
use tracing::warn;

/// What has to happen to a tile's file before the tile counts as cached.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProbeDecision {
    /// A non-empty file is present.
    Skip,
    /// Nothing usable is present.
    Fetch,
    /// A zero-byte file is present; it has to be removed and fetched again.
    Replace,
}

/// Inspects `path` to decide whether its tile needs to be downloaded.
///
/// Errors other than "not found" are treated like a missing file so that a
/// tile is rather downloaded twice than silently left out.
pub async fn probe(path: &Path) -> ProbeDecision {
    match fs::metadata(path).await {
        Ok(meta) if !meta.is_file() => ProbeDecision::Fetch,
        Ok(meta) if meta.len() == 0 => ProbeDecision::Replace,
        Ok(_) => ProbeDecision::Skip,
        Err(e) if e.kind() == io::ErrorKind::NotFound => ProbeDecision::Fetch,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed inspecting cached tile, fetching it again");
            ProbeDecision::Fetch
        }
    }
}
