//! On-disk placement of tiles: `<root>/<name>/<z>/<x>/<y>.<suffix>`.

use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use rand::Rng;
use tokio::fs;

use crate::error::TileError;
use crate::tile::Tile;

/// Computes the path of a tile below `root`.
///
/// Distinct `(name, z, x, y, suffix)` tuples always map to distinct paths
/// as long as `name` and `suffix` contain no path separators.
pub fn tile_path(root: &Path, name: &str, z: u8, x: u32, y: u32, suffix: &str) -> PathBuf {
    let mut path = root.join(name);
    path.push(z.to_string());
    path.push(x.to_string());
    path.push(format!("{}.{}", y, suffix));
    path
}

/// The directory tree for one output mosaic.
///
/// Remembers which `<z>/<x>` directories it already created so every
/// directory is only created once per run.
#[derive(Debug)]
pub struct TileLayout {
    root: PathBuf,
    name: String,
    suffix: String,
    created: Mutex<HashSet<PathBuf>>,
}

impl TileLayout {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            suffix: suffix.into(),
            created: Mutex::new(HashSet::new()),
        }
    }

    /// Directory holding all zoom levels of this mosaic.
    pub fn mosaic_dir(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    pub fn path(&self, tile: &Tile) -> PathBuf {
        tile_path(&self.root, &self.name, tile.z, tile.x, tile.y, &self.suffix)
    }

    /// Returns the path of `tile`, creating its parent directories first.
    pub async fn ensure_dir(&self, tile: &Tile) -> Result<PathBuf, TileError> {
        let path = self.path(tile);
        let dir = match path.parent() {
            Some(dir) => dir.to_path_buf(),
            None => return Ok(path),
        };

        if self.is_known(&dir) {
            return Ok(path);
        }

        create_dir_all(&dir).await?;
        self.created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(dir);

        Ok(path)
    }

    fn is_known(&self, dir: &Path) -> bool {
        self.created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(dir)
    }
}

/// Creates `dir` and all of its ancestors. Another task creating the same
/// directory concurrently is not an error.
pub async fn create_dir_all(dir: &Path) -> Result<(), TileError> {
    let source = match fs::create_dir_all(dir).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    if source.kind() == io::ErrorKind::AlreadyExists && is_dir(dir).await {
        return Ok(());
    }

    Err(TileError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

/// Writes `bytes` to `path` so that readers either see the old state or
/// the complete new file, never a partial one.
///
/// The data goes to a hidden temporary file in the same directory first,
/// which is then renamed over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TileError> {
    let tmp = temp_path(path);
    let write_err = |source| TileError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Err(e) = fs::write(&tmp, bytes).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(write_err(e));
    }

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(write_err(e));
    }

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let nonce: u32 = rand::thread_rng().gen();

    path.with_file_name(format!(".{}.{:08x}.part", file_name, nonce))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_layout() {
        let path = tile_path(Path::new("tiles"), "mosaic", 2, 1, 3, "png");
        assert_eq!(path, Path::new("tiles/mosaic/2/1/3.png"));
    }

    #[test]
    fn path_is_injective() {
        let root = Path::new("tiles");
        let a = tile_path(root, "mosaic", 1, 12, 3, "png");
        let b = tile_path(root, "mosaic", 11, 2, 3, "png");
        let c = tile_path(root, "mosaic", 1, 1, 23, "png");
        let d = tile_path(root, "mosaic", 1, 12, 3, "jpg");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn temp_file_is_a_sibling() {
        let path = Path::new("tiles/mosaic/2/1/3.png");
        let tmp = temp_path(path);
        assert_eq!(tmp.parent(), path.parent());
        assert_ne!(tmp, path);
    }

    #[tokio::test]
    async fn ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TileLayout::new(dir.path(), "mosaic", "png");
        let tile = Tile::new(1, 2, 3);

        let first = layout.ensure_dir(&tile).await.unwrap();
        let second = layout.ensure_dir(&tile).await.unwrap();

        assert_eq!(first, second);
        assert!(dir.path().join("mosaic/3/1").is_dir());
    }

    #[tokio::test]
    async fn concurrent_dir_creation() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c/d");

        let results = futures::future::join_all((0..8).map(|_| create_dir_all(&target))).await;

        assert!(results.iter().all(Result::is_ok));
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn file_in_place_of_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("3");
        std::fs::write(&target, b"not a directory").unwrap();

        let err = create_dir_all(&target).await.unwrap_err();
        assert!(matches!(err, TileError::CreateDir { .. }));
    }

    #[tokio::test]
    async fn atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.png");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn atomic_write_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing/1.png");

        let err = write_atomic(&path, b"data").await.unwrap_err();
        assert!(matches!(err, TileError::Write { .. }));
        assert!(!err.is_retryable());
    }
}
