//! Tile archive readers for mapvault imports.
//!
//! This crate provides:
//! - A read-only [`TileArchive`] abstraction with keyset-paginated batches
//! - The MBTiles backend (SQLite, TMS rows flipped to XYZ on read)

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::mbtiles::MbtilesArchive;
pub use error::{ArchiveError, ArchiveResult};
pub use traits::{
    ArchiveBatch, ArchiveCursor, ArchiveMetadata, ArchiveTile, ArchiveTotals, TileArchive,
};

use std::path::Path;
use std::sync::Arc;

/// Open the archive at `path`.
pub async fn open(path: impl AsRef<Path>) -> ArchiveResult<Arc<dyn TileArchive>> {
    let archive = MbtilesArchive::open(path).await?;
    Ok(Arc::new(archive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_missing_file_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nope.mbtiles");
        let err = open(&path).await.err().unwrap();
        assert!(matches!(err, ArchiveError::Missing(p) if p == path));
    }

    #[tokio::test]
    async fn open_garbage_file_is_unreadable() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("garbage.mbtiles");
        std::fs::write(&path, b"this is not a sqlite database at all").unwrap();
        let err = open(&path).await.err().unwrap();
        assert!(matches!(err, ArchiveError::Unreadable(_)), "{err:?}");
    }
}
