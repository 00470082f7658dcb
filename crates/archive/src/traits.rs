//! Archive reader trait.

use crate::error::ArchiveResult;
use async_trait::async_trait;
use mapvault_core::{TileCoord, TileJson, TilesetFormat};

/// Descriptive metadata read once when an archive is opened.
#[derive(Debug, Clone)]
pub struct ArchiveMetadata {
    /// Stable identity string the tileset id is derived from.
    pub identity: String,
    pub format: TilesetFormat,
    /// TileJSON built from the archive's metadata rows. `tiles` is left empty.
    pub tilejson: TileJson,
}

/// Tile count and payload size of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveTotals {
    pub tiles: u64,
    pub bytes: u64,
}

/// Opaque resume position for [`TileArchive::read_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArchiveCursor {
    pub(crate) zoom: i64,
    pub(crate) column: i64,
    pub(crate) row: i64,
}

/// A tile read from an archive, already in XYZ addressing.
#[derive(Debug, Clone)]
pub struct ArchiveTile {
    pub coord: TileCoord,
    pub data: Vec<u8>,
}

/// One page of tiles and the cursor to continue from.
#[derive(Debug, Default)]
pub struct ArchiveBatch {
    pub tiles: Vec<ArchiveTile>,
    /// `None` once the archive is exhausted.
    pub next: Option<ArchiveCursor>,
}

impl ArchiveBatch {
    /// Sum of tile payload sizes in this batch.
    pub fn byte_len(&self) -> u64 {
        self.tiles.iter().map(|t| t.data.len() as u64).sum()
    }
}

/// Read-only access to a tile archive.
#[async_trait]
pub trait TileArchive: Send + Sync {
    /// Metadata validated at open time.
    fn metadata(&self) -> &ArchiveMetadata;

    /// Count tiles and sum their sizes.
    async fn totals(&self) -> ArchiveResult<ArchiveTotals>;

    /// Read up to `limit` tiles after `after`, in a stable order.
    async fn read_batch(
        &self,
        after: Option<ArchiveCursor>,
        limit: u32,
    ) -> ArchiveResult<ArchiveBatch>;

    /// Release the underlying handle.
    async fn close(&self);
}
