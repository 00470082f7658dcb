//! Tile and tile data repository.

use crate::error::MetadataResult;
use crate::models::CachedTileRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// A tile write: one coordinate slot and the bytes it should point at.
#[derive(Debug, Clone, Copy)]
pub struct TileWrite<'a> {
    pub tileset_id: &'a str,
    pub quad_key: &'a str,
    /// Deduplication scope the bytes are stored under.
    pub data_scope: &'a str,
    /// Hex digest of `data`.
    pub tile_hash: &'a str,
    pub data: &'a [u8],
    pub etag: Option<&'a str>,
    pub written_at: OffsetDateTime,
}

/// Result of a tile write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileWriteOutcome {
    /// False when the bytes were already stored in this scope.
    pub data_inserted: bool,
    /// True when the bytes the tile pointed at before were dropped.
    pub data_released: bool,
}

/// Repository for tile operations.
#[async_trait]
pub trait TileRepo: Send + Sync {
    /// Read a tile and its bytes.
    async fn get_tile(
        &self,
        tileset_id: &str,
        quad_key: &str,
    ) -> MetadataResult<Option<CachedTileRow>>;

    /// Store bytes (deduplicated by digest) and point the tile slot at them.
    /// Both rows are written in one transaction; last writer wins. Data the
    /// tile previously pointed at is deleted in the same transaction once
    /// nothing references it.
    async fn put_tile(&self, write: &TileWrite<'_>) -> MetadataResult<TileWriteOutcome>;

    /// Count tile rows of a tileset.
    async fn count_tiles(&self, tileset_id: &str) -> MetadataResult<u64>;

    /// Count stored tile data rows across all scopes.
    async fn count_tile_data(&self) -> MetadataResult<u64>;

    /// Sum of distinct tile data bytes referenced by a tileset.
    async fn tileset_bytes_stored(&self, tileset_id: &str) -> MetadataResult<u64>;

    /// Delete up to `limit` tile data rows no tile references.
    /// Returns the number of rows removed.
    async fn reclaim_unreferenced_tile_data(&self, limit: u32) -> MetadataResult<u64>;
}
