//! Tileset repository.

use crate::error::MetadataResult;
use crate::models::TilesetRow;
use async_trait::async_trait;

/// Repository for tileset operations.
#[async_trait]
pub trait TilesetRepo: Send + Sync {
    /// Create a tileset. Fails with `AlreadyExists` if the id is taken.
    async fn create_tileset(&self, tileset: &TilesetRow) -> MetadataResult<()>;

    /// Create or replace a tileset, keeping its original `created_at`.
    async fn upsert_tileset(&self, tileset: &TilesetRow) -> MetadataResult<()>;

    /// Get a tileset by id.
    async fn get_tileset(&self, tileset_id: &str) -> MetadataResult<Option<TilesetRow>>;

    /// List all tilesets ordered by name.
    async fn list_tilesets(&self) -> MetadataResult<Vec<TilesetRow>>;

    /// Replace a tileset's document. Fails with `NotFound` if absent.
    async fn update_tileset(&self, tileset: &TilesetRow) -> MetadataResult<()>;

    /// Delete a tileset and its tiles. Returns the number of tiles removed.
    ///
    /// Tile data left unreferenced is not removed here; see
    /// `TileRepo::reclaim_unreferenced_tile_data`.
    async fn delete_tileset(&self, tileset_id: &str) -> MetadataResult<u64>;
}
