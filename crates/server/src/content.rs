//! Content-addressed tile writes shared by the read path and imports.

use crate::metrics;
use mapvault_core::config::DedupScope;
use mapvault_core::{ContentHash, TileCoord};
use mapvault_metadata::models::CachedTileRow;
use mapvault_metadata::repos::{TileWrite, TileWriteOutcome};
use mapvault_metadata::{MetadataResult, MetadataStore};
use std::sync::Arc;
use time::OffsetDateTime;

/// Tile bytes addressed by digest, with per-coordinate mappings.
#[derive(Clone)]
pub struct ContentStore {
    metadata: Arc<dyn MetadataStore>,
    dedup_scope: DedupScope,
}

impl ContentStore {
    pub fn new(metadata: Arc<dyn MetadataStore>, dedup_scope: DedupScope) -> Self {
        Self {
            metadata,
            dedup_scope,
        }
    }

    /// Read the bytes and validator stored for a coordinate.
    pub async fn get_tile(
        &self,
        tileset_id: &str,
        coord: &TileCoord,
    ) -> MetadataResult<Option<CachedTileRow>> {
        self.metadata.get_tile(tileset_id, &coord.quad_key()).await
    }

    /// Store `data` for a coordinate, reusing existing bytes with the same digest.
    ///
    /// The data row and the tile mapping are written in one transaction.
    pub async fn put_tile(
        &self,
        tileset_id: &str,
        coord: &TileCoord,
        data: &[u8],
        etag: Option<&str>,
    ) -> MetadataResult<TileWriteOutcome> {
        let tile_hash = ContentHash::compute(data).to_hex();
        let quad_key = coord.quad_key();
        let outcome = self
            .metadata
            .put_tile(&TileWrite {
                tileset_id,
                quad_key: &quad_key,
                data_scope: self.dedup_scope.scope_key(tileset_id),
                tile_hash: &tile_hash,
                data,
                etag,
                written_at: OffsetDateTime::now_utc(),
            })
            .await?;

        if !outcome.data_inserted {
            metrics::TILE_DATA_DEDUPLICATED.inc();
        }
        if outcome.data_released {
            metrics::TILE_DATA_RECLAIMED.inc();
        }
        Ok(outcome)
    }
}

/// Remove unreferenced tile data in the background, one bounded batch at a time.
pub fn spawn_reclaim(metadata: Arc<dyn MetadataStore>, batch_size: u32) {
    tokio::spawn(async move {
        let mut total = 0u64;
        loop {
            match metadata.reclaim_unreferenced_tile_data(batch_size).await {
                Ok(removed) => {
                    total += removed;
                    metrics::TILE_DATA_RECLAIMED.inc_by(removed);
                    if removed < u64::from(batch_size) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Tile data reclamation failed");
                    break;
                }
            }
        }
        if total > 0 {
            tracing::info!(rows = total, "Reclaimed unreferenced tile data");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapvault_metadata::SqliteStore;
    use mapvault_metadata::models::TilesetRow;

    async fn store(scope: DedupScope) -> (tempfile::TempDir, Arc<dyn MetadataStore>, ContentStore) {
        let temp = tempfile::tempdir().unwrap();
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(temp.path().join("m.db"), None).await.unwrap());
        for id in ["a", "b"] {
            let now = OffsetDateTime::now_utc();
            metadata
                .create_tileset(&TilesetRow {
                    tileset_id: id.to_string(),
                    name: id.to_string(),
                    format: "png".to_string(),
                    tilejson: "{}".to_string(),
                    upstream_tile_urls: None,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }
        let content = ContentStore::new(metadata.clone(), scope);
        (temp, metadata, content)
    }

    #[tokio::test]
    async fn identical_bytes_share_one_row_within_tileset() {
        let (_temp, metadata, content) = store(DedupScope::Tileset).await;
        let c1 = TileCoord::new(1, 0, 0).unwrap();
        let c2 = TileCoord::new(1, 1, 1).unwrap();

        assert!(content.put_tile("a", &c1, b"same", None).await.unwrap().data_inserted);
        assert!(!content.put_tile("a", &c2, b"same", None).await.unwrap().data_inserted);
        assert!(!content.put_tile("a", &c1, b"same", None).await.unwrap().data_inserted);
        assert_eq!(metadata.count_tile_data().await.unwrap(), 1);
        assert_eq!(metadata.count_tiles("a").await.unwrap(), 2);

        let tile = content.get_tile("a", &c2).await.unwrap().unwrap();
        assert_eq!(tile.data, b"same");
    }

    #[tokio::test]
    async fn tileset_scope_stores_copy_per_tileset() {
        let (_temp, metadata, content) = store(DedupScope::Tileset).await;
        let c = TileCoord::new(0, 0, 0).unwrap();
        content.put_tile("a", &c, b"same", None).await.unwrap();
        content.put_tile("b", &c, b"same", None).await.unwrap();
        assert_eq!(metadata.count_tile_data().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn global_scope_shares_across_tilesets() {
        let (_temp, metadata, content) = store(DedupScope::Global).await;
        let c = TileCoord::new(0, 0, 0).unwrap();
        content.put_tile("a", &c, b"same", None).await.unwrap();
        content.put_tile("b", &c, b"same", None).await.unwrap();
        assert_eq!(metadata.count_tile_data().await.unwrap(), 1);

        // Deleting one tileset must leave the shared bytes readable by the other.
        metadata.delete_tileset("a").await.unwrap();
        assert_eq!(metadata.reclaim_unreferenced_tile_data(100).await.unwrap(), 0);
        let tile = content.get_tile("b", &c).await.unwrap().unwrap();
        assert_eq!(tile.data, b"same");
    }

    #[tokio::test]
    async fn delete_then_reclaim_removes_orphaned_bytes() {
        let (_temp, metadata, content) = store(DedupScope::Tileset).await;
        let c = TileCoord::new(0, 0, 0).unwrap();
        content.put_tile("a", &c, b"one", None).await.unwrap();
        content.put_tile("b", &c, b"two", None).await.unwrap();

        assert_eq!(metadata.delete_tileset("a").await.unwrap(), 1);
        assert_eq!(metadata.count_tiles("a").await.unwrap(), 0);
        assert_eq!(metadata.reclaim_unreferenced_tile_data(100).await.unwrap(), 1);
        assert_eq!(metadata.count_tile_data().await.unwrap(), 1);
        assert!(content.get_tile("b", &c).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rewrite_keeps_bytes_shared_across_tilesets() {
        let (_temp, metadata, content) = store(DedupScope::Global).await;
        let c = TileCoord::new(0, 0, 0).unwrap();
        content.put_tile("a", &c, b"same", None).await.unwrap();
        content.put_tile("b", &c, b"same", None).await.unwrap();

        let outcome = content.put_tile("a", &c, b"changed", None).await.unwrap();
        assert!(!outcome.data_released);
        assert_eq!(content.get_tile("b", &c).await.unwrap().unwrap().data, b"same");
        assert_eq!(metadata.count_tile_data().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rewrite_with_new_bytes_repoints_tile() {
        let (_temp, metadata, content) = store(DedupScope::Tileset).await;
        let c = TileCoord::new(0, 0, 0).unwrap();
        content.put_tile("a", &c, b"old", Some("\"1\"")).await.unwrap();
        content.put_tile("a", &c, b"new", Some("\"2\"")).await.unwrap();

        let tile = content.get_tile("a", &c).await.unwrap().unwrap();
        assert_eq!(tile.data, b"new");
        assert_eq!(tile.etag.as_deref(), Some("\"2\""));
        // The old bytes go with the rewrite.
        assert_eq!(metadata.count_tile_data().await.unwrap(), 1);
        assert_eq!(metadata.reclaim_unreferenced_tile_data(100).await.unwrap(), 0);
    }
}
