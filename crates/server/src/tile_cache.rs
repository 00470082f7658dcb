//! Tile read path with stale-while-revalidate.
//!
//! A cache hit is answered from the store immediately and, when enabled, a
//! detached task asks the origin whether the tile changed. A miss blocks on the
//! origin and writes the result through [`ContentStore`]. Failures of the
//! background refresh are logged at debug level and otherwise ignored; the
//! stored bytes stay authoritative until a refresh succeeds.

use crate::content::ContentStore;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::upstream::{FetchOutcome, UpstreamClient, UpstreamError, upstream_url_for};
use bytes::Bytes;
use dashmap::DashMap;
use mapvault_core::{TileContent, TileCoord};
use mapvault_metadata::MetadataStore;
use std::sync::Arc;

/// A tile ready to be written to a response.
#[derive(Debug, Clone)]
pub struct ServedTile {
    pub data: Bytes,
    pub etag: Option<String>,
    pub content: TileContent,
}

impl ServedTile {
    fn new(data: Bytes, etag: Option<String>) -> Self {
        let content = TileContent::sniff(&data);
        Self {
            data,
            etag,
            content,
        }
    }
}

type InFlightKey = (String, String);

/// Removes an in-flight marker when the refresh task ends, even by panic.
struct InFlightGuard {
    in_flight: Arc<DashMap<InFlightKey, ()>>,
    key: InFlightKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

/// Read-through tile cache.
#[derive(Clone)]
pub struct TileCache {
    metadata: Arc<dyn MetadataStore>,
    content: ContentStore,
    upstream: UpstreamClient,
    revalidate_on_hit: bool,
    in_flight: Arc<DashMap<InFlightKey, ()>>,
}

impl TileCache {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        content: ContentStore,
        upstream: UpstreamClient,
        revalidate_on_hit: bool,
    ) -> Self {
        Self {
            metadata,
            content,
            upstream,
            revalidate_on_hit,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Resolve a tile from the cache, falling back to the origin on a miss.
    ///
    /// Unknown tilesets, tilesets without an upstream, and every upstream
    /// failure surface as [`ApiError::NotFound`].
    pub async fn get_tile(&self, tileset_id: &str, coord: TileCoord) -> ApiResult<ServedTile> {
        let tileset = self
            .metadata
            .get_tileset(tileset_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("tileset {tileset_id}")))?;

        if let Some(cached) = self.content.get_tile(tileset_id, &coord).await? {
            metrics::record_tile_request("hit");
            if self.revalidate_on_hit
                && let Some(url) = upstream_url_for(&tileset, &coord)
            {
                self.spawn_revalidation(tileset_id, coord, url, cached.etag.clone());
            }
            return Ok(ServedTile::new(Bytes::from(cached.data), cached.etag));
        }

        let not_found = || ApiError::NotFound(format!("tile {coord} in tileset {tileset_id}"));

        let Some(url) = upstream_url_for(&tileset, &coord) else {
            metrics::record_tile_request("not_found");
            return Err(not_found());
        };

        match self.upstream.fetch(&url, None).await {
            Ok(FetchOutcome::Fresh { data, etag }) => {
                // The caller still gets the bytes if they cannot be cached, e.g.
                // when the tileset is deleted while the fetch is in flight.
                if let Err(e) = self
                    .content
                    .put_tile(tileset_id, &coord, &data, etag.as_deref())
                    .await
                {
                    tracing::warn!(
                        tileset_id = %tileset_id,
                        tile = %coord,
                        error = %e,
                        "Failed to cache fetched tile"
                    );
                }
                metrics::record_tile_request("miss_fetched");
                Ok(ServedTile::new(data, etag))
            }
            Ok(FetchOutcome::NotModified) => {
                // No validator was sent, so there is nothing to reuse.
                metrics::record_tile_request("not_found");
                Err(not_found())
            }
            Err(e) => {
                match &e {
                    UpstreamError::Offline(_) => {
                        tracing::warn!(tileset_id = %tileset_id, tile = %coord, error = %e, "Upstream offline");
                    }
                    UpstreamError::Rejected { .. } => {
                        tracing::debug!(tileset_id = %tileset_id, tile = %coord, error = %e, "Upstream rejected tile");
                    }
                }
                metrics::record_tile_request("not_found");
                Err(not_found())
            }
        }
    }

    /// Start a background refresh unless one is already running for this tile.
    fn spawn_revalidation(
        &self,
        tileset_id: &str,
        coord: TileCoord,
        url: String,
        etag: Option<String>,
    ) {
        let key = (tileset_id.to_string(), coord.quad_key());
        if self.in_flight.insert(key.clone(), ()).is_some() {
            metrics::REVALIDATIONS_COALESCED.inc();
            return;
        }
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            key,
        };

        let this = self.clone();
        let tileset_id = tileset_id.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = this.revalidate(&tileset_id, coord, &url, etag.as_deref()).await {
                tracing::debug!(tileset_id = %tileset_id, tile = %coord, error = %e, "Background revalidation failed");
            }
        });
    }

    async fn revalidate(
        &self,
        tileset_id: &str,
        coord: TileCoord,
        url: &str,
        etag: Option<&str>,
    ) -> ApiResult<()> {
        match self.upstream.fetch(url, etag).await {
            Ok(FetchOutcome::Fresh { data, etag }) => {
                self.content
                    .put_tile(tileset_id, &coord, &data, etag.as_deref())
                    .await?;
                tracing::debug!(tileset_id = %tileset_id, tile = %coord, "Tile refreshed from upstream");
                Ok(())
            }
            Ok(FetchOutcome::NotModified) => Ok(()),
            Err(e) => Err(ApiError::Internal(e.to_string())),
        }
    }

    /// Number of refreshes currently running.
    pub fn revalidations_in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
