//! MBTiles archive backend.
//!
//! MBTiles is a SQLite file with a `metadata(name, value)` table and a
//! `tiles(zoom_level, tile_column, tile_row, tile_data)` table or view. Rows
//! are stored in the TMS scheme and flipped to XYZ as they are read.

use crate::error::{ArchiveError, ArchiveResult};
use crate::traits::{
    ArchiveBatch, ArchiveCursor, ArchiveMetadata, ArchiveTile, ArchiveTotals, TileArchive,
};
use async_trait::async_trait;
use mapvault_core::{MAX_ZOOM, TileCoord, TileJson, TilesetFormat};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Read-only MBTiles reader.
pub struct MbtilesArchive {
    pool: Pool<Sqlite>,
    path: PathBuf,
    metadata: ArchiveMetadata,
}

impl MbtilesArchive {
    /// Open and validate an archive.
    ///
    /// Fails with [`ArchiveError::Missing`] when the file does not exist,
    /// [`ArchiveError::Unreadable`] when it is not an MBTiles database, and
    /// [`ArchiveError::InvalidMetadata`] or [`ArchiveError::UnsupportedFormat`]
    /// when required metadata is absent or wrong.
    pub async fn open(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ArchiveError::Missing(path.to_path_buf()));
        }
        let path = path
            .canonicalize()
            .map_err(|e| ArchiveError::Unreadable(format!("{}: {e}", path.display())))?;

        let opts = SqliteConnectOptions::new()
            .filename(&path)
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| ArchiveError::Unreadable(e.to_string()))?;

        let metadata = match load_metadata(&pool, &path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                pool.close().await;
                return Err(e);
            }
        };

        debug!(
            path = %path.display(),
            identity = %metadata.identity,
            format = %metadata.format,
            "Opened MBTiles archive"
        );

        Ok(Self {
            pool,
            path,
            metadata,
        })
    }

    /// Canonical path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TileArchive for MbtilesArchive {
    fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    async fn totals(&self) -> ArchiveResult<ArchiveTotals> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS tiles, COALESCE(SUM(LENGTH(tile_data)), 0) AS bytes FROM tiles",
        )
        .fetch_one(&self.pool)
        .await?;
        let tiles: i64 = row.try_get("tiles")?;
        let bytes: i64 = row.try_get("bytes")?;
        Ok(ArchiveTotals {
            tiles: tiles.max(0) as u64,
            bytes: bytes.max(0) as u64,
        })
    }

    async fn read_batch(
        &self,
        after: Option<ArchiveCursor>,
        limit: u32,
    ) -> ArchiveResult<ArchiveBatch> {
        // (-1, -1, -1) sorts before every real row.
        let after = after.unwrap_or(ArchiveCursor {
            zoom: -1,
            column: -1,
            row: -1,
        });

        let rows = sqlx::query(
            r#"
            SELECT zoom_level, tile_column, tile_row, tile_data
            FROM tiles
            WHERE (zoom_level, tile_column, tile_row) > (?, ?, ?)
            ORDER BY zoom_level, tile_column, tile_row
            LIMIT ?
            "#,
        )
        .bind(after.zoom)
        .bind(after.column)
        .bind(after.row)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut tiles = Vec::with_capacity(rows.len());
        let mut last = None;
        for row in &rows {
            let cursor = ArchiveCursor {
                zoom: row.try_get("zoom_level")?,
                column: row.try_get("tile_column")?,
                row: row.try_get("tile_row")?,
            };
            let data: Vec<u8> = row.try_get("tile_data")?;
            tiles.push(ArchiveTile {
                coord: tms_to_xyz(cursor)?,
                data,
            });
            last = Some(cursor);
        }

        let next = if rows.len() as u64 == u64::from(limit) {
            last
        } else {
            None
        };
        Ok(ArchiveBatch { tiles, next })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Convert a stored TMS row into an XYZ coordinate.
fn tms_to_xyz(cursor: ArchiveCursor) -> ArchiveResult<TileCoord> {
    let out_of_range = || {
        ArchiveError::Unreadable(format!(
            "tile {}/{}/{} is outside the tile grid",
            cursor.zoom, cursor.column, cursor.row
        ))
    };
    let zoom = u8::try_from(cursor.zoom)
        .ok()
        .filter(|z| *z <= MAX_ZOOM)
        .ok_or_else(out_of_range)?;
    let column = u32::try_from(cursor.column).map_err(|_| out_of_range())?;
    let row = u32::try_from(cursor.row).map_err(|_| out_of_range())?;
    // Validate the TMS row in range, then flip it.
    let tms = TileCoord::new(zoom, column, row).map_err(|_| out_of_range())?;
    TileCoord::new(zoom, column, tms.flipped_y()).map_err(|_| out_of_range())
}

async fn load_metadata(pool: &Pool<Sqlite>, path: &Path) -> ArchiveResult<ArchiveMetadata> {
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name IN ('metadata', 'tiles')",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| ArchiveError::Unreadable(e.to_string()))?;

    if !tables.iter().any(|t| t == "tiles") {
        return Err(ArchiveError::Unreadable(
            "archive has no tiles table".to_string(),
        ));
    }
    if !tables.iter().any(|t| t == "metadata") {
        return Err(ArchiveError::InvalidMetadata(
            "archive has no metadata table".to_string(),
        ));
    }

    let rows = sqlx::query("SELECT name, value FROM metadata")
        .fetch_all(pool)
        .await
        .map_err(|e| ArchiveError::Unreadable(e.to_string()))?;

    let mut entries = HashMap::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("name")?;
        let value: Option<String> = row.try_get("value")?;
        if let Some(value) = value {
            entries.insert(name, value);
        }
    }

    let mut metadata = parse_metadata(&entries, path)?;

    // Fall back to the zoom range actually present when metadata omits it.
    if metadata.tilejson.minzoom.is_none() || metadata.tilejson.maxzoom.is_none() {
        let row = sqlx::query("SELECT MIN(zoom_level) AS minz, MAX(zoom_level) AS maxz FROM tiles")
            .fetch_one(pool)
            .await?;
        let minz: Option<i64> = row.try_get("minz")?;
        let maxz: Option<i64> = row.try_get("maxz")?;
        let tilejson = &mut metadata.tilejson;
        tilejson.minzoom = tilejson
            .minzoom
            .or_else(|| minz.and_then(|z| u8::try_from(z).ok()));
        tilejson.maxzoom = tilejson
            .maxzoom
            .or_else(|| maxz.and_then(|z| u8::try_from(z).ok()));
    }

    Ok(metadata)
}

/// Validate metadata rows and build the archive's TileJSON.
pub(crate) fn parse_metadata(
    entries: &HashMap<String, String>,
    path: &Path,
) -> ArchiveResult<ArchiveMetadata> {
    let required = |key: &str| {
        entries
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ArchiveError::InvalidMetadata(format!("missing required '{key}'")))
    };

    let name = required("name")?;
    let format = TilesetFormat::parse(required("format")?)
        .map_err(|e| ArchiveError::UnsupportedFormat(e.to_string()))?;
    let bounds = parse_floats(required("bounds")?, 4, "bounds")?;

    let mut tilejson = TileJson::new(name, format);
    tilejson.bounds = Some(bounds);
    tilejson.description = entries.get("description").cloned();
    tilejson.attribution = entries.get("attribution").cloned();
    tilejson.minzoom = optional_zoom(entries, "minzoom")?;
    tilejson.maxzoom = optional_zoom(entries, "maxzoom")?;
    if let Some(center) = entries.get("center") {
        tilejson.center = Some(parse_floats(center, 3, "center")?);
    }

    if format == TilesetFormat::Pbf {
        let json = required("json")?;
        let doc: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ArchiveError::InvalidMetadata(format!("'json' is not valid JSON: {e}")))?;
        match doc.get("vector_layers") {
            Some(layers @ serde_json::Value::Array(_)) => {
                tilejson.vector_layers = Some(layers.clone());
            }
            _ => {
                return Err(ArchiveError::InvalidMetadata(
                    "'json' must contain a vector_layers array".to_string(),
                ));
            }
        }
    }

    let identity = match entries.get("id").map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(id) => id.to_string(),
        None => format!("mbtiles://{}", path.display()),
    };

    Ok(ArchiveMetadata {
        identity,
        format,
        tilejson,
    })
}

fn parse_floats(value: &str, expected: usize, key: &str) -> ArchiveResult<Vec<f64>> {
    let parsed: Result<Vec<f64>, _> = value.split(',').map(|v| v.trim().parse::<f64>()).collect();
    match parsed {
        Ok(values) if values.len() == expected => Ok(values),
        _ => Err(ArchiveError::InvalidMetadata(format!(
            "'{key}' must be {expected} comma-separated numbers, got '{value}'"
        ))),
    }
}

fn optional_zoom(entries: &HashMap<String, String>, key: &str) -> ArchiveResult<Option<u8>> {
    match entries.get(key) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|z| *z <= MAX_ZOOM)
            .map(Some)
            .ok_or_else(|| ArchiveError::InvalidMetadata(format!("'{key}' is not a zoom: '{v}'"))),
    }
}
