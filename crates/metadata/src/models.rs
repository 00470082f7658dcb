//! Database models mapping to the metadata schema.

use mapvault_core::{ImportFailure, ImportId, ImportRecord, ImportState};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Tilesets
// =============================================================================

/// Registered tile source.
#[derive(Debug, Clone, FromRow)]
pub struct TilesetRow {
    pub tileset_id: String,
    pub name: String,
    pub format: String,
    /// Full TileJSON document as supplied by the registrant or built by an import.
    pub tilejson: String,
    /// JSON array of upstream URL templates; NULL for tilesets with no live origin.
    pub upstream_tile_urls: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TilesetRow {
    /// Decode the upstream templates column.
    pub fn upstream_templates(&self) -> Vec<String> {
        self.upstream_tile_urls
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }
}

// =============================================================================
// Tiles and tile data
// =============================================================================

/// Mapping from a coordinate slot to a content digest.
#[derive(Debug, Clone, FromRow)]
pub struct TileRow {
    pub tileset_id: String,
    pub quad_key: String,
    pub data_scope: String,
    pub tile_hash: String,
    pub etag: Option<String>,
    pub updated_at: OffsetDateTime,
}

/// A tile joined with its bytes.
#[derive(Debug, Clone, FromRow)]
pub struct CachedTileRow {
    pub tile_hash: String,
    pub etag: Option<String>,
    pub data: Vec<u8>,
}

// =============================================================================
// Imports
// =============================================================================

/// Persisted import job.
#[derive(Debug, Clone, FromRow)]
pub struct ImportRow {
    pub import_id: Uuid,
    pub tileset_id: String,
    pub state: String,
    pub error: Option<String>,
    pub started_at: OffsetDateTime,
    pub last_updated_at: Option<OffsetDateTime>,
    pub finished_at: Option<OffsetDateTime>,
    pub imported_resources: i64,
    pub total_resources: Option<i64>,
    pub imported_bytes: i64,
    pub total_bytes: Option<i64>,
}

impl From<&ImportRecord> for ImportRow {
    fn from(record: &ImportRecord) -> Self {
        Self {
            import_id: *record.id.as_uuid(),
            tileset_id: record.tileset_id.clone(),
            state: record.state.as_str().to_string(),
            error: record.error.map(|e| e.as_str().to_string()),
            started_at: record.started,
            last_updated_at: record.last_updated,
            finished_at: record.finished,
            imported_resources: record.imported_resources as i64,
            total_resources: record.total_resources.map(|n| n as i64),
            imported_bytes: record.imported_bytes as i64,
            total_bytes: record.total_bytes.map(|n| n as i64),
        }
    }
}

impl TryFrom<ImportRow> for ImportRecord {
    type Error = mapvault_core::Error;

    fn try_from(row: ImportRow) -> Result<Self, Self::Error> {
        let record = ImportRecord {
            id: ImportId::from_uuid(row.import_id),
            tileset_id: row.tileset_id,
            state: ImportState::parse(&row.state)?,
            error: row.error.as_deref().map(ImportFailure::parse).transpose()?,
            started: row.started_at,
            last_updated: row.last_updated_at,
            finished: row.finished_at,
            imported_resources: row.imported_resources.max(0) as u64,
            total_resources: row.total_resources.map(|n| n.max(0) as u64),
            imported_bytes: row.imported_bytes.max(0) as u64,
            total_bytes: row.total_bytes.map(|n| n.max(0) as u64),
        };
        record.validate()?;
        Ok(record)
    }
}

// =============================================================================
// Styles
// =============================================================================

/// Stored style document.
#[derive(Debug, Clone, FromRow)]
pub struct StyleRow {
    pub style_id: Uuid,
    pub name: String,
    /// Tileset this style was generated for, if any.
    pub tileset_id: Option<String>,
    pub style_json: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Style listing entry with the storage used by its tileset.
#[derive(Debug, Clone, FromRow)]
pub struct StyleSummaryRow {
    pub style_id: Uuid,
    pub name: String,
    pub tileset_id: Option<String>,
    pub bytes_stored: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
