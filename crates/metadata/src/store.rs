//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{ImportRepo, StyleRepo, TileRepo, TilesetRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: TilesetRepo + TileRepo + ImportRepo + StyleRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store, creating the file and schema if needed.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        // SQLite cannot cancel a running statement, so the timeout bounds how
        // long a caller waits for the connection instead.
        let acquire_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(600));

        let pool = SqlitePoolOptions::new()
            // One writer at a time; import batches and live tile writes queue here
            // instead of failing with "database is locked".
            .max_connections(1)
            .acquire_timeout(acquire_timeout)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            acquire_timeout_secs = acquire_timeout.as_secs(),
            "SQLite metadata store opened"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use crate::repos::{TileWrite, TileWriteOutcome};
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl TilesetRepo for SqliteStore {
        async fn create_tileset(&self, tileset: &TilesetRow) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                INSERT INTO tilesets (tileset_id, name, format, tilejson, upstream_tile_urls, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&tileset.tileset_id)
            .bind(&tileset.name)
            .bind(&tileset.format)
            .bind(&tileset.tilejson)
            .bind(&tileset.upstream_tile_urls)
            .bind(tileset.created_at)
            .bind(tileset.updated_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(e) if MetadataError::is_unique_violation(&e) => Err(
                    MetadataError::AlreadyExists(format!("tileset {}", tileset.tileset_id)),
                ),
                Err(e) => Err(e.into()),
            }
        }

        async fn upsert_tileset(&self, tileset: &TilesetRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO tilesets (tileset_id, name, format, tilejson, upstream_tile_urls, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tileset_id) DO UPDATE SET
                    name = excluded.name,
                    format = excluded.format,
                    tilejson = excluded.tilejson,
                    upstream_tile_urls = excluded.upstream_tile_urls,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&tileset.tileset_id)
            .bind(&tileset.name)
            .bind(&tileset.format)
            .bind(&tileset.tilejson)
            .bind(&tileset.upstream_tile_urls)
            .bind(tileset.created_at)
            .bind(tileset.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_tileset(&self, tileset_id: &str) -> MetadataResult<Option<TilesetRow>> {
            let row =
                sqlx::query_as::<_, TilesetRow>("SELECT * FROM tilesets WHERE tileset_id = ?")
                    .bind(tileset_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn list_tilesets(&self) -> MetadataResult<Vec<TilesetRow>> {
            let rows =
                sqlx::query_as::<_, TilesetRow>("SELECT * FROM tilesets ORDER BY name, tileset_id")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows)
        }

        async fn update_tileset(&self, tileset: &TilesetRow) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                UPDATE tilesets
                SET name = ?, format = ?, tilejson = ?, upstream_tile_urls = ?, updated_at = ?
                WHERE tileset_id = ?
                "#,
            )
            .bind(&tileset.name)
            .bind(&tileset.format)
            .bind(&tileset.tilejson)
            .bind(&tileset.upstream_tile_urls)
            .bind(tileset.updated_at)
            .bind(&tileset.tileset_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "tileset {}",
                    tileset.tileset_id
                )));
            }
            Ok(())
        }

        async fn delete_tileset(&self, tileset_id: &str) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;

            let tiles = sqlx::query("DELETE FROM tiles WHERE tileset_id = ?")
                .bind(tileset_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            let deleted = sqlx::query("DELETE FROM tilesets WHERE tileset_id = ?")
                .bind(tileset_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if deleted == 0 {
                // Dropping the transaction rolls back the tile delete.
                return Err(MetadataError::NotFound(format!("tileset {tileset_id}")));
            }

            tx.commit().await?;
            Ok(tiles)
        }
    }

    #[async_trait]
    impl TileRepo for SqliteStore {
        async fn get_tile(
            &self,
            tileset_id: &str,
            quad_key: &str,
        ) -> MetadataResult<Option<CachedTileRow>> {
            let row = sqlx::query_as::<_, CachedTileRow>(
                r#"
                SELECT t.tile_hash AS tile_hash, t.etag AS etag, d.data AS data
                FROM tiles t
                JOIN tile_data d ON d.data_scope = t.data_scope AND d.tile_hash = t.tile_hash
                WHERE t.tileset_id = ? AND t.quad_key = ?
                "#,
            )
            .bind(tileset_id)
            .bind(quad_key)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn put_tile(&self, write: &TileWrite<'_>) -> MetadataResult<TileWriteOutcome> {
            let mut tx = self.pool.begin().await?;

            let previous: Option<(String, String)> = sqlx::query_as(
                "SELECT data_scope, tile_hash FROM tiles WHERE tileset_id = ? AND quad_key = ?",
            )
            .bind(write.tileset_id)
            .bind(write.quad_key)
            .fetch_optional(&mut *tx)
            .await?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO tile_data (data_scope, tile_hash, tileset_id, size_bytes, data, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(data_scope, tile_hash) DO NOTHING
                "#,
            )
            .bind(write.data_scope)
            .bind(write.tile_hash)
            .bind(write.tileset_id)
            .bind(write.data.len() as i64)
            .bind(write.data)
            .bind(write.written_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            sqlx::query(
                r#"
                INSERT INTO tiles (tileset_id, quad_key, data_scope, tile_hash, etag, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(tileset_id, quad_key) DO UPDATE SET
                    data_scope = excluded.data_scope,
                    tile_hash = excluded.tile_hash,
                    etag = excluded.etag,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(write.tileset_id)
            .bind(write.quad_key)
            .bind(write.data_scope)
            .bind(write.tile_hash)
            .bind(write.etag)
            .bind(write.written_at)
            .execute(&mut *tx)
            .await?;

            // Bytes the tile no longer points at go away with the write unless
            // another tile still shares them.
            let mut data_released = false;
            if let Some((scope, hash)) = previous
                && (scope.as_str(), hash.as_str()) != (write.data_scope, write.tile_hash)
            {
                data_released = sqlx::query(
                    r#"
                    DELETE FROM tile_data
                    WHERE data_scope = ? AND tile_hash = ?
                    AND NOT EXISTS (
                        SELECT 1 FROM tiles t WHERE t.data_scope = ? AND t.tile_hash = ?
                    )
                    "#,
                )
                .bind(&scope)
                .bind(&hash)
                .bind(&scope)
                .bind(&hash)
                .execute(&mut *tx)
                .await?
                .rows_affected()
                    > 0;
            }

            tx.commit().await?;
            Ok(TileWriteOutcome {
                data_inserted: inserted > 0,
                data_released,
            })
        }

        async fn count_tiles(&self, tileset_id: &str) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tiles WHERE tileset_id = ?")
                .bind(tileset_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }

        async fn count_tile_data(&self) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tile_data")
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }

        async fn tileset_bytes_stored(&self, tileset_id: &str) -> MetadataResult<u64> {
            let bytes: i64 = sqlx::query_scalar(
                r#"
                SELECT COALESCE(SUM(d.size_bytes), 0)
                FROM tile_data d
                WHERE (d.data_scope, d.tile_hash) IN (
                    SELECT t.data_scope, t.tile_hash FROM tiles t WHERE t.tileset_id = ?
                )
                "#,
            )
            .bind(tileset_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(bytes as u64)
        }

        async fn reclaim_unreferenced_tile_data(&self, limit: u32) -> MetadataResult<u64> {
            let result = sqlx::query(
                r#"
                DELETE FROM tile_data WHERE rowid IN (
                    SELECT d.rowid FROM tile_data d
                    WHERE NOT EXISTS (
                        SELECT 1 FROM tiles t
                        WHERE t.data_scope = d.data_scope AND t.tile_hash = d.tile_hash
                    )
                    LIMIT ?
                )
                "#,
            )
            .bind(i64::from(limit))
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl ImportRepo for SqliteStore {
        async fn create_import(&self, import: &ImportRow) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                INSERT INTO imports (
                    import_id, tileset_id, state, error, started_at, last_updated_at, finished_at,
                    imported_resources, total_resources, imported_bytes, total_bytes
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(import.import_id)
            .bind(&import.tileset_id)
            .bind(&import.state)
            .bind(&import.error)
            .bind(import.started_at)
            .bind(import.last_updated_at)
            .bind(import.finished_at)
            .bind(import.imported_resources)
            .bind(import.total_resources)
            .bind(import.imported_bytes)
            .bind(import.total_bytes)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(e) if MetadataError::is_unique_violation(&e) => Err(
                    MetadataError::AlreadyExists(format!("import {}", import.import_id)),
                ),
                Err(e) => Err(e.into()),
            }
        }

        async fn get_import(&self, import_id: Uuid) -> MetadataResult<Option<ImportRow>> {
            let row = sqlx::query_as::<_, ImportRow>("SELECT * FROM imports WHERE import_id = ?")
                .bind(import_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_imports(&self, limit: u32) -> MetadataResult<Vec<ImportRow>> {
            let rows = sqlx::query_as::<_, ImportRow>(
                "SELECT * FROM imports ORDER BY started_at DESC LIMIT ?",
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn update_import_progress(
            &self,
            import_id: Uuid,
            imported_resources: i64,
            imported_bytes: i64,
            last_updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                UPDATE imports
                SET imported_resources = ?, imported_bytes = ?, last_updated_at = ?
                WHERE import_id = ? AND state = 'active'
                "#,
            )
            .bind(imported_resources)
            .bind(imported_bytes)
            .bind(last_updated_at)
            .bind(import_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn finish_import(&self, import: &ImportRow) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                UPDATE imports
                SET state = ?, error = ?, last_updated_at = ?, finished_at = ?,
                    imported_resources = ?, imported_bytes = ?
                WHERE import_id = ? AND state = 'active'
                "#,
            )
            .bind(&import.state)
            .bind(&import.error)
            .bind(import.last_updated_at)
            .bind(import.finished_at)
            .bind(import.imported_resources)
            .bind(import.imported_bytes)
            .bind(import.import_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return match self.get_import(import.import_id).await? {
                    Some(current) => Err(MetadataError::InvalidStateTransition {
                        from: current.state,
                        to: import.state.clone(),
                    }),
                    None => Err(MetadataError::NotFound(format!(
                        "import {}",
                        import.import_id
                    ))),
                };
            }
            Ok(())
        }

        async fn get_active_imports(&self) -> MetadataResult<Vec<ImportRow>> {
            let rows = sqlx::query_as::<_, ImportRow>(
                "SELECT * FROM imports WHERE state = 'active' ORDER BY started_at",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn fail_active_imports(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let result = sqlx::query(
                r#"
                UPDATE imports
                SET state = 'error', error = 'unknown', finished_at = ?, last_updated_at = ?
                WHERE state = 'active'
                "#,
            )
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl StyleRepo for SqliteStore {
        async fn create_style(&self, style: &StyleRow) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                INSERT INTO styles (style_id, name, tileset_id, style_json, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(style.style_id)
            .bind(&style.name)
            .bind(&style.tileset_id)
            .bind(&style.style_json)
            .bind(style.created_at)
            .bind(style.updated_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(e) if MetadataError::is_unique_violation(&e) => Err(
                    MetadataError::AlreadyExists(format!("style {}", style.style_id)),
                ),
                Err(e) => Err(e.into()),
            }
        }

        async fn upsert_tileset_style(&self, style: &StyleRow) -> MetadataResult<Uuid> {
            let tileset_id = style.tileset_id.as_deref().ok_or_else(|| {
                MetadataError::Internal("generated style must reference a tileset".to_string())
            })?;

            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO styles (style_id, name, tileset_id, style_json, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(tileset_id) WHERE tileset_id IS NOT NULL DO UPDATE SET
                    name = excluded.name,
                    style_json = excluded.style_json,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(style.style_id)
            .bind(&style.name)
            .bind(tileset_id)
            .bind(&style.style_json)
            .bind(style.created_at)
            .bind(style.updated_at)
            .execute(&mut *tx)
            .await?;

            let style_id: Uuid =
                sqlx::query_scalar("SELECT style_id FROM styles WHERE tileset_id = ?")
                    .bind(tileset_id)
                    .fetch_one(&mut *tx)
                    .await?;

            tx.commit().await?;
            Ok(style_id)
        }

        async fn get_style(&self, style_id: Uuid) -> MetadataResult<Option<StyleRow>> {
            let row = sqlx::query_as::<_, StyleRow>("SELECT * FROM styles WHERE style_id = ?")
                .bind(style_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_styles(&self) -> MetadataResult<Vec<StyleSummaryRow>> {
            let rows = sqlx::query_as::<_, StyleSummaryRow>(
                r#"
                SELECT
                    s.style_id AS style_id,
                    s.name AS name,
                    s.tileset_id AS tileset_id,
                    COALESCE((
                        SELECT SUM(d.size_bytes) FROM tile_data d
                        WHERE (d.data_scope, d.tile_hash) IN (
                            SELECT t.data_scope, t.tile_hash FROM tiles t
                            WHERE t.tileset_id = s.tileset_id
                        )
                    ), 0) AS bytes_stored,
                    s.created_at AS created_at,
                    s.updated_at AS updated_at
                FROM styles s
                ORDER BY s.name, s.created_at
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_style(&self, style_id: Uuid) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM styles WHERE style_id = ?")
                .bind(style_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("style {style_id}")));
            }
            Ok(())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Tile sources
CREATE TABLE IF NOT EXISTS tilesets (
    tileset_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    format TEXT NOT NULL,
    tilejson TEXT NOT NULL,
    upstream_tile_urls TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tilesets_name ON tilesets(name);

-- Content-addressed tile bytes. data_scope is the tileset id or 'global'
-- depending on the dedup scope; tileset_id records the first writer.
CREATE TABLE IF NOT EXISTS tile_data (
    data_scope TEXT NOT NULL,
    tile_hash TEXT NOT NULL,
    tileset_id TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    data BLOB NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (data_scope, tile_hash)
);

-- Coordinate slots. The composite foreign key keeps a tile from ever
-- pointing at bytes that do not exist.
CREATE TABLE IF NOT EXISTS tiles (
    tileset_id TEXT NOT NULL REFERENCES tilesets(tileset_id) ON DELETE CASCADE,
    quad_key TEXT NOT NULL,
    data_scope TEXT NOT NULL,
    tile_hash TEXT NOT NULL,
    etag TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (tileset_id, quad_key),
    FOREIGN KEY (data_scope, tile_hash) REFERENCES tile_data(data_scope, tile_hash)
);
CREATE INDEX IF NOT EXISTS idx_tiles_data ON tiles(data_scope, tile_hash);

-- Import jobs
CREATE TABLE IF NOT EXISTS imports (
    import_id BLOB PRIMARY KEY,
    tileset_id TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'active' CHECK (state IN ('active', 'complete', 'error')),
    error TEXT CHECK (error IS NULL OR error IN ('timeout', 'unknown')),
    started_at TEXT NOT NULL,
    last_updated_at TEXT,
    finished_at TEXT,
    imported_resources INTEGER NOT NULL DEFAULT 0,
    total_resources INTEGER,
    imported_bytes INTEGER NOT NULL DEFAULT 0,
    total_bytes INTEGER,
    CHECK ((state = 'error') = (error IS NOT NULL)),
    CHECK ((state = 'active') = (finished_at IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_imports_state ON imports(state);
CREATE INDEX IF NOT EXISTS idx_imports_started ON imports(started_at);

-- Styles
CREATE TABLE IF NOT EXISTS styles (
    style_id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    tileset_id TEXT REFERENCES tilesets(tileset_id) ON DELETE SET NULL,
    style_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
-- At most one generated style per tileset
CREATE UNIQUE INDEX IF NOT EXISTS idx_styles_tileset ON styles(tileset_id) WHERE tileset_id IS NOT NULL;
"#;
