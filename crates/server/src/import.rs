//! Archive import coordinator.
//!
//! Submission validates the archive synchronously, registers the tileset,
//! persists an `active` import record and returns. The job then runs on its
//! own task: tiles are streamed in batches through [`ContentStore`], progress
//! is persisted and published once per batch, and the job ends `complete` or
//! `error(timeout|unknown)`. Tiles written before a failure are kept.

use crate::catalog;
use crate::content::ContentStore;
use crate::error::ApiResult;
use crate::metrics;
use crate::progress::ProgressBus;
use crate::state::ImportTaskRegistry;
use mapvault_archive::{ArchiveError, TileArchive};
use mapvault_core::config::ImportConfig;
use mapvault_core::{ImportFailure, ImportRecord, TileJson, tileset_id_for};
use mapvault_metadata::models::{ImportRow, TilesetRow};
use mapvault_metadata::{MetadataError, MetadataStore};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Result of a successful submission.
#[derive(Debug, Clone)]
pub struct SubmittedImport {
    pub import: ImportRecord,
    pub tileset: TilesetRow,
}

/// Errors that end an import job.
#[derive(Debug, thiserror::Error)]
enum ImportJobError {
    #[error("archive read failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("store write failed: {0}")]
    Metadata(#[from] MetadataError),

    #[error("import record rejected update: {0}")]
    Record(#[from] mapvault_core::Error),
}

/// Starts import jobs and tracks them.
pub struct ImportCoordinator {
    metadata: Arc<dyn MetadataStore>,
    content: ContentStore,
    progress: Arc<ProgressBus>,
    tasks: Arc<ImportTaskRegistry>,
    config: ImportConfig,
}

impl ImportCoordinator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        content: ContentStore,
        progress: Arc<ProgressBus>,
        tasks: Arc<ImportTaskRegistry>,
        config: ImportConfig,
    ) -> Self {
        Self {
            metadata,
            content,
            progress,
            tasks,
            config,
        }
    }

    /// Validate the archive at `path` and start importing it.
    ///
    /// Nothing is written unless the archive opens and its metadata is valid.
    /// Re-importing the same archive reuses its tileset id but always creates
    /// a new import record.
    pub async fn submit(&self, path: &Path, base_url: String) -> ApiResult<SubmittedImport> {
        let archive = mapvault_archive::open(path).await?;
        let meta = archive.metadata().clone();

        let totals = match archive.totals().await {
            Ok(totals) => Some(totals),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Archive totals unavailable");
                None
            }
        };

        let tileset_id = tileset_id_for(&meta.identity);
        let mut tilejson = meta.tilejson.clone();
        tilejson.id = Some(meta.identity.clone());

        let now = OffsetDateTime::now_utc();
        let tileset = catalog::tileset_row(&tileset_id, &tilejson, now)?;
        self.metadata.upsert_tileset(&tileset).await?;

        let record = ImportRecord::start(
            tileset_id.clone(),
            totals.map(|t| t.tiles),
            totals.map(|t| t.bytes),
        );
        self.metadata
            .create_import(&ImportRow::from(&record))
            .await?;
        // The channel exists before the caller learns the id, so a subscriber
        // can never miss the job entirely.
        self.progress.open(&record);

        let job = ImportJob {
            archive,
            metadata: self.metadata.clone(),
            content: self.content.clone(),
            progress: self.progress.clone(),
            tileset: tileset.clone(),
            tilejson,
            record: record.clone(),
            base_url,
            batch_size: self.config.batch_size,
            timeout: self.config.timeout(),
        };

        metrics::IMPORTS_ACTIVE.inc();
        let handle = tokio::spawn(job.run());
        self.tasks.register(record.id, handle).await;

        tracing::info!(
            import_id = %record.id,
            tileset_id = %tileset_id,
            path = %path.display(),
            total_tiles = ?totals.map(|t| t.tiles),
            "Import started"
        );

        Ok(SubmittedImport {
            import: record,
            tileset,
        })
    }
}

/// One running import.
struct ImportJob {
    archive: Arc<dyn TileArchive>,
    metadata: Arc<dyn MetadataStore>,
    content: ContentStore,
    progress: Arc<ProgressBus>,
    tileset: TilesetRow,
    tilejson: TileJson,
    record: ImportRecord,
    base_url: String,
    batch_size: u32,
    timeout: Duration,
}

impl ImportJob {
    async fn run(self) {
        let started = Instant::now();
        let mut record = self.record.clone();

        let outcome = tokio::time::timeout(self.timeout, self.stream_tiles(&mut record)).await;
        let now = OffsetDateTime::now_utc();

        let transition = match outcome {
            Ok(Ok(())) => match catalog::save_generated_style(
                self.metadata.as_ref(),
                &self.tileset,
                &self.tilejson,
                &self.base_url,
            )
            .await
            {
                Ok(style_id) => {
                    tracing::info!(
                        import_id = %record.id,
                        style_id = %style_id,
                        tiles = record.imported_resources,
                        "Import complete"
                    );
                    record.complete(now)
                }
                Err(e) => {
                    tracing::error!(import_id = %record.id, error = %e, "Failed to save generated style");
                    record.fail(ImportFailure::Unknown, now)
                }
            },
            Ok(Err(e)) => {
                tracing::error!(
                    import_id = %record.id,
                    imported = record.imported_resources,
                    error = %e,
                    "Import failed"
                );
                record.fail(ImportFailure::Unknown, now)
            }
            Err(_) => {
                tracing::error!(
                    import_id = %record.id,
                    imported = record.imported_resources,
                    budget_ms = self.timeout.as_millis() as u64,
                    "Import exceeded its time budget"
                );
                record.fail(ImportFailure::Timeout, now)
            }
        };
        if let Err(e) = transition {
            tracing::error!(import_id = %record.id, error = %e, "Invalid import transition");
        }

        self.archive.close().await;

        // Persist before publishing so a subscriber that misses the channel
        // finds the terminal record in the store.
        if let Err(e) = self.metadata.finish_import(&ImportRow::from(&record)).await {
            tracing::error!(import_id = %record.id, error = %e, "Failed to persist import outcome");
        }
        self.progress.publish(&record);
        self.progress.close(&record.id);

        let outcome_label = record
            .error
            .map(|e| e.as_str())
            .unwrap_or_else(|| record.state.as_str());
        metrics::IMPORTS_FINISHED
            .with_label_values(&[outcome_label])
            .inc();
        metrics::IMPORT_DURATION.observe(started.elapsed().as_secs_f64());
        metrics::IMPORTS_ACTIVE.dec();
    }

    async fn stream_tiles(&self, record: &mut ImportRecord) -> Result<(), ImportJobError> {
        let tileset_id = self.tileset.tileset_id.as_str();
        let mut cursor = None;
        loop {
            let batch = self.archive.read_batch(cursor, self.batch_size).await?;

            if !batch.tiles.is_empty() {
                // Counted per tile so a failure mid-batch still reports every
                // tile that was committed.
                for tile in &batch.tiles {
                    self.content
                        .put_tile(tileset_id, &tile.coord, &tile.data, None)
                        .await?;
                    record.record_progress(
                        1,
                        tile.data.len() as u64,
                        OffsetDateTime::now_utc(),
                    )?;
                }
                let now = OffsetDateTime::now_utc();
                self.metadata
                    .update_import_progress(
                        *record.id.as_uuid(),
                        record.imported_resources as i64,
                        record.imported_bytes as i64,
                        now,
                    )
                    .await?;
                self.progress.publish(record);
                metrics::IMPORT_TILES_WRITTEN.inc_by(batch.tiles.len() as u64);
                tracing::debug!(
                    import_id = %record.id,
                    tiles = batch.tiles.len(),
                    bytes = batch.byte_len(),
                    imported = record.imported_resources,
                    "Import batch written"
                );
            }

            match batch.next {
                Some(next) => cursor = Some(next),
                None => return Ok(()),
            }
        }
    }
}
