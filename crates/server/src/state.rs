//! Application state shared across handlers.

use crate::content::ContentStore;
use crate::import::ImportCoordinator;
use crate::progress::ProgressBus;
use crate::tile_cache::TileCache;
use crate::upstream::UpstreamClient;
use anyhow::Context;
use mapvault_core::config::AppConfig;
use mapvault_core::{ImportFailure, ImportId, ImportRecord};
use mapvault_metadata::MetadataStore;
use mapvault_metadata::models::ImportRow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Registry for tracking background import tasks and detecting panics.
///
/// A panicked import would otherwise stay `active` until the next restart.
/// The watchdog marks it `error(unknown)`, publishes the terminal snapshot,
/// and closes its progress channel.
pub struct ImportTaskRegistry {
    /// Map of import_id -> task handle
    tasks: Arc<Mutex<HashMap<ImportId, JoinHandle<()>>>>,
    metadata: Arc<dyn MetadataStore>,
    progress: Arc<ProgressBus>,
}

impl ImportTaskRegistry {
    pub fn new(metadata: Arc<dyn MetadataStore>, progress: Arc<ProgressBus>) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            metadata,
            progress,
        }
    }

    /// Register a spawned import task.
    pub async fn register(&self, import_id: ImportId, handle: JoinHandle<()>) {
        self.tasks.lock().await.insert(import_id, handle);
    }

    /// Number of tasks not yet reaped by the watchdog.
    pub async fn tracked(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Spawn a watchdog task that periodically checks for panicked tasks.
    /// Returns the watchdog's JoinHandle (caller should keep it to prevent early termination).
    pub fn spawn_watchdog(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(10)).await;
                self.check_tasks().await;
            }
        })
    }

    /// Reap finished tasks and fail the imports of any that panicked.
    pub async fn check_tasks(&self) {
        let finished: Vec<(ImportId, JoinHandle<()>)> = {
            let mut tasks = self.tasks.lock().await;
            let done: Vec<ImportId> = tasks
                .iter()
                .filter(|(_, handle)| handle.is_finished())
                .map(|(id, _)| *id)
                .collect();
            done.into_iter()
                .filter_map(|id| tasks.remove(&id).map(|h| (id, h)))
                .collect()
        };

        for (import_id, handle) in finished {
            match handle.await {
                Ok(()) => {
                    tracing::debug!(import_id = %import_id, "Import task completed");
                }
                Err(join_err) => {
                    crate::metrics::IMPORTS_ACTIVE.dec();
                    if join_err.is_panic() {
                        crate::metrics::IMPORTS_PANICKED.inc();
                        tracing::error!(
                            import_id = %import_id,
                            panic = ?join_err,
                            "Import task panicked, marking import as failed"
                        );
                    } else {
                        tracing::warn!(import_id = %import_id, "Import task was cancelled");
                    }
                    self.fail_abandoned(import_id).await;
                }
            }
        }
    }

    async fn fail_abandoned(&self, import_id: ImportId) {
        let row = match self.metadata.get_import(*import_id.as_uuid()).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.progress.close(&import_id);
                return;
            }
            Err(e) => {
                tracing::error!(import_id = %import_id, error = %e, "Failed to load abandoned import");
                self.progress.close(&import_id);
                return;
            }
        };

        let mut record = match ImportRecord::try_from(row) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(import_id = %import_id, error = %e, "Abandoned import record is corrupt");
                self.progress.close(&import_id);
                return;
            }
        };

        if !record.is_terminal() {
            let now = time::OffsetDateTime::now_utc();
            if record.fail(ImportFailure::Unknown, now).is_ok() {
                crate::metrics::IMPORTS_FINISHED
                    .with_label_values(&[ImportFailure::Unknown.as_str()])
                    .inc();
                if let Err(e) = self.metadata.finish_import(&ImportRow::from(&record)).await {
                    tracing::error!(import_id = %import_id, error = %e, "Failed to mark abandoned import as failed");
                }
            }
        }
        self.progress.publish(&record);
        self.progress.close(&import_id);
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Tile read path.
    pub tiles: TileCache,
    /// Archive import jobs.
    pub imports: Arc<ImportCoordinator>,
    /// Live import progress.
    pub progress: Arc<ProgressBus>,
    /// Import task registry for panic detection.
    pub import_tasks: Arc<ImportTaskRegistry>,
}

impl AppState {
    /// Create the application state.
    ///
    /// Fails when the configuration is invalid or the upstream HTTP client
    /// cannot be built.
    pub fn new(config: AppConfig, metadata: Arc<dyn MetadataStore>) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid configuration")?;

        let content = ContentStore::new(metadata.clone(), config.storage.dedup_scope);
        let upstream =
            UpstreamClient::new(&config.upstream).context("failed to build upstream client")?;
        let tiles = TileCache::new(
            metadata.clone(),
            content.clone(),
            upstream,
            config.upstream.revalidate_on_hit,
        );

        let progress = Arc::new(ProgressBus::new());
        let import_tasks = Arc::new(ImportTaskRegistry::new(metadata.clone(), progress.clone()));
        let imports = Arc::new(ImportCoordinator::new(
            metadata.clone(),
            content,
            progress.clone(),
            import_tasks.clone(),
            config.import.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            metadata,
            tiles,
            imports,
            progress,
            import_tasks,
        })
    }
}
