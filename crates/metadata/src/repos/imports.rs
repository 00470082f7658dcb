//! Import job repository.

use crate::error::MetadataResult;
use crate::models::ImportRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for import job operations.
#[async_trait]
pub trait ImportRepo: Send + Sync {
    /// Create an import record.
    async fn create_import(&self, import: &ImportRow) -> MetadataResult<()>;

    /// Get an import by id.
    async fn get_import(&self, import_id: Uuid) -> MetadataResult<Option<ImportRow>>;

    /// List imports, newest first.
    async fn list_imports(&self, limit: u32) -> MetadataResult<Vec<ImportRow>>;

    /// Persist running totals of an active import.
    /// Has no effect once the import reached a terminal state.
    async fn update_import_progress(
        &self,
        import_id: Uuid,
        imported_resources: i64,
        imported_bytes: i64,
        last_updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Move an active import to a terminal state.
    ///
    /// Fails with `InvalidStateTransition` if the import is no longer active.
    async fn finish_import(&self, import: &ImportRow) -> MetadataResult<()>;

    /// Get imports still marked active.
    async fn get_active_imports(&self) -> MetadataResult<Vec<ImportRow>>;

    /// Mark every active import as `error(unknown)`. Returns the number updated.
    ///
    /// Run at startup: no job survives a restart, so active rows are orphans.
    async fn fail_active_imports(&self, now: OffsetDateTime) -> MetadataResult<u64>;
}
