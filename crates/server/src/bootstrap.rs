//! Startup reconciliation.

use anyhow::{Context, Result};
use mapvault_metadata::MetadataStore;
use time::OffsetDateTime;

/// Fail every import left `active` by a previous process.
///
/// No job from an earlier process can still be running, so these records
/// would otherwise never reach a terminal state. Must run before the
/// listener binds.
pub async fn reconcile_imports(metadata: &dyn MetadataStore) -> Result<u64> {
    let now = OffsetDateTime::now_utc();
    let failed = metadata
        .fail_active_imports(now)
        .await
        .context("failed to reconcile interrupted imports")?;

    if failed > 0 {
        tracing::warn!(
            count = failed,
            "Found imports interrupted by a previous server instance, marked as error(unknown)"
        );
    } else {
        tracing::debug!("No interrupted imports to reconcile");
    }
    Ok(failed)
}
