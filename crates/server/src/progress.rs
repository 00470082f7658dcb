//! In-memory fan-out of import progress snapshots.
//!
//! Each running import owns one `watch` channel. Subscribers see the latest
//! snapshot and every later one until the terminal snapshot, then the stream
//! ends. When no channel exists (the job already finished, or ran in an
//! earlier process) the persisted record is the fallback.

use crate::error::{ApiError, ApiResult};
use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use mapvault_core::{ImportId, ImportRecord};
use mapvault_metadata::MetadataStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How often an orphaned stream re-reads the persisted record.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Registry of live progress channels keyed by import.
#[derive(Default)]
pub struct ProgressBus {
    channels: DashMap<ImportId, watch::Sender<ImportRecord>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the channel for a new import, seeded with its first snapshot.
    pub fn open(&self, record: &ImportRecord) {
        let (tx, _rx) = watch::channel(record.clone());
        self.channels.insert(record.id, tx);
    }

    /// Push a snapshot to current subscribers.
    pub fn publish(&self, record: &ImportRecord) {
        if let Some(tx) = self.channels.get(&record.id) {
            tx.send_replace(record.clone());
        }
    }

    /// Drop the channel. Subscribers still drain any unseen snapshot.
    pub fn close(&self, id: &ImportId) {
        self.channels.remove(id);
    }

    /// Attach to a running import's channel.
    pub fn subscribe(&self, id: &ImportId) -> Option<watch::Receiver<ImportRecord>> {
        self.channels.get(id).map(|tx| tx.subscribe())
    }

    pub fn is_open(&self, id: &ImportId) -> bool {
        self.channels.contains_key(id)
    }

    /// Stream of snapshots for `id`, ending with the terminal one.
    ///
    /// Fails with `NotFound` when the import is neither live nor persisted.
    pub async fn snapshots(
        &self,
        metadata: Arc<dyn MetadataStore>,
        id: ImportId,
    ) -> ApiResult<BoxStream<'static, ImportRecord>> {
        if let Some(rx) = self.subscribe(&id) {
            return Ok(watch_stream(rx));
        }

        let row = metadata
            .get_import(*id.as_uuid())
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("import {id}")))?;
        let record = ImportRecord::try_from(row)?;
        if record.is_terminal() {
            return Ok(stream::once(async move { record }).boxed());
        }

        Ok(poll_stream(metadata, record))
    }
}

/// Yield the current value, then each change, stopping after a terminal snapshot.
fn watch_stream(rx: watch::Receiver<ImportRecord>) -> BoxStream<'static, ImportRecord> {
    stream::unfold(Some((rx, true)), |state| async move {
        let (mut rx, first) = state?;
        // `changed` still reports a value published just before the sender was dropped.
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let snapshot = rx.borrow_and_update().clone();
        let next = if snapshot.is_terminal() {
            None
        } else {
            Some((rx, false))
        };
        Some((snapshot, next))
    })
    .boxed()
}

/// Follow a persisted record with no live channel until it turns terminal.
fn poll_stream(
    metadata: Arc<dyn MetadataStore>,
    first: ImportRecord,
) -> BoxStream<'static, ImportRecord> {
    stream::unfold(Some((metadata, first, true)), |state| async move {
        let (metadata, last, first) = state?;
        let snapshot = if first {
            last
        } else {
            tokio::time::sleep(POLL_INTERVAL).await;
            match metadata.get_import(*last.id.as_uuid()).await {
                Ok(Some(row)) => ImportRecord::try_from(row).ok()?,
                Ok(None) => return None,
                Err(e) => {
                    tracing::debug!(import_id = %last.id, error = %e, "Progress poll failed");
                    return None;
                }
            }
        };
        let next = if snapshot.is_terminal() {
            None
        } else {
            Some((metadata, snapshot.clone(), false))
        };
        Some((snapshot, next))
    })
    .boxed()
}
