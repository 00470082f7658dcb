//! Import job records and their lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an import job.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportId(Uuid);

impl ImportId {
    /// Generate a new random import ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidImportRecord(format!("invalid import ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ImportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ImportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImportId({})", self.0)
    }
}

impl fmt::Display for ImportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Import job state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportState {
    /// The job is streaming tiles.
    Active,
    /// Every tile was written and the style generated.
    Complete,
    /// The job stopped early; see [`ImportFailure`].
    Error,
}

impl ImportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            other => Err(crate::Error::InvalidImportRecord(format!(
                "unknown import state '{other}'"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Why an import ended in [`ImportState::Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFailure {
    /// The job exceeded its time budget.
    Timeout,
    /// Any other failure, including jobs orphaned by a restart.
    Unknown,
}

impl ImportFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "timeout" => Ok(Self::Timeout),
            "unknown" => Ok(Self::Unknown),
            other => Err(crate::Error::InvalidImportRecord(format!(
                "unknown import error '{other}'"
            ))),
        }
    }
}

/// Snapshot of an import job.
///
/// The same shape is persisted, returned by polling, and pushed to progress
/// subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub id: ImportId,
    pub tileset_id: String,
    pub state: ImportState,
    pub error: Option<ImportFailure>,
    #[serde(with = "time::serde::rfc3339")]
    pub started: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished: Option<OffsetDateTime>,
    pub imported_resources: u64,
    pub total_resources: Option<u64>,
    pub imported_bytes: u64,
    pub total_bytes: Option<u64>,
}

impl ImportRecord {
    /// Create a fresh `active` record with zero progress.
    pub fn start(
        tileset_id: impl Into<String>,
        total_resources: Option<u64>,
        total_bytes: Option<u64>,
    ) -> Self {
        Self {
            id: ImportId::new(),
            tileset_id: tileset_id.into(),
            state: ImportState::Active,
            error: None,
            started: OffsetDateTime::now_utc(),
            last_updated: None,
            finished: None,
            imported_resources: 0,
            total_resources,
            imported_bytes: 0,
            total_bytes,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Add a finished batch to the running totals.
    pub fn record_progress(
        &mut self,
        resources: u64,
        bytes: u64,
        now: OffsetDateTime,
    ) -> crate::Result<()> {
        self.require_active("active")?;
        self.imported_resources += resources;
        self.imported_bytes += bytes;
        self.last_updated = Some(now);
        Ok(())
    }

    /// Transition `active -> complete`.
    pub fn complete(&mut self, now: OffsetDateTime) -> crate::Result<()> {
        self.require_active(ImportState::Complete.as_str())?;
        self.state = ImportState::Complete;
        self.last_updated = Some(now);
        self.finished = Some(now);
        Ok(())
    }

    /// Transition `active -> error(failure)`.
    pub fn fail(&mut self, failure: ImportFailure, now: OffsetDateTime) -> crate::Result<()> {
        self.require_active(ImportState::Error.as_str())?;
        self.state = ImportState::Error;
        self.error = Some(failure);
        self.last_updated = Some(now);
        self.finished = Some(now);
        Ok(())
    }

    /// Check that only the fields legal for the current state are populated.
    pub fn validate(&self) -> crate::Result<()> {
        let ok = match self.state {
            ImportState::Active => self.error.is_none() && self.finished.is_none(),
            ImportState::Complete => self.error.is_none() && self.finished.is_some(),
            ImportState::Error => self.error.is_some() && self.finished.is_some(),
        };
        if ok {
            Ok(())
        } else {
            Err(crate::Error::InvalidImportRecord(format!(
                "import {} in state {} has error={:?} finished={:?}",
                self.id,
                self.state.as_str(),
                self.error,
                self.finished
            )))
        }
    }

    fn require_active(&self, to: &str) -> crate::Result<()> {
        if self.state.is_terminal() {
            return Err(crate::Error::InvalidTransition {
                from: self.state.as_str().to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}
