//! Sync bookkeeping for a single tracked factory.

use crate::conflict::ConflictInfo;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a factory stands relative to its remote copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No unsaved local changes.
    #[default]
    Clean,
    /// Local changes not yet persisted remotely.
    Dirty,
    /// Another writer changed the remote copy; needs manual resolution.
    Conflict,
}

impl SyncStatus {
    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Dirty => "dirty",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clean" => Ok(Self::Clean),
            "dirty" => Ok(Self::Dirty),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

/// A factory as seen by the sync layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntity {
    /// Unique factory name; also the remote file stem.
    pub name: String,
    /// Current sync status.
    pub sync_status: SyncStatus,
    /// When the factory was last persisted remotely.
    pub last_synced: Option<DateTime<Utc>>,
    /// Message of the last failed sync, if any.
    pub last_error: Option<String>,
    /// Conflict details while `sync_status` is `Conflict`.
    pub conflict: Option<ConflictInfo>,
    /// Local edit counter, bumped on every mutation.
    pub revision: u64,
}

impl TrackedEntity {
    /// Creates a clean, never-synced entity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sync_status: SyncStatus::Clean,
            last_synced: None,
            last_error: None,
            conflict: None,
            revision: 0,
        }
    }

    /// Returns true if the entity has unsaved local changes and is not blocked
    /// by a conflict.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.sync_status == SyncStatus::Dirty
    }

    /// Returns true while the entity waits for manual conflict resolution.
    #[must_use]
    pub fn in_conflict(&self) -> bool {
        self.sync_status == SyncStatus::Conflict
    }
}
