//! Conflict avoidance before auto-saves.
//!
//! Before overwriting a factory's remote copy the engine asks the store
//! whether another device wrote it since this client last synced. The check
//! costs a round trip, so it is skipped for factories synced within the
//! freshness window.

use crate::cloud::RemoteStore;
use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use foundry_types::{ConflictInfo, TrackedEntity};
use std::time::Duration;
use tracing::debug;

/// Outcome of a conflict check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCheck {
    /// Synced recently; the remote check was not performed.
    Skipped,
    /// The remote copy is ours or absent.
    Clear,
    /// Another device wrote the remote copy.
    Conflict(ConflictInfo),
}

/// Decides per factory and per cycle whether a remote conflict check runs.
#[derive(Debug, Clone)]
pub struct ConflictGuard {
    freshness_window: Duration,
}

impl ConflictGuard {
    /// Creates a guard with the given freshness window.
    pub fn new(freshness_window: Duration) -> Self {
        Self { freshness_window }
    }

    /// Returns the freshness window.
    pub fn freshness_window(&self) -> Duration {
        self.freshness_window
    }

    /// Returns true if `entity` synced recently enough to skip the remote
    /// check.
    pub fn is_fresh(&self, entity: &TrackedEntity, now: DateTime<Utc>) -> bool {
        let Some(last_synced) = entity.last_synced else {
            return false;
        };
        // A last_synced ahead of `now` (clock skew) counts as fresh.
        match (now - last_synced).to_std() {
            Ok(age) => age <= self.freshness_window,
            Err(_) => true,
        }
    }

    /// Runs the conflict check for `entity`, querying the store unless the
    /// entity is fresh.
    pub async fn check(
        &self,
        store: &dyn RemoteStore,
        namespace: &str,
        entity: &TrackedEntity,
        now: DateTime<Utc>,
    ) -> SyncResult<ConflictCheck> {
        if self.is_fresh(entity, now) {
            debug!("{} synced recently, skipping conflict check", entity.name);
            return Ok(ConflictCheck::Skipped);
        }

        match store.detect_conflict(namespace, &entity.name).await? {
            Some(info) => Ok(ConflictCheck::Conflict(info)),
            None => Ok(ConflictCheck::Clear),
        }
    }
}

impl Default for ConflictGuard {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_FRESHNESS_WINDOW)
    }
}
