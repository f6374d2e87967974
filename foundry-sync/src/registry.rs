//! Tracked factories and their sync bookkeeping.
//!
//! The domain layer tracks, edits and removes factories; the engine reads
//! their status and records sync outcomes. Every local edit is published as a
//! [`RegistryEvent::BecameDirty`] so the scheduler can react without polling.

use chrono::{DateTime, Utc};
use foundry_types::{ConflictInfo, SyncStatus, TrackedEntity};
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

const EVENT_CAPACITY: usize = 256;

/// Change notifications published by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A factory received a local edit and now needs saving.
    BecameDirty(String),
    /// A factory was removed from the registry.
    Removed(String),
}

/// The set of trackable factories.
pub struct EntityRegistry {
    entities: RwLock<HashMap<String, TrackedEntity>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entities: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Starts tracking a clean factory. Returns false if already tracked.
    pub async fn track(&self, name: impl Into<String>) -> bool {
        let name = name.into();
        let mut entities = self.entities.write().await;
        if entities.contains_key(&name) {
            return false;
        }
        entities.insert(name.clone(), TrackedEntity::new(name));
        true
    }

    /// Stops tracking a factory.
    pub async fn untrack(&self, name: &str) -> Option<TrackedEntity> {
        let removed = self.entities.write().await.remove(name);
        if removed.is_some() {
            let _ = self.events.send(RegistryEvent::Removed(name.to_string()));
        }
        removed
    }

    /// Returns a snapshot of a factory.
    pub async fn get(&self, name: &str) -> Option<TrackedEntity> {
        self.entities.read().await.get(name).cloned()
    }

    /// Returns whether a factory is tracked.
    pub async fn contains(&self, name: &str) -> bool {
        self.entities.read().await.contains_key(name)
    }

    /// Returns the tracked factory names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the dirty factories among `names`, keeping the order of
    /// `names` and dropping repeats.
    pub async fn dirty_among(&self, names: &[String]) -> Vec<String> {
        let entities = self.entities.read().await;
        let mut dirty: Vec<String> = Vec::new();
        for name in names {
            let is_dirty = entities.get(name).is_some_and(TrackedEntity::is_dirty);
            if is_dirty && !dirty.contains(name) {
                dirty.push(name.clone());
            }
        }
        dirty
    }

    /// Records a local edit. Returns false if the factory is not tracked.
    ///
    /// A factory in conflict stays in conflict and no notification is sent.
    pub async fn mark_dirty(&self, name: &str) -> bool {
        let notify = {
            let mut entities = self.entities.write().await;
            let Some(entity) = entities.get_mut(name) else {
                return false;
            };
            entity.revision += 1;
            if entity.in_conflict() {
                false
            } else {
                entity.sync_status = SyncStatus::Dirty;
                true
            }
        };

        if notify {
            let _ = self.events.send(RegistryEvent::BecameDirty(name.to_string()));
        }
        true
    }

    /// Records a successful save of the given revision.
    ///
    /// The factory only becomes clean if no edit happened since `revision`
    /// was read; otherwise it stays dirty for the next cycle.
    pub async fn mark_synced(&self, name: &str, revision: u64, at: DateTime<Utc>) {
        let mut entities = self.entities.write().await;
        let Some(entity) = entities.get_mut(name) else {
            return;
        };
        entity.last_synced = Some(at);
        entity.last_error = None;
        if entity.revision == revision && entity.is_dirty() {
            entity.sync_status = SyncStatus::Clean;
        } else {
            debug!("{} edited during save, keeping it dirty", name);
        }
    }

    /// Records a failed sync, leaving the status untouched.
    pub async fn set_sync_error(&self, name: &str, message: impl Into<String>) {
        if let Some(entity) = self.entities.write().await.get_mut(name) {
            entity.last_error = Some(message.into());
        }
    }

    /// Puts a factory into conflict.
    pub async fn set_sync_conflict(&self, name: &str, info: ConflictInfo) {
        if let Some(entity) = self.entities.write().await.get_mut(name) {
            entity.sync_status = SyncStatus::Conflict;
            entity.conflict = Some(info);
        }
    }

    /// Clears a conflict after the user chose to keep the local copy. The
    /// factory becomes dirty and will overwrite the remote copy.
    ///
    /// `synced_at` becomes the new sync point, so the conflict check is
    /// skipped for the freshness window. The store only stops flagging the
    /// remote write once it is acknowledged, which
    /// `AutoSyncScheduler::resolve_conflict` does.
    pub async fn resolve_conflict(&self, name: &str, synced_at: DateTime<Utc>) -> bool {
        {
            let mut entities = self.entities.write().await;
            let Some(entity) = entities.get_mut(name) else {
                return false;
            };
            if !entity.in_conflict() {
                return false;
            }
            entity.sync_status = SyncStatus::Dirty;
            entity.conflict = None;
            entity.last_error = None;
            entity.last_synced = Some(synced_at);
        }
        let _ = self.events.send(RegistryEvent::BecameDirty(name.to_string()));
        true
    }

    /// Marks a factory clean after its local copy was replaced by a restore.
    pub async fn mark_restored(&self, name: &str, at: DateTime<Utc>) {
        let mut entities = self.entities.write().await;
        let entity = entities
            .entry(name.to_string())
            .or_insert_with(|| TrackedEntity::new(name));
        entity.sync_status = SyncStatus::Clean;
        entity.conflict = None;
        entity.last_error = None;
        entity.last_synced = Some(at);
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
