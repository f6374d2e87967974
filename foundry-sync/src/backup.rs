//! Manual backups.
//!
//! User-triggered counterpart to the scheduler: no debounce and no retries.
//! A batch stops at its first failure and surfaces that error to the caller.

use crate::clock::{Clock, SystemClock};
use crate::cloud::RemoteStore;
use crate::config::AutoSyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::registry::EntityRegistry;
use foundry_types::BackupFile;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct BackupState {
    loading_backups: bool,
    backup_files: Vec<BackupFile>,
    selected_entities_for_backup: Vec<String>,
}

/// Orchestrates manual backup, restore, delete and listing.
pub struct BackupManager {
    store: Arc<dyn RemoteStore>,
    config: Arc<AutoSyncConfig>,
    registry: Arc<EntityRegistry>,
    clock: Arc<dyn Clock>,
    state: RwLock<BackupState>,
}

impl BackupManager {
    /// Creates a manager using the system clock.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        config: Arc<AutoSyncConfig>,
        registry: Arc<EntityRegistry>,
    ) -> Self {
        Self::with_clock(store, config, registry, Arc::new(SystemClock))
    }

    /// Creates a manager with a custom clock for restore and sync times.
    pub fn with_clock(
        store: Arc<dyn RemoteStore>,
        config: Arc<AutoSyncConfig>,
        registry: Arc<EntityRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            registry,
            clock,
            state: RwLock::new(BackupState::default()),
        }
    }

    // ── Selection ──

    /// Returns the factories selected for the next manual backup.
    pub async fn selected_entities(&self) -> Vec<String> {
        self.state.read().await.selected_entities_for_backup.clone()
    }

    /// Replaces the selection, dropping duplicates but keeping order.
    pub async fn set_selected_entities(&self, names: Vec<String>) {
        let mut deduped: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !deduped.contains(&name) {
                deduped.push(name);
            }
        }
        self.state.write().await.selected_entities_for_backup = deduped;
    }

    /// Adds `name` to the selection or removes it. Returns whether it is now
    /// selected.
    pub async fn toggle_entity(&self, name: &str) -> bool {
        let mut state = self.state.write().await;
        let selection = &mut state.selected_entities_for_backup;
        if let Some(pos) = selection.iter().position(|n| n == name) {
            selection.remove(pos);
            false
        } else {
            selection.push(name.to_string());
            true
        }
    }

    /// Selects every factory in `names`.
    pub async fn select_all(&self, names: Vec<String>) {
        self.set_selected_entities(names).await;
    }

    /// Empties the selection.
    pub async fn clear_selection(&self) {
        self.state.write().await.selected_entities_for_backup.clear();
    }

    // ── Listing state ──

    /// Returns whether a list fetch is in flight.
    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading_backups
    }

    /// Returns the last fetched backup list.
    pub async fn backup_files(&self) -> Vec<BackupFile> {
        self.state.read().await.backup_files.clone()
    }

    /// True when a namespace is set and at least one factory is selected.
    pub async fn can_backup(&self) -> bool {
        !self.config.namespace().await.is_empty()
            && !self.state.read().await.selected_entities_for_backup.is_empty()
    }

    // ── Operations ──

    /// Saves every selected factory, in selection order, one attempt each.
    ///
    /// The first failure aborts the batch and is returned; the selection is
    /// kept so the user can retry. On success the selection is cleared and
    /// the list refreshed.
    pub async fn perform_backup(&self) -> SyncResult<()> {
        let selection = self.selected_entities().await;
        if selection.is_empty() {
            return Err(SyncError::Validation(
                "no factories selected for backup".into(),
            ));
        }
        let namespace = self.require_namespace().await?;

        info!(
            "Backing up {} factories to {} ({})",
            selection.len(),
            namespace,
            self.store.provider_name()
        );
        for name in &selection {
            let revision = self.registry.get(name).await.map(|e| e.revision);
            if let Err(e) = self.store.save(&namespace, name).await {
                warn!("Backup of {} failed: {}", name, e);
                return Err(e);
            }
            if let Some(revision) = revision {
                self.registry
                    .mark_synced(name, revision, self.clock.now())
                    .await;
            }
            debug!("Backed up {}", name);
        }

        self.clear_selection().await;
        self.refresh_backup_list().await?;
        Ok(())
    }

    /// Restores `file` into its factory.
    pub async fn restore_backup(&self, file: &BackupFile) -> SyncResult<()> {
        let namespace = self.require_namespace().await?;
        let name = backup_entity_name(file)?;

        self.store.restore(&namespace, name).await?;
        self.registry.mark_restored(name, self.clock.now()).await;
        info!("Restored {} from {}", name, namespace);
        Ok(())
    }

    /// Deletes `file` and refreshes the list.
    pub async fn delete_backup(&self, file: &BackupFile) -> SyncResult<()> {
        let namespace = self.require_namespace().await?;
        let name = backup_entity_name(file)?;

        self.store.delete(&namespace, name).await?;
        info!("Deleted backup {} from {}", name, namespace);
        self.refresh_backup_list().await?;
        Ok(())
    }

    /// Re-fetches the backup list, caches it and returns it. Without a
    /// namespace the list is empty and no remote call is made.
    pub async fn refresh_backup_list(&self) -> SyncResult<Vec<BackupFile>> {
        let namespace = self.config.namespace().await;
        if namespace.is_empty() {
            self.state.write().await.backup_files.clear();
            return Ok(Vec::new());
        }

        self.state.write().await.loading_backups = true;
        let result = self.store.list(&namespace).await;

        let mut state = self.state.write().await;
        state.loading_backups = false;
        match result {
            Ok(files) => {
                debug!("Found {} backups in {}", files.len(), namespace);
                state.backup_files = files.clone();
                Ok(files)
            }
            Err(e) => {
                warn!("Failed to list backups in {}: {}", namespace, e);
                state.backup_files.clear();
                Err(e)
            }
        }
    }

    async fn require_namespace(&self) -> SyncResult<String> {
        let namespace = self.config.namespace().await;
        if namespace.is_empty() {
            return Err(SyncError::Validation("no backup namespace set".into()));
        }
        Ok(namespace)
    }
}

fn backup_entity_name(file: &BackupFile) -> SyncResult<&str> {
    file.entity_name()
        .ok_or_else(|| SyncError::Validation(format!("not a factory backup: {}", file.name)))
}
