//! Folder-backed remote store.
//!
//! Writes backups into a directory tree, one sub-directory per namespace.
//! Works for local backups and for cloud drives mounted as folders (iCloud
//! Drive, Dropbox, network shares). Each `<name>.sfp` payload is accompanied
//! by a hidden `.<name>.sfp.meta.json` sidecar recording who wrote it and when.

use super::storage::{FactorySource, RemoteStore};
use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foundry_types::{
    file_name_for_entity, BackupFile, ConflictInfo, WriterIdentity, BACKUP_MIME_TYPE,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Folder store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderStoreConfig {
    /// Directory holding one sub-directory per namespace.
    pub root: PathBuf,
    /// Identity stamped on every write.
    pub identity: WriterIdentity,
}

/// Sidecar written next to each backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteStamp {
    instance_id: String,
    display_id: String,
    saved_at: DateTime<Utc>,
}

/// Folder-backed [`RemoteStore`].
pub struct FolderStore {
    config: FolderStoreConfig,
    source: Arc<dyn FactorySource>,
    clock: Arc<dyn Clock>,
    /// Remote write time last seen by this client, per (namespace, name).
    known_writes: RwLock<HashMap<(String, String), DateTime<Utc>>>,
}

impl FolderStore {
    /// Creates a store rooted at `config.root`.
    pub fn new(
        config: FolderStoreConfig,
        source: Arc<dyn FactorySource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            source,
            clock,
            known_writes: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the identity stamped on writes.
    pub fn identity(&self) -> &WriterIdentity {
        &self.config.identity
    }

    fn namespace_dir(&self, namespace: &str) -> SyncResult<PathBuf> {
        check_segment("namespace", namespace)?;
        Ok(self.config.root.join(namespace))
    }

    fn paths(&self, namespace: &str, name: &str) -> SyncResult<(PathBuf, PathBuf)> {
        check_segment("factory name", name)?;
        let dir = self.namespace_dir(namespace)?;
        let file_name = file_name_for_entity(name);
        let meta = dir.join(format!(".{file_name}.meta.json"));
        Ok((dir.join(file_name), meta))
    }

    async fn read_stamp(path: &Path) -> SyncResult<Option<WriteStamp>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Storage(format!("failed to read write stamp: {e}"))),
        }
    }

    async fn remember_write(&self, namespace: &str, name: &str, at: DateTime<Utc>) {
        self.known_writes
            .write()
            .await
            .insert((namespace.to_string(), name.to_string()), at);
    }

    /// Like `remember_write`, but never moves the known point backwards.
    async fn remember_at_least(&self, namespace: &str, name: &str, at: DateTime<Utc>) {
        let mut known = self.known_writes.write().await;
        let entry = known
            .entry((namespace.to_string(), name.to_string()))
            .or_insert(at);
        if *entry < at {
            *entry = at;
        }
    }

    /// Stable listing id derived from the file path.
    fn path_to_id(path: &Path) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        path.to_string_lossy().hash(&mut hasher);
        format!("folder-{:x}", hasher.finish())
    }

    async fn path_to_backup_file(path: PathBuf) -> SyncResult<BackupFile> {
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| SyncError::Storage(format!("failed to get file metadata: {e}")))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(BackupFile {
            id: Self::path_to_id(&path),
            name,
            mime_type: BACKUP_MIME_TYPE.to_string(),
            modified_time: metadata.modified().ok().map(DateTime::<Utc>::from),
            created_time: metadata.created().ok().map(DateTime::<Utc>::from),
        })
    }
}

/// Rejects names that would escape the store's directory.
fn check_segment(what: &str, value: &str) -> SyncResult<()> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(SyncError::Validation(format!("invalid {what}: {value:?}")));
    }
    Ok(())
}

#[async_trait]
impl RemoteStore for FolderStore {
    fn provider_name(&self) -> &'static str {
        "Folder"
    }

    async fn save(&self, namespace: &str, name: &str) -> SyncResult<()> {
        let (file_path, meta_path) = self.paths(namespace, name)?;
        let data = self.source.export(name).await?;

        if let Some(dir) = file_path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| SyncError::Storage(format!("failed to create namespace: {e}")))?;
        }

        debug!("Writing backup: {:?} ({} bytes)", file_path, data.len());
        fs::write(&file_path, &data)
            .await
            .map_err(|e| SyncError::Storage(format!("failed to write backup: {e}")))?;

        let stamp = WriteStamp {
            instance_id: self.config.identity.instance_id.clone(),
            display_id: self.config.identity.display_id.clone(),
            saved_at: self.clock.now(),
        };
        fs::write(&meta_path, serde_json::to_vec(&stamp)?)
            .await
            .map_err(|e| SyncError::Storage(format!("failed to write write stamp: {e}")))?;

        self.remember_write(namespace, name, stamp.saved_at).await;
        info!("Saved {} to {}", name, namespace);
        Ok(())
    }

    async fn restore(&self, namespace: &str, name: &str) -> SyncResult<()> {
        let (file_path, meta_path) = self.paths(namespace, name)?;

        let data = match fs::read(&file_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SyncError::NotFound(format!("{namespace}/{name}")));
            }
            Err(e) => return Err(SyncError::Storage(format!("failed to read backup: {e}"))),
        };

        self.source.import(name, data).await?;

        if let Some(stamp) = Self::read_stamp(&meta_path).await? {
            self.remember_write(namespace, name, stamp.saved_at).await;
        }
        info!("Restored {} from {}", name, namespace);
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> SyncResult<()> {
        let (file_path, meta_path) = self.paths(namespace, name)?;

        for path in [&file_path, &meta_path] {
            match fs::remove_file(path).await {
                Ok(()) => {}
                // Already gone is fine for delete
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(SyncError::Storage(format!("failed to delete backup: {e}"))),
            }
        }

        self.known_writes
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()));
        info!("Deleted {} from {}", name, namespace);
        Ok(())
    }

    async fn list(&self, namespace: &str) -> SyncResult<Vec<BackupFile>> {
        let dir = self.namespace_dir(namespace)?;

        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SyncError::Storage(format!("failed to read namespace: {e}"))),
        };

        let mut files = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| SyncError::Storage(format!("failed to read directory entry: {e}")))?
        {
            let path = entry.path();

            // Skip directories and sidecars
            if path.is_dir()
                || path
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with('.'))
                    .unwrap_or(false)
            {
                continue;
            }

            match Self::path_to_backup_file(path).await {
                Ok(file) => files.push(file),
                Err(e) => warn!("Skipping file due to error: {e}"),
            }
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn detect_conflict(
        &self,
        namespace: &str,
        name: &str,
    ) -> SyncResult<Option<ConflictInfo>> {
        let (_, meta_path) = self.paths(namespace, name)?;
        let Some(stamp) = Self::read_stamp(&meta_path).await? else {
            return Ok(None);
        };

        if self.config.identity.is_self(&stamp.instance_id) {
            return Ok(None);
        }

        let known = self
            .known_writes
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .copied();

        if known.is_some_and(|seen| stamp.saved_at <= seen) {
            return Ok(None);
        }

        Ok(Some(ConflictInfo {
            entity_name: name.to_string(),
            cloud_timestamp: stamp.saved_at,
            cloud_instance_id: stamp.instance_id,
            cloud_display_id: stamp.display_id,
            local_timestamp: known,
        }))
    }

    async fn acknowledge(&self, namespace: &str, name: &str, seen: DateTime<Utc>) {
        debug!("Acknowledged remote write of {} at {}", name, seen);
        self.remember_at_least(namespace, name, seen).await;
    }
}
