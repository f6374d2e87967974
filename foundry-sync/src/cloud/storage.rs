//! Remote store abstraction.
//!
//! Defines the namespaced object store the engine writes factories to, and
//! the hook concrete stores use to read and replace a factory's local data.

use crate::error::SyncResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foundry_types::{BackupFile, ConflictInfo};

/// A namespaced remote object store holding one backup file per factory.
///
/// Implementations resolve `name` to `<name>.sfp` inside `namespace`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns the name of the storage provider.
    fn provider_name(&self) -> &'static str;

    /// Uploads the current local copy of a factory.
    async fn save(&self, namespace: &str, name: &str) -> SyncResult<()>;

    /// Replaces the local copy of a factory with its remote backup.
    async fn restore(&self, namespace: &str, name: &str) -> SyncResult<()>;

    /// Deletes a remote backup.
    async fn delete(&self, namespace: &str, name: &str) -> SyncResult<()>;

    /// Lists the backups in a namespace.
    async fn list(&self, namespace: &str) -> SyncResult<Vec<BackupFile>>;

    /// Returns conflict details if the remote copy was written by another
    /// device after this client's last known sync point.
    async fn detect_conflict(&self, namespace: &str, name: &str)
        -> SyncResult<Option<ConflictInfo>>;

    /// Records that the user has seen the remote write stamped `seen` and
    /// chose to keep the local copy. [`detect_conflict`](Self::detect_conflict)
    /// stops reporting remote writes at or before that time.
    async fn acknowledge(&self, namespace: &str, name: &str, seen: DateTime<Utc>);
}

/// Access to a factory's serialized form, owned by the domain layer.
#[async_trait]
pub trait FactorySource: Send + Sync {
    /// Serializes a factory for upload.
    async fn export(&self, name: &str) -> SyncResult<Vec<u8>>;

    /// Replaces a factory with downloaded data.
    async fn import(&self, name: &str, data: Vec<u8>) -> SyncResult<()>;
}
