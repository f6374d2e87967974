//! Remote backup file metadata.

use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File extension of a factory backup.
pub const BACKUP_EXTENSION: &str = "sfp";

/// Mime type stamped on factory backups.
pub const BACKUP_MIME_TYPE: &str = "application/json";

/// Metadata of a remote object, as returned by a store listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFile {
    /// Store-specific identifier.
    pub id: String,
    /// File name within the namespace, e.g. `Iron Works.sfp`.
    pub name: String,
    /// Mime type reported by the store.
    pub mime_type: String,
    /// Last modification time.
    pub modified_time: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_time: Option<DateTime<Utc>>,
}

impl BackupFile {
    /// Returns the factory name this file backs up, if it follows the naming
    /// convention.
    pub fn entity_name(&self) -> Option<&str> {
        entity_name_from_file(&self.name).ok()
    }
}

/// Returns the remote file name for a factory.
#[must_use]
pub fn file_name_for_entity(entity_name: &str) -> String {
    format!("{entity_name}.{BACKUP_EXTENSION}")
}

/// Strips the backup extension from a remote file name.
pub fn entity_name_from_file(file_name: &str) -> crate::Result<&str> {
    file_name
        .strip_suffix(BACKUP_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| Error::InvalidBackupName(file_name.to_string()))
}
