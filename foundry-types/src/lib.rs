//! Shared sync data types for the Foundry factory planner.
//!
//! This crate defines the plain data contracts exchanged between the
//! auto-sync engine, the backup manager and the remote stores:
//! - Per-factory sync status and bookkeeping
//! - Conflict descriptions produced by remote conflict detection
//! - Remote backup file metadata and the `<Name>.sfp` naming convention
//! - Writer identities stamped on every remote write
//!
//! A factory's production graph is not modelled here; the sync layer only
//! ever sees a factory by its name.

mod backup;
mod conflict;
mod entity;
mod identity;

pub use backup::{
    entity_name_from_file, file_name_for_entity, BackupFile, BACKUP_EXTENSION, BACKUP_MIME_TYPE,
};
pub use conflict::ConflictInfo;
pub use entity::{SyncStatus, TrackedEntity};
pub use identity::WriterIdentity;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid sync status: {0}")]
    InvalidStatus(String),

    #[error("invalid instance id: {0}")]
    InvalidInstanceId(#[from] uuid::Error),

    #[error("not a factory backup file: {0}")]
    InvalidBackupName(String),
}
