//! Remote stores for factory backups.
//!
//! Provides the [`RemoteStore`] abstraction plus two implementations: a
//! folder-backed store and a Google Drive store.

pub mod folder;
pub mod google_drive;
pub mod storage;

pub use folder::{FolderStore, FolderStoreConfig};
pub use google_drive::{DriveConfig, DriveStore};
pub use storage::{FactorySource, RemoteStore};
