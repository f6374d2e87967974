//! Cloud auto-sync engine for Foundry factories.
//!
//! Keeps selected factories backed up to a remote store without user action,
//! and offers the manual backup / restore flows that share the same store.
//!
//! # Architecture
//!
//! - **Registry**: tracked factories and their sync status
//! - **Config**: enabled flag, namespace, selection and the global error slot
//! - **Scheduler**: debounces edits and runs sequential save cycles
//! - **Backup**: user-triggered batch backup, restore and delete
//! - **Cloud**: the [`RemoteStore`](cloud::RemoteStore) seam plus folder and
//!   Google Drive implementations
//!
//! ## Sync Cycle
//!
//! 1. **Edit**: the application calls `EntityRegistry::mark_dirty`
//! 2. **Debounce**: the scheduler waits until edits go quiet
//! 3. **Guard**: skip unless enabled, resumed, signed in and namespaced
//! 4. **Conflict check**: ask the store whether another device wrote the copy
//! 5. **Save**: retried on a fixed schedule; the factory ends clean, dirty with
//!    an error, or in conflict
//!
//! # Example
//!
//! ```no_run
//! use foundry_sync::cloud::{FactorySource, FolderStore, FolderStoreConfig};
//! use foundry_sync::{AuthFlag, AutoSyncConfig, AutoSyncScheduler, EntityRegistry, SystemClock};
//! use foundry_types::WriterIdentity;
//! use std::sync::Arc;
//!
//! # async fn run(source: Arc<dyn FactorySource>) {
//! let store = Arc::new(FolderStore::new(
//!     FolderStoreConfig {
//!         root: "/tmp/foundry-backups".into(),
//!         identity: WriterIdentity::generate("My Laptop"),
//!     },
//!     source,
//!     Arc::new(SystemClock),
//! ));
//! let registry = Arc::new(EntityRegistry::new());
//! let config = Arc::new(AutoSyncConfig::new());
//! let scheduler = AutoSyncScheduler::new(store, registry, config, Arc::new(AuthFlag::new(true)));
//! scheduler.initialize().await;
//! # }
//! ```

mod auth;
mod backup;
mod clock;
pub mod cloud;
mod config;
mod conflict;
mod error;
mod registry;
mod retry;
mod scheduler;
mod shutdown;

pub use auth::{AuthFlag, AuthState};
pub use backup::BackupManager;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AutoSyncConfig, AutoSyncSettings, SyncTimings, DEFAULT_DEBOUNCE, DEFAULT_FRESHNESS_WINDOW,
    DEFAULT_RETRY_DELAYS_MS,
};
pub use conflict::{ConflictCheck, ConflictGuard};
pub use error::{SyncError, SyncResult};
pub use registry::{EntityRegistry, RegistryEvent};
pub use retry::{RetryOutcome, RetryPolicy};
pub use scheduler::{AutoSyncScheduler, CycleReport, SkipReason, SyncEvent};
pub use shutdown::{Shutdown, ShutdownTrigger};
