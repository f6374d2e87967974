#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use foundry_sync::cloud::RemoteStore;
use foundry_sync::{
    AuthFlag, AutoSyncConfig, AutoSyncScheduler, AutoSyncSettings, EntityRegistry, ManualClock,
    SyncError, SyncResult, SyncTimings,
};
use foundry_types::{BackupFile, ConflictInfo};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "Main";

/// Sentinel for "fail every attempt".
pub const ALWAYS: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Save(String),
    Restore(String),
    Delete(String),
    List,
    DetectConflict(String),
    Acknowledge(String),
}

/// In-memory store recording every call.
#[derive(Default)]
pub struct MockStore {
    calls: Mutex<Vec<Call>>,
    save_failures: Mutex<HashMap<String, usize>>,
    conflicts: Mutex<HashMap<String, ConflictInfo>>,
    broken_conflict_checks: Mutex<HashSet<String>>,
    files: Mutex<Vec<BackupFile>>,
    list_fails: Mutex<bool>,
    save_delay: Mutex<Option<Duration>>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn saves(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Save(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn conflict_checks(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::DetectConflict(_)))
            .count()
    }

    /// Makes the next `times` saves of `name` fail.
    pub fn fail_saves(&self, name: &str, times: usize) {
        self.save_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), times);
    }

    pub fn set_conflict(&self, name: &str, info: ConflictInfo) {
        self.conflicts.lock().unwrap().insert(name.to_string(), info);
    }

    pub fn break_conflict_check(&self, name: &str) {
        self.broken_conflict_checks
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    pub fn set_files(&self, files: Vec<BackupFile>) {
        *self.files.lock().unwrap() = files;
    }

    pub fn fail_list(&self, fail: bool) {
        *self.list_fails.lock().unwrap() = fail;
    }

    /// Makes every save take `delay` of tokio time.
    pub fn delay_saves(&self, delay: Duration) {
        *self.save_delay.lock().unwrap() = Some(delay);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    fn provider_name(&self) -> &'static str {
        "Mock"
    }

    async fn save(&self, _namespace: &str, name: &str) -> SyncResult<()> {
        self.record(Call::Save(name.to_string()));
        let delay = *self.save_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut failures = self.save_failures.lock().unwrap();
        match failures.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != ALWAYS {
                    *remaining -= 1;
                }
                Err(SyncError::Network(format!("upload of {name} timed out")))
            }
            _ => Ok(()),
        }
    }

    async fn restore(&self, _namespace: &str, name: &str) -> SyncResult<()> {
        self.record(Call::Restore(name.to_string()));
        Ok(())
    }

    async fn delete(&self, _namespace: &str, name: &str) -> SyncResult<()> {
        self.record(Call::Delete(name.to_string()));
        let mut files = self.files.lock().unwrap();
        files.retain(|f| f.entity_name() != Some(name));
        Ok(())
    }

    async fn list(&self, _namespace: &str) -> SyncResult<Vec<BackupFile>> {
        self.record(Call::List);
        if *self.list_fails.lock().unwrap() {
            return Err(SyncError::Api("503 Service Unavailable".into()));
        }
        Ok(self.files.lock().unwrap().clone())
    }

    async fn detect_conflict(
        &self,
        _namespace: &str,
        name: &str,
    ) -> SyncResult<Option<ConflictInfo>> {
        self.record(Call::DetectConflict(name.to_string()));
        if self.broken_conflict_checks.lock().unwrap().contains(name) {
            return Err(SyncError::Network("metadata request failed".into()));
        }
        Ok(self.conflicts.lock().unwrap().get(name).cloned())
    }

    async fn acknowledge(&self, _namespace: &str, name: &str, seen: DateTime<Utc>) {
        self.record(Call::Acknowledge(name.to_string()));
        let mut conflicts = self.conflicts.lock().unwrap();
        if conflicts.get(name).is_some_and(|c| c.cloud_timestamp <= seen) {
            conflicts.remove(name);
        }
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
}

pub fn conflict_info(name: &str) -> ConflictInfo {
    ConflictInfo {
        entity_name: name.to_string(),
        cloud_timestamp: epoch() + chrono::Duration::minutes(5),
        cloud_instance_id: "7c1e5d0a-2f4b-4e8e-9a51-0b6f3c2d9e11".into(),
        cloud_display_id: "Workshop PC".into(),
        local_timestamp: None,
    }
}

pub fn backup_file(name: &str) -> BackupFile {
    BackupFile {
        id: format!("id-{name}"),
        name: foundry_types::file_name_for_entity(name),
        mime_type: foundry_types::BACKUP_MIME_TYPE.into(),
        modified_time: Some(epoch()),
        created_time: Some(epoch()),
    }
}

pub struct Harness {
    pub store: Arc<MockStore>,
    pub registry: Arc<EntityRegistry>,
    pub config: Arc<AutoSyncConfig>,
    pub auth: Arc<AuthFlag>,
    pub clock: Arc<ManualClock>,
    pub scheduler: Arc<AutoSyncScheduler>,
}

/// Builds an enabled, signed-in engine with `selected` tracked and selected.
pub async fn harness(selected: &[&str]) -> Harness {
    let store = MockStore::new();
    let registry = Arc::new(EntityRegistry::new());
    for name in selected {
        registry.track(*name).await;
    }
    let config = Arc::new(AutoSyncConfig::from_settings(AutoSyncSettings {
        enabled: true,
        namespace: NAMESPACE.into(),
        selected_entities: selected.iter().map(|s| s.to_string()).collect(),
    }));
    let auth = Arc::new(AuthFlag::new(true));
    let clock = Arc::new(ManualClock::new(epoch()));
    let scheduler = Arc::new(AutoSyncScheduler::with_options(
        store.clone(),
        registry.clone(),
        config.clone(),
        auth.clone(),
        &SyncTimings::default(),
        clock.clone(),
    ));

    Harness {
        store,
        registry,
        config,
        auth,
        clock,
        scheduler,
    }
}

impl Harness {
    pub async fn dirty(&self, names: &[&str]) {
        for name in names {
            assert!(self.registry.mark_dirty(name).await, "{name} is not tracked");
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("foundry_sync=debug")
        .with_test_writer()
        .try_init();
}
