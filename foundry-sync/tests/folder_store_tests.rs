use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use foundry_sync::cloud::{FactorySource, FolderStore, FolderStoreConfig, RemoteStore};
use foundry_sync::{ManualClock, SyncError, SyncResult};
use foundry_types::WriterIdentity;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// In-memory factories keyed by name.
#[derive(Default)]
struct MemorySource {
    factories: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySource {
    fn with(name: &str, data: &[u8]) -> Arc<Self> {
        let source = Self::default();
        source
            .factories
            .lock()
            .unwrap()
            .insert(name.to_string(), data.to_vec());
        Arc::new(source)
    }

    fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.factories.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl FactorySource for MemorySource {
    async fn export(&self, name: &str) -> SyncResult<Vec<u8>> {
        self.get(name)
            .ok_or_else(|| SyncError::NotFound(format!("factory {name}")))
    }

    async fn import(&self, name: &str, data: Vec<u8>) -> SyncResult<()> {
        self.factories
            .lock()
            .unwrap()
            .insert(name.to_string(), data);
        Ok(())
    }
}

fn store_at(root: &Path, device: &str, source: Arc<MemorySource>) -> FolderStore {
    store_at_minute(root, device, source, 0)
}

/// A store whose clock reads 09:`minute` on the test day.
fn store_at_minute(
    root: &Path,
    device: &str,
    source: Arc<MemorySource>,
    minute: u32,
) -> FolderStore {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 14, 9, minute, 0).unwrap());
    FolderStore::new(
        FolderStoreConfig {
            root: root.to_path_buf(),
            identity: WriterIdentity::generate(device),
        },
        source,
        Arc::new(clock),
    )
}

// ── Save / restore ──────────────────────────────────────────────

#[tokio::test]
async fn save_writes_payload_and_sidecar() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path(), "Laptop", MemorySource::with("Iron Works", b"belts"));

    store.save("Main", "Iron Works").await.unwrap();

    let ns = dir.path().join("Main");
    assert_eq!(std::fs::read(ns.join("Iron Works.sfp")).unwrap(), b"belts");
    let meta = std::fs::read_to_string(ns.join(".Iron Works.sfp.meta.json")).unwrap();
    assert!(meta.contains(&store.identity().instance_id));
    assert!(meta.contains("Laptop"));
}

#[tokio::test]
async fn save_of_unknown_factory_fails() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path(), "Laptop", Arc::new(MemorySource::default()));

    let err = store.save("Main", "Ghost").await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn restore_imports_saved_payload() {
    let dir = TempDir::new().unwrap();
    let source = MemorySource::with("A", b"v1");
    let store = store_at(dir.path(), "Laptop", source.clone());
    store.save("Main", "A").await.unwrap();

    source.import("A", b"local edit".to_vec()).await.unwrap();
    store.restore("Main", "A").await.unwrap();
    assert_eq!(source.get("A").unwrap(), b"v1");
}

#[tokio::test]
async fn restore_of_missing_backup_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path(), "Laptop", Arc::new(MemorySource::default()));

    let err = store.restore("Main", "A").await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn path_escaping_names_are_rejected() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path(), "Laptop", MemorySource::with("A", b"x"));

    for (namespace, name) in [("..", "A"), ("Main", "../A"), ("", "A"), ("Main", "a\\b")] {
        let err = store.save(namespace, name).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)), "{namespace}/{name}");
    }
}

// ── List / delete ───────────────────────────────────────────────

#[tokio::test]
async fn list_skips_sidecars_and_sorts() {
    let dir = TempDir::new().unwrap();
    let source = MemorySource::with("Beta", b"b");
    source.import("Alpha", b"a".to_vec()).await.unwrap();
    let store = store_at(dir.path(), "Laptop", source);

    store.save("Main", "Beta").await.unwrap();
    store.save("Main", "Alpha").await.unwrap();
    std::fs::create_dir(dir.path().join("Main").join("nested")).unwrap();

    let files = store.list("Main").await.unwrap();
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha.sfp", "Beta.sfp"]);
    assert!(files.iter().all(|f| f.id.starts_with("folder-")));
    assert!(files[0].modified_time.is_some());
}

#[tokio::test]
async fn list_of_missing_namespace_is_empty() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path(), "Laptop", Arc::new(MemorySource::default()));

    assert!(store.list("Nowhere").await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_removes_payload_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path(), "Laptop", MemorySource::with("A", b"x"));
    store.save("Main", "A").await.unwrap();

    store.delete("Main", "A").await.unwrap();
    assert!(store.list("Main").await.unwrap().is_empty());
    assert!(!dir.path().join("Main").join(".A.sfp.meta.json").exists());

    store.delete("Main", "A").await.unwrap();
}

// ── Conflict detection ──────────────────────────────────────────

#[tokio::test]
async fn own_writes_are_not_conflicts() {
    let dir = TempDir::new().unwrap();
    let store = store_at(dir.path(), "Laptop", MemorySource::with("A", b"x"));

    assert_eq!(store.detect_conflict("Main", "A").await.unwrap(), None);
    store.save("Main", "A").await.unwrap();
    assert_eq!(store.detect_conflict("Main", "A").await.unwrap(), None);
}

#[tokio::test]
async fn write_from_other_device_is_a_conflict() {
    let dir = TempDir::new().unwrap();
    let laptop = store_at(dir.path(), "Laptop", MemorySource::with("A", b"laptop"));
    let workshop = store_at_minute(
        dir.path(),
        "Workshop PC",
        MemorySource::with("A", b"workshop"),
        5,
    );

    laptop.save("Main", "A").await.unwrap();
    workshop.save("Main", "A").await.unwrap();

    let info = laptop.detect_conflict("Main", "A").await.unwrap().unwrap();
    assert_eq!(info.entity_name, "A");
    assert_eq!(info.cloud_display_id, "Workshop PC");
    assert_eq!(info.cloud_instance_id, workshop.identity().instance_id);
    assert!(info.local_timestamp.is_some());
}

#[tokio::test]
async fn restoring_other_devices_write_clears_conflict() {
    let dir = TempDir::new().unwrap();
    let laptop = store_at(dir.path(), "Laptop", MemorySource::with("A", b"laptop"));
    let workshop = store_at(dir.path(), "Workshop PC", MemorySource::with("A", b"workshop"));

    workshop.save("Main", "A").await.unwrap();
    assert!(laptop.detect_conflict("Main", "A").await.unwrap().is_some());

    laptop.restore("Main", "A").await.unwrap();
    assert_eq!(laptop.detect_conflict("Main", "A").await.unwrap(), None);
}

#[tokio::test]
async fn acknowledged_remote_write_is_not_flagged_again() {
    let dir = TempDir::new().unwrap();
    let laptop = store_at(dir.path(), "Laptop", MemorySource::with("A", b"laptop"));
    let workshop = store_at_minute(
        dir.path(),
        "Workshop PC",
        MemorySource::with("A", b"workshop"),
        5,
    );

    laptop.save("Main", "A").await.unwrap();
    workshop.save("Main", "A").await.unwrap();
    let info = laptop.detect_conflict("Main", "A").await.unwrap().unwrap();

    laptop
        .acknowledge("Main", "A", info.cloud_timestamp)
        .await;
    assert_eq!(laptop.detect_conflict("Main", "A").await.unwrap(), None);

    // An older acknowledgement does not roll the known point back
    laptop
        .acknowledge("Main", "A", Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap())
        .await;
    assert_eq!(laptop.detect_conflict("Main", "A").await.unwrap(), None);

    // A later write from the workshop is a fresh conflict
    let workshop_later = store_at_minute(
        dir.path(),
        "Workshop PC",
        MemorySource::with("A", b"workshop v2"),
        9,
    );
    workshop_later.save("Main", "A").await.unwrap();
    assert!(laptop.detect_conflict("Main", "A").await.unwrap().is_some());
}
