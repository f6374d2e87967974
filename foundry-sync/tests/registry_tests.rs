mod common;

use chrono::Duration;
use common::{conflict_info, epoch};
use foundry_sync::{EntityRegistry, RegistryEvent};
use foundry_types::SyncStatus;
use pretty_assertions::assert_eq;

async fn registry(names: &[&str]) -> EntityRegistry {
    let registry = EntityRegistry::new();
    for name in names {
        assert!(registry.track(*name).await);
    }
    registry
}

// ── Tracking ────────────────────────────────────────────────────

#[tokio::test]
async fn track_is_idempotent() {
    let registry = registry(&["B", "A"]).await;
    assert!(!registry.track("A").await);
    assert_eq!(registry.names().await, vec!["A", "B"]);
    assert_eq!(
        registry.get("A").await.unwrap().sync_status,
        SyncStatus::Clean
    );
}

#[tokio::test]
async fn untrack_publishes_removal() {
    let registry = registry(&["A"]).await;
    let mut events = registry.subscribe();

    assert!(registry.untrack("A").await.is_some());
    assert!(registry.untrack("A").await.is_none());
    assert!(!registry.contains("A").await);
    assert_eq!(events.try_recv().unwrap(), RegistryEvent::Removed("A".into()));
    assert!(events.try_recv().is_err());
}

// ── Dirty tracking ──────────────────────────────────────────────

#[tokio::test]
async fn mark_dirty_bumps_revision_and_notifies() {
    let registry = registry(&["A"]).await;
    let mut events = registry.subscribe();

    assert!(registry.mark_dirty("A").await);
    assert!(registry.mark_dirty("A").await);
    assert!(!registry.mark_dirty("Ghost").await);

    let a = registry.get("A").await.unwrap();
    assert_eq!(a.sync_status, SyncStatus::Dirty);
    assert_eq!(a.revision, 2);
    assert_eq!(
        events.try_recv().unwrap(),
        RegistryEvent::BecameDirty("A".into())
    );
}

#[tokio::test]
async fn dirty_among_keeps_order_and_drops_repeats() {
    let registry = registry(&["A", "B", "C"]).await;
    registry.mark_dirty("C").await;
    registry.mark_dirty("A").await;

    let selection: Vec<String> = ["C", "B", "Ghost", "A", "C"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(registry.dirty_among(&selection).await, vec!["C", "A"]);
}

// ── Sync outcomes ───────────────────────────────────────────────

#[tokio::test]
async fn mark_synced_cleans_matching_revision() {
    let registry = registry(&["A"]).await;
    registry.mark_dirty("A").await;
    registry.set_sync_error("A", "timed out").await;
    let revision = registry.get("A").await.unwrap().revision;

    registry.mark_synced("A", revision, epoch()).await;

    let a = registry.get("A").await.unwrap();
    assert_eq!(a.sync_status, SyncStatus::Clean);
    assert_eq!(a.last_synced, Some(epoch()));
    assert_eq!(a.last_error, None);
}

#[tokio::test]
async fn mark_synced_with_stale_revision_stays_dirty() {
    let registry = registry(&["A"]).await;
    registry.mark_dirty("A").await;
    let revision = registry.get("A").await.unwrap().revision;
    registry.mark_dirty("A").await;

    registry.mark_synced("A", revision, epoch()).await;

    let a = registry.get("A").await.unwrap();
    assert_eq!(a.sync_status, SyncStatus::Dirty);
    assert_eq!(a.last_synced, Some(epoch()));
}

#[tokio::test]
async fn conflict_is_sticky_until_resolved() {
    let registry = registry(&["A"]).await;
    registry.mark_dirty("A").await;
    registry.set_sync_conflict("A", conflict_info("A")).await;
    let mut events = registry.subscribe();

    assert!(registry.mark_dirty("A").await);
    assert_eq!(
        registry.get("A").await.unwrap().sync_status,
        SyncStatus::Conflict
    );
    assert!(events.try_recv().is_err());

    let resolved_at = epoch() + Duration::minutes(1);
    assert!(registry.resolve_conflict("A", resolved_at).await);
    let a = registry.get("A").await.unwrap();
    assert_eq!(a.sync_status, SyncStatus::Dirty);
    assert_eq!(a.conflict, None);
    assert_eq!(a.last_synced, Some(resolved_at));
    assert_eq!(
        events.try_recv().unwrap(),
        RegistryEvent::BecameDirty("A".into())
    );

    assert!(!registry.resolve_conflict("A", resolved_at).await);
}

#[tokio::test]
async fn mark_restored_clears_everything() {
    let registry = registry(&["A"]).await;
    registry.mark_dirty("A").await;
    registry.set_sync_conflict("A", conflict_info("A")).await;

    registry.mark_restored("A", epoch()).await;

    let a = registry.get("A").await.unwrap();
    assert_eq!(a.sync_status, SyncStatus::Clean);
    assert_eq!(a.conflict, None);
    assert_eq!(a.last_synced, Some(epoch()));
}
