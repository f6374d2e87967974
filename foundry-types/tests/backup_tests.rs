use foundry_types::{entity_name_from_file, file_name_for_entity, BackupFile, BACKUP_MIME_TYPE};
use proptest::prelude::*;

fn backup(name: &str) -> BackupFile {
    BackupFile {
        id: "file-1".into(),
        name: name.into(),
        mime_type: BACKUP_MIME_TYPE.into(),
        modified_time: None,
        created_time: None,
    }
}

// ── Naming convention ─────────────────────────────────────────────

#[test]
fn file_name_appends_extension() {
    assert_eq!(file_name_for_entity("Iron Works"), "Iron Works.sfp");
}

#[test]
fn entity_name_strips_extension() {
    assert_eq!(entity_name_from_file("Iron Works.sfp").unwrap(), "Iron Works");
}

#[test]
fn entity_name_keeps_inner_dots() {
    assert_eq!(entity_name_from_file("v1.2 Plant.sfp").unwrap(), "v1.2 Plant");
}

#[test]
fn entity_name_rejects_other_files() {
    assert!(entity_name_from_file("notes.txt").is_err());
    assert!(entity_name_from_file("sfp").is_err());
    assert!(entity_name_from_file(".sfp").is_err());
    assert!(entity_name_from_file("Plantsfp").is_err());
}

#[test]
fn backup_file_entity_name() {
    assert_eq!(backup("Steel Mill.sfp").entity_name(), Some("Steel Mill"));
    assert_eq!(backup("readme.md").entity_name(), None);
}

#[test]
fn backup_file_serializes_camel_case() {
    let json = serde_json::to_value(backup("A.sfp")).unwrap();
    assert_eq!(json["mimeType"], BACKUP_MIME_TYPE);
    assert!(json.get("modifiedTime").is_some());
    assert!(json.get("createdTime").is_some());
}

proptest! {
    #[test]
    fn naming_convention_roundtrips(name in "[A-Za-z0-9 ._-]{1,40}") {
        let file = file_name_for_entity(&name);
        prop_assert_eq!(entity_name_from_file(&file).unwrap(), name.as_str());
    }
}
