use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use xray_admin::core::account_store::AccountStore;
use xray_admin::error::AccountError;
use xray_admin::models::kind::CredentialKind;

const CONFIG: &str = r#"{
  "inbounds": [
    {
      "protocol": "vmess",
      "settings": {
        "clients": [
          {"id": "1b2f8c1e-0000-4000-8000-000000000001", "alterId": 0
#vmess
          }
        ]
      }
    },
    {
      "protocol": "vless",
      "settings": {
        "clients": [
          {"id": "1b2f8c1e-0000-4000-8000-000000000002"
#vless
          }
        ]
      }
    },
    {
      "protocol": "trojan",
      "settings": {
        "clients": [
          {"password": "seed"
#trojanws
          }
        ]
      }
    }
  ]
}
"#;

fn setup(content: &str) -> (TempDir, PathBuf, AccountStore) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, content).unwrap();
    let store = AccountStore::new(&path).with_lock(dir.path().join("config.lock"));
    (dir, path, store)
}

fn line_count(path: &PathBuf) -> usize {
    fs::read_to_string(path).unwrap().lines().count()
}

#[test]
fn test_add_then_list_round_trip() {
    let (_dir, _path, store) = setup(CONFIG);
    store
        .add(CredentialKind::Vless, "alice", "a6f1-uuid", "2025-01-31", false)
        .unwrap();
    store
        .add(CredentialKind::Vless, "bob", "b7e2-uuid", "2025-02-28", false)
        .unwrap();

    let entries = store.list(CredentialKind::Vless).unwrap();
    assert_eq!(entries.len(), 2);
    // Newest record sits directly below the anchor.
    assert_eq!(entries[0].name, "bob");
    assert_eq!(entries[1].name, "alice");
    assert_eq!(entries[1].identifier, "a6f1-uuid");
    assert_eq!(entries[1].expiry, "2025-01-31");
}

#[test]
fn test_written_lines_follow_marker_grammar() {
    let (_dir, path, store) = setup(CONFIG);
    store
        .add(CredentialKind::Vmess, "carol", "c1-uuid", "2025-03-01", false)
        .unwrap();
    store
        .add(CredentialKind::Trojan, "dave", "s3cret", "2025-03-02", false)
        .unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("#vmess\n### carol 2025-03-01\n},{\"id\": \"c1-uuid\",\"alterId\": 0,\"email\": \"carol\"\n"));
    assert!(content.contains("#trojanws\n#! dave 2025-03-02\n},{\"password\": \"s3cret\",\"email\": \"dave\"\n"));
}

#[test]
fn test_duplicate_add_is_rejected_and_file_unchanged() {
    let (_dir, path, store) = setup(CONFIG);
    store
        .add(CredentialKind::Vmess, "Alice", "id-1", "2025-01-01", false)
        .unwrap();
    let before = fs::read(&path).unwrap();

    let err = store
        .add(CredentialKind::Vmess, "ALICE", "id-2", "2026-01-01", false)
        .unwrap_err();
    assert!(matches!(err, AccountError::AlreadyExists { .. }));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_delete_removes_exactly_the_record_pair() {
    let (_dir, path, store) = setup(CONFIG);
    store
        .add(CredentialKind::Trojan, "eve", "pw-eve", "2025-05-05", false)
        .unwrap();
    store
        .add(CredentialKind::Trojan, "frank", "pw-frank", "2025-05-06", false)
        .unwrap();
    let before = line_count(&path);

    store.delete(CredentialKind::Trojan, "EVE", false).unwrap();

    assert_eq!(line_count(&path), before - 2);
    assert!(!store.exists(CredentialKind::Trojan, "eve").unwrap());
    assert!(store.exists(CredentialKind::Trojan, "frank").unwrap());
}

#[test]
fn test_delete_unknown_name_is_not_found() {
    let (_dir, path, store) = setup(CONFIG);
    let before = fs::read(&path).unwrap();
    let err = store.delete(CredentialKind::Vless, "ghost", false).unwrap_err();
    assert!(matches!(err, AccountError::NotFound { .. }));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_renew_keeps_identifier_and_name_casing() {
    let (_dir, path, store) = setup(CONFIG);
    store
        .add(CredentialKind::Vless, "Grace", "g-uuid", "2025-01-01", false)
        .unwrap();

    store
        .renew(CredentialKind::Vless, "grace", "2025-12-31", false)
        .unwrap();

    let entry = store.find(CredentialKind::Vless, "GRACE").unwrap().unwrap();
    assert_eq!(entry.name, "Grace");
    assert_eq!(entry.expiry, "2025-12-31");
    assert_eq!(entry.identifier, "g-uuid");
    assert!(fs::read_to_string(&path).unwrap().contains("#& Grace 2025-12-31\n"));
}

#[test]
fn test_exists_is_case_insensitive() {
    let (_dir, _path, store) = setup(CONFIG);
    store
        .add(CredentialKind::Vmess, "Heidi", "h-uuid", "2025-01-01", false)
        .unwrap();
    assert!(store.exists(CredentialKind::Vmess, "heidi").unwrap());
    assert!(store.exists(CredentialKind::Vmess, "HEIDI").unwrap());
    assert!(!store.exists(CredentialKind::Vmess, "heid").unwrap());
}

#[test]
fn test_missing_anchor_leaves_file_byte_identical() {
    let content = CONFIG.replace("#trojanws\n", "");
    let (_dir, path, store) = setup(&content);
    let err = store
        .add(CredentialKind::Trojan, "ivan", "pw", "2025-01-01", false)
        .unwrap_err();
    assert!(matches!(err, AccountError::AnchorNotFound { .. }));
    assert_eq!(fs::read_to_string(&path).unwrap(), content);
}

#[test]
fn test_kinds_are_isolated() {
    let (_dir, _path, store) = setup(CONFIG);
    store
        .add(CredentialKind::Vmess, "judy", "j-uuid", "2025-01-01", false)
        .unwrap();
    store
        .add(CredentialKind::Vless, "judy", "j2-uuid", "2025-02-01", false)
        .unwrap();

    store.delete(CredentialKind::Vmess, "judy", false).unwrap();

    assert!(!store.exists(CredentialKind::Vmess, "judy").unwrap());
    assert!(store.exists(CredentialKind::Vless, "judy").unwrap());
    assert!(store.list(CredentialKind::Trojan).unwrap().is_empty());
}

#[test]
fn test_dry_run_reports_edit_without_writing() {
    let (_dir, path, store) = setup(CONFIG);
    let before = fs::read(&path).unwrap();
    let edit = store
        .add(CredentialKind::Vless, "ken", "k-uuid", "2025-01-01", true)
        .unwrap();
    assert_eq!(edit.changes.len(), 1);
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_invalid_name_rejected_before_io() {
    let dir = TempDir::new().unwrap();
    let store = AccountStore::new(dir.path().join("absent.json"));
    let err = store
        .add(CredentialKind::Vmess, "two words", "id", "2025-01-01", false)
        .unwrap_err();
    assert!(matches!(err, AccountError::InvalidField { field: "name", .. }));

    let err = store.list(CredentialKind::Vmess).unwrap_err();
    assert!(matches!(err, AccountError::ConfigMissing(_)));
}

#[test]
fn test_backup_keeps_previous_config() {
    let (_dir, path, store) = setup(CONFIG);
    let store = store.with_backup(true);
    store
        .add(CredentialKind::Vmess, "leo", "l-uuid", "2025-01-01", false)
        .unwrap();
    assert_eq!(fs::read_to_string(store.backup_path()).unwrap(), CONFIG);
    assert!(fs::read_to_string(&path).unwrap().contains("### leo 2025-01-01"));
}

#[cfg(unix)]
#[test]
fn test_symlinked_config_is_written_through() {
    let dir = TempDir::new().unwrap();
    let real = dir.path().join("real.json");
    let link = dir.path().join("config.json");
    fs::write(&real, CONFIG).unwrap();
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let store = AccountStore::new(&link);
    store
        .add(CredentialKind::Vmess, "mona", "m-uuid", "2025-01-01", false)
        .unwrap();

    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert!(fs::read_to_string(&real).unwrap().contains("### mona 2025-01-01"));
    assert!(store.exists(CredentialKind::Vmess, "mona").unwrap());
}
