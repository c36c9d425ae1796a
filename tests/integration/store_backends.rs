//! Integration tests for the metadata store backends

use chrono::{TimeZone, Utc};
use reflect::config::{StorageBackend, StorageConfig};
use reflect::error::ErrorKind;
use reflect::store::{open_store, BackupRecord};
use tempfile::TempDir;

fn record(original_root: &str) -> BackupRecord {
    BackupRecord {
        original_root: original_root.to_string(),
        reflection_root: "/media/usb/photos".to_string(),
        reflection_base: "photos".to_string(),
        reflector_code: "diff".to_string(),
        drive_label: "USB".to_string(),
        change_map_code: "sha256".to_string(),
        mirrored: false,
        last_backup: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()),
        original_map: b"3:/home/me\x020,photos,AAAA,true)|)".to_vec(),
        reflection_map: Vec::new(),
    }
}

/// Records written by one handle are visible after reopening
#[test]
fn test_records_survive_reopen() {
    for backend in [StorageBackend::Sled, StorageBackend::Flat] {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            backend,
            path: temp_dir.path().join("store"),
        };

        {
            let store = open_store(&config).unwrap();
            store.insert(&record("/home/me/photos")).unwrap();
            store.insert(&record("/home/me/a,b")).unwrap();
            store
                .update("/home/me/photos", &mut |r| r.reflection_root.clear())
                .unwrap();
        }

        let store = open_store(&config).unwrap();
        assert_eq!(store.keys().unwrap(), vec!["/home/me/a,b", "/home/me/photos"]);
        let photos = store.get("/home/me/photos").unwrap().unwrap();
        assert!(!photos.reflection_available());
        assert_eq!(photos.original_map, record("x").original_map);
        assert_eq!(store.get("/home/me/a,b").unwrap().unwrap(), record("/home/me/a,b"));
    }
}

/// Deleting and updating absent keys behave the same on every backend
#[test]
fn test_missing_keys() {
    for backend in [StorageBackend::Sled, StorageBackend::Flat] {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&StorageConfig {
            backend,
            path: temp_dir.path().join("store"),
        })
        .unwrap();

        assert!(store.get("/nowhere").unwrap().is_none());
        assert!(!store.delete("/nowhere").unwrap());
        let err = store.update("/nowhere", &mut |_| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
