use chrono::{Duration, TimeZone, Utc};
use procwatch::lifecycle::LifespanRecord;
use procwatch::storage::{HistorySnapshot, HistoryStore, StoreError};
use std::fs;

fn record(name: &str, pid: u32, start_offset: i64, secs: i64) -> LifespanRecord {
    let start = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
        + Duration::seconds(start_offset)
        + Duration::microseconds(123_457);
    LifespanRecord::new(name.to_string(), pid, start, start + Duration::seconds(secs))
}

#[test]
fn load_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = HistoryStore::load(&dir.path().join("nope.json"));
    assert_eq!(snapshot, HistorySnapshot::default());
    assert!(snapshot.last_updated.is_none());
}

#[test]
fn persist_then_reload_keeps_order_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let written = vec![
        record("b.exe", 2, 0, 3),
        record("a.exe", 1, 1, 90),
        record("b.exe", 7, 5, 1),
    ];
    {
        let store = HistoryStore::open(&path).unwrap();
        for r in &written {
            store.append(r.clone());
        }
        assert_eq!(store.pending(), 3);
        store.persist().unwrap();
        assert_eq!(store.pending(), 0);
        assert!(store.last_updated().is_some());
    }

    let loaded = HistoryStore::load(&path);
    assert_eq!(loaded.history, written);
    assert!(loaded.last_updated.is_some());

    let reopened = HistoryStore::open(&path).unwrap();
    assert_eq!(reopened.records(), written);
    assert_eq!(reopened.pending(), 0);
}

#[test]
fn file_layout_is_versioned_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let store = HistoryStore::open(&path).unwrap();
    store.append(record("app.exe", 100, 0, 2));
    store.persist().unwrap();

    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["version"], 1);
    assert!(doc["last_updated"].is_string());
    let entry = &doc["history"][0];
    assert_eq!(entry["name"], "app.exe");
    assert_eq!(entry["pid"], 100);
    assert_eq!(entry["duration_seconds"], 2.0);
    assert!(entry["start_time"].is_string());
    assert!(entry["end_time"].is_string());
    assert!(!dir.path().join("history.json.tmp").exists());
}

#[test]
fn corrupt_file_starts_empty_and_is_kept_aside() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    fs::write(&path, "{ not json").unwrap();

    assert_eq!(HistoryStore::load(&path), HistorySnapshot::default());
    assert!(path.exists(), "read-only load must not touch the file");

    let store = HistoryStore::open(&path).unwrap();
    assert!(store.is_empty());
    assert!(!path.exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("history.json.corrupt")).unwrap(),
        "{ not json"
    );
}

#[test]
fn unknown_version_is_treated_as_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    fs::write(&path, r#"{"version": 9, "last_updated": null, "history": []}"#).unwrap();
    let store = HistoryStore::open(&path).unwrap();
    assert!(store.is_empty());
    assert!(store.last_updated().is_none());
}

#[cfg(unix)]
#[test]
fn second_writer_is_refused_until_first_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let first = HistoryStore::open(&path).unwrap();
    match HistoryStore::open(&path) {
        Err(StoreError::Locked { .. }) => {}
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("second writer should be refused"),
    }
    drop(first);
    assert!(HistoryStore::open(&path).is_ok());
}

#[test]
fn recent_returns_tail_oldest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::open(dir.path().join("history.json")).unwrap();
    for i in 0..5 {
        store.append(record(&format!("p{i}"), i, i as i64, 1));
    }
    let names: Vec<String> = store.recent(2).into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["p3", "p4"]);
    assert_eq!(store.recent(50).len(), 5);
    assert!(store.recent(0).is_empty());
}

#[test]
fn failed_persist_keeps_memory_and_retries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let store = HistoryStore::open(&path).unwrap();
    store.append(record("x", 1, 0, 4));

    // A directory where the temp file should go makes the write fail.
    let blocker = dir.path().join("history.json.tmp");
    fs::create_dir(&blocker).unwrap();
    assert!(store.persist().is_err());
    assert_eq!(store.len(), 1);
    assert_eq!(store.pending(), 1);
    assert!(store.last_updated().is_none());

    fs::remove_dir(&blocker).unwrap();
    store.persist().unwrap();
    assert_eq!(store.pending(), 0);
    assert_eq!(HistoryStore::load(&path).history.len(), 1);
}

#[test]
fn open_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("deeper").join("history.json");
    let store = HistoryStore::open(&path).unwrap();
    store.persist().unwrap();
    assert!(path.exists());
}

#[test]
fn append_all_counts_every_record_as_pending() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::open(dir.path().join("history.json")).unwrap();
    store.append(record("a", 1, 0, 1));
    store.append_all((0..4).map(|i| record("b", 10 + i, i as i64, 2)));
    store.append_all(Vec::new());
    assert_eq!(store.len(), 5);
    assert_eq!(store.pending(), 5);
    assert_eq!(store.records()[4].pid, 13);
}

#[test]
fn unreadable_history_refuses_to_open_and_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    // a directory in place of the file cannot be read as one
    fs::create_dir(&path).unwrap();

    match HistoryStore::open(&path) {
        Err(StoreError::Io { operation, .. }) => assert_eq!(operation, "read_history"),
        Err(other) => panic!("expected read error, got {other}"),
        Ok(_) => panic!("open must fail on an unreadable history"),
    }
    assert!(path.is_dir());
    assert!(!dir.path().join("history.json.corrupt").exists());
    assert!(HistoryStore::load(&path).history.is_empty());
}
