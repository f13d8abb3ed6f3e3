use amplihack_memory::core::broker::AuditLog;
use amplihack_memory::{
    ErrorKind, ExperienceStore, MemoryConfig, MemoryConnector, MemoryError, NewExperience,
};
use std::fs;
use tempfile::tempdir;

#[test]
fn connect_verify_close_lifecycle() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("nested").join("dir").join("memory.db");

    let mut connector = MemoryConnector::new(&path);
    assert!(!connector.is_connected());
    assert!(!connector.verify_connectivity());

    connector.connect().expect("connect").connect().expect("reconnect is a no-op");
    assert!(path.exists(), "parent directories and file are created");
    assert!(connector.is_connected());
    assert!(connector.verify_connectivity());

    connector.close();
    connector.close();
    assert!(!connector.is_connected());
    assert!(!connector.verify_connectivity());
}

#[test]
fn operations_on_closed_connector_fail_with_infrastructure_errors() {
    let tmp = tempdir().expect("tempdir");
    let mut connector = MemoryConnector::open(tmp.path().join("memory.db")).expect("open");
    connector.close();

    let store = ExperienceStore::new(&connector);
    let err = store
        .store(NewExperience::new("a", "c", "x", "o"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage, "{err}");

    let err = store.recent("a", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Query, "{err}");

    let err = store.get_stats("a").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Query, "{err}");
}

#[test]
fn validation_wins_over_closed_connection() {
    let tmp = tempdir().expect("tempdir");
    let mut connector = MemoryConnector::open(tmp.path().join("memory.db")).expect("open");
    connector.close();

    let store = ExperienceStore::new(&connector);
    let err = store
        .store(NewExperience::new("a", "c", "x", "o").importance(11))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn corrupt_file_is_a_connection_error() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("memory.db");
    fs::write(&path, b"this is definitely not a sqlite database, just some text padding it out to more than one hundred bytes so the header check fails").unwrap();

    let err = MemoryConnector::open(&path).unwrap_err();
    assert!(matches!(err, MemoryError::ConnectionError(_)), "{err}");
}

#[test]
fn unusable_path_is_a_connection_error() {
    let tmp = tempdir().expect("tempdir");

    // parent "directory" is a regular file
    let blocker = tmp.path().join("blocker");
    fs::write(&blocker, b"x").unwrap();
    let err = MemoryConnector::open(blocker.join("memory.db")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection, "{err}");
    assert!(err.to_string().contains("STORAGE_PREFLIGHT_FAILED"));

    // database path is a directory
    let dir = tmp.path().join("is_a_dir");
    fs::create_dir_all(&dir).unwrap();
    let err = MemoryConnector::open(&dir).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection, "{err}");
}

#[test]
fn scoped_closes_after_closure_and_propagates_its_result() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("memory.db");

    let id = MemoryConnector::scoped(&path, |connector| {
        assert!(connector.verify_connectivity());
        ExperienceStore::new(connector).store(NewExperience::new("a", "c", "x", "o"))
    })
    .expect("scoped store");

    let err = MemoryConnector::scoped(&path, |connector| {
        ExperienceStore::new(connector).recent("a", 0)
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let found = MemoryConnector::scoped(&path, |connector| {
        ExperienceStore::new(connector).get("a", &id)
    })
    .expect("scoped get");
    assert!(found.is_some());
}

#[test]
fn scoped_releases_on_panic() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("memory.db");

    let p = path.clone();
    let outcome = std::panic::catch_unwind(move || {
        let _ = MemoryConnector::scoped(&p, |_connector| -> Result<(), MemoryError> {
            panic!("caller bug");
        });
    });
    assert!(outcome.is_err());

    // the file is usable again from a fresh connector
    let connector = MemoryConnector::open(&path).expect("reopen");
    let store = ExperienceStore::new(&connector);
    store.store(NewExperience::new("a", "c", "x", "o")).unwrap();
}

#[test]
fn two_connectors_share_one_file() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("memory.db");

    let writer = MemoryConnector::open(&path).unwrap();
    let reader = MemoryConnector::open(&path).unwrap();

    let id = ExperienceStore::new(&writer)
        .store(NewExperience::new("a", "shared", "x", "o"))
        .unwrap();
    let seen = ExperienceStore::new(&reader).recent("a", 5).unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].id, id);
}

#[test]
fn audit_log_records_each_operation() {
    let tmp = tempdir().expect("tempdir");
    let log_path = tmp.path().join("memory.events.jsonl");
    let config = MemoryConfig::with_db_path(tmp.path().join("memory.db")).audit_log(&log_path);

    {
        let mut connector = MemoryConnector::from_config(config);
        connector.connect().unwrap();
        let store = ExperienceStore::new(&connector);
        store.store(NewExperience::new("agent-9", "c", "x", "o")).unwrap();
        let _ = store.recent("agent-9", 0);
        store.recent("agent-9", 1).unwrap();
    }

    let events = AuditLog::new(&log_path).read_events().unwrap();
    let ops: Vec<&str> = events.iter().map(|e| e.op.as_str()).collect();
    // the rejected limit never reaches the database, so it is not audited
    assert_eq!(ops, vec!["connect", "store", "retrieve", "close"]);
    assert!(events.iter().all(|e| e.status == "success"));
    assert_eq!(events[1].agent_id.as_deref(), Some("agent-9"));
    assert_eq!(events[1].db_id, "memory.db");
}

#[test]
fn audit_log_marks_failures() {
    let tmp = tempdir().expect("tempdir");
    let log_path = tmp.path().join("memory.events.jsonl");
    let config = MemoryConfig::with_db_path(tmp.path().join("memory.db")).audit_log(&log_path);

    let mut connector = MemoryConnector::from_config(config);
    connector.connect().unwrap();
    connector.close();
    let _ = ExperienceStore::new(&connector).store(NewExperience::new("a", "c", "x", "o"));

    let events = AuditLog::new(&log_path).read_events().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.op, "store");
    assert_eq!(last.status, "error");
    assert_eq!(last.error_kind.as_deref(), Some("storage"));
}
