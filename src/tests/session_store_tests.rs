//! Tests for session_store module.

use super::*;
use chrono::TimeZone;
use proptest::prelude::*;
use tempfile::tempdir;

/// Helper to open an isolated store.
fn test_store() -> (tempfile::TempDir, FileSessionStore) {
    let dir = tempdir().expect("Failed to create temp dir");
    let store = FileSessionStore::new(dir.path().join("sessions")).unwrap();
    (dir, store)
}

fn local_time(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Local
        .with_ymd_and_hms(2026, 3, day, hour, minute, 0)
        .single()
        .expect("unambiguous local time")
        .with_timezone(&Utc)
}

fn session(id: &str, project: &str, created_at: DateTime<Utc>) -> TerminalSession {
    TerminalSession {
        id: id.to_string(),
        cwd: PathBuf::from(project),
        title: format!("Terminal {}", id),
        is_ai_mode: false,
        ai_session_id: None,
        output_buffer: String::new(),
        project_path: Some(PathBuf::from(project)),
        created_at,
        updated_at: created_at,
    }
}

#[test]
fn test_put_then_get_roundtrip() {
    let (_dir, store) = test_store();
    let mut s = session("t1", "/repo", local_time(14, 10, 0));
    s.is_ai_mode = true;
    s.ai_session_id = Some("4f1c".to_string());
    s.output_buffer = "$ ls\r\nCargo.toml\r\n".to_string();

    store.put(s.clone()).unwrap();
    let loaded = store.get("t1").unwrap().expect("session should exist");

    assert_eq!(loaded.id, s.id);
    assert_eq!(loaded.ai_session_id.as_deref(), Some("4f1c"));
    assert_eq!(loaded.output_buffer, s.output_buffer);
    assert_eq!(loaded.created_at, s.created_at);
}

#[test]
fn test_put_stamps_updated_at() {
    let (_dir, store) = test_store();
    let old = local_time(1, 9, 0);
    store.put(session("t1", "/repo", old)).unwrap();

    let loaded = store.get("t1").unwrap().unwrap();
    assert_eq!(loaded.created_at, old);
    assert!(loaded.updated_at > old);
}

#[test]
fn test_put_trims_output_buffer() {
    let dir = tempdir().unwrap();
    let store = FileSessionStore::new(dir.path().to_path_buf())
        .unwrap()
        .with_max_output_bytes(8);
    let mut s = session("t1", "/repo", local_time(14, 10, 0));
    s.output_buffer = "0123456789abcdef".to_string();

    store.put(s).unwrap();
    assert_eq!(store.get("t1").unwrap().unwrap().output_buffer, "89abcdef");
}

#[test]
fn test_get_missing_returns_none() {
    let (_dir, store) = test_store();
    assert!(store.get("nope").unwrap().is_none());
}

#[test]
fn test_remove_is_idempotent() {
    let (_dir, store) = test_store();
    store.put(session("t1", "/repo", local_time(14, 10, 0))).unwrap();

    store.remove("t1").unwrap();
    store.remove("t1").unwrap();
    store.remove("never-existed").unwrap();
    assert!(store.get("t1").unwrap().is_none());
}

#[test]
fn test_path_like_ids_are_rejected() {
    let (_dir, store) = test_store();
    assert!(store.get("../escape").is_err());
    assert!(store.put(session("a/b", "/repo", Utc::now())).is_err());
    assert!(store.remove("").is_err());
}

#[test]
fn test_list_by_date_scopes_and_orders() {
    let (_dir, store) = test_store();
    store.put(session("late", "/repo", local_time(14, 18, 0))).unwrap();
    store.put(session("early", "/repo", local_time(14, 8, 30))).unwrap();
    store.put(session("middle", "/repo", local_time(14, 12, 0))).unwrap();
    store.put(session("other-day", "/repo", local_time(13, 12, 0))).unwrap();
    store.put(session("other-project", "/elsewhere", local_time(14, 12, 0))).unwrap();

    let mut unscoped = session("no-project", "/repo", local_time(14, 12, 0));
    unscoped.project_path = None;
    store.put(unscoped).unwrap();

    let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
    let ids: Vec<String> = store
        .list_by_date(date, Path::new("/repo"))
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();

    assert_eq!(ids, vec!["early", "middle", "late"]);
}

#[test]
fn test_list_dates_counts_newest_first() {
    let (_dir, store) = test_store();
    store.put(session("a", "/repo", local_time(12, 9, 0))).unwrap();
    store.put(session("b", "/repo", local_time(14, 9, 0))).unwrap();
    store.put(session("c", "/repo", local_time(14, 11, 0))).unwrap();
    store.put(session("d", "/other", local_time(15, 11, 0))).unwrap();

    let dates = store.list_dates(Path::new("/repo")).unwrap();
    assert_eq!(
        dates,
        vec![
            SessionDateSummary {
                date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                session_count: 2,
            },
            SessionDateSummary {
                date: NaiveDate::from_ymd_opt(2026, 3, 12).unwrap(),
                session_count: 1,
            },
        ]
    );
}

#[test]
fn test_corrupt_files_are_skipped_when_listing() {
    let (_dir, store) = test_store();
    store.put(session("good", "/repo", local_time(14, 9, 0))).unwrap();
    fs::write(store.dir().join("broken.json"), "{ not json").unwrap();
    fs::write(store.dir().join("notes.txt"), "ignored").unwrap();

    let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
    let sessions = store.list_by_date(date, Path::new("/repo")).unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(store.get("broken").is_err());
}

#[test]
fn test_persist_all_then_list_by_date_matches_snapshot() {
    let (_dir, store) = test_store();
    let created = local_time(14, 10, 0);
    let mut first = session("t1", "/repo", created);
    first.output_buffer = "hello".to_string();
    let mut second = session("t2", "/repo", created + chrono::Duration::minutes(5));
    second.is_ai_mode = true;
    second.ai_session_id = Some("abc".to_string());

    store
        .persist_all(vec![first.clone(), second.clone()])
        .unwrap();

    let listed = store
        .list_by_date(first.created_date(), Path::new("/repo"))
        .unwrap();
    assert_eq!(listed.len(), 2);
    for (stored, live) in listed.iter().zip([&first, &second]) {
        assert_eq!(stored.id, live.id);
        assert_eq!(stored.cwd, live.cwd);
        assert_eq!(stored.title, live.title);
        assert_eq!(stored.is_ai_mode, live.is_ai_mode);
        assert_eq!(stored.ai_session_id, live.ai_session_id);
        assert_eq!(stored.output_buffer, live.output_buffer);
        assert_eq!(stored.project_path, live.project_path);
        assert_eq!(stored.created_at, live.created_at);
    }
}

#[test]
fn test_persist_all_attempts_every_session() {
    let (_dir, store) = test_store();
    let result = store.persist_all(vec![
        session("bad/id", "/repo", Utc::now()),
        session("good", "/repo", Utc::now()),
    ]);

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("1 of 2"));
    assert!(store.get("good").unwrap().is_some());
}

#[test]
fn test_cleanup_older_than_removes_stale_sessions() {
    let (_dir, store) = test_store();
    store.put(session("fresh", "/repo", Utc::now())).unwrap();

    // Write a stale record directly so `put` does not refresh updated_at.
    let mut stale = session("stale", "/repo", Utc::now() - chrono::Duration::days(90));
    stale.updated_at = stale.created_at;
    fs::write(
        store.dir().join("stale.json"),
        serde_json::to_string(&stale).unwrap(),
    )
    .unwrap();

    let deleted = store.cleanup_older_than(30).unwrap();
    assert_eq!(deleted, vec!["stale".to_string()]);
    assert!(store.get("fresh").unwrap().is_some());
    assert!(store.get("stale").unwrap().is_none());
}

#[test]
fn test_project_dir_falls_back_to_project_path() {
    let mut s = session("t1", "/repo", Utc::now());
    assert_eq!(s.project_dir(), Path::new("/repo"));

    s.cwd = PathBuf::new();
    assert_eq!(s.project_dir(), Path::new("/repo"));
}

#[test]
fn test_trim_to_tail_respects_char_boundaries() {
    let mut buffer = "aé€".to_string(); // 1 + 2 + 3 bytes
    trim_to_tail(&mut buffer, 4);
    assert_eq!(buffer, "€");
}

proptest! {
    #[test]
    fn prop_trim_to_tail_keeps_bounded_suffix(input in "\\PC{0,64}", max in 1usize..40) {
        let mut buffer = input.clone();
        trim_to_tail(&mut buffer, max);

        prop_assert!(buffer.len() <= max);
        prop_assert!(input.ends_with(&buffer));
        if input.len() <= max {
            prop_assert_eq!(&buffer, &input);
        }
    }
}
