//! Integration tests for the storage layer against a real SQLite file.
//!
//! Run with: cargo test --test storage_test

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use safeguard::records::{RecordStatus, Thresholds};
use safeguard::storage::db::{self, DbPool};

fn test_pool(dir: &TempDir) -> DbPool {
    let path = dir.path().join("test.sqlite");
    db::create_pool(path.to_str().unwrap()).expect("pool creation")
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn vouch_round_trip_and_case_insensitive_lookup() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    let record = db::create_vouch(
        &conn,
        "alice",
        None,
        None,
        "bob",
        &strings(&["bob"]),
        &strings(&["bob"]),
        Some("solid trader"),
        RecordStatus::Pending,
    )
    .unwrap();

    assert_eq!(record.subject, "alice");
    assert_eq!(record.vouchers, strings(&["bob"]));
    assert_eq!(record.upvoters, strings(&["bob"]));
    assert!(record.downvoters.is_empty());
    assert_eq!(record.description.as_deref(), Some("solid trader"));

    let found = db::find_vouch_by_subject(&conn, "ALICE").unwrap().unwrap();
    assert_eq!(found.id, record.id);
    assert!(db::find_vouch_by_subject(&conn, "nobody").unwrap().is_none());
}

#[test]
fn vouch_message_binding_and_lookup_by_message() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    let record = db::create_vouch(
        &conn,
        "alice",
        None,
        None,
        "bob",
        &strings(&["bob"]),
        &strings(&["bob"]),
        None,
        RecordStatus::Pending,
    )
    .unwrap();
    db::update_vouch_message(&conn, record.id, -100123, 42).unwrap();

    let found = db::find_vouch_by_message(&conn, -100123, 42).unwrap().unwrap();
    assert_eq!(found.id, record.id);
    assert_eq!(found.chat_id, Some(-100123));
    assert_eq!(found.message_id, Some(42));
    assert!(db::find_vouch_by_message(&conn, -100123, 43).unwrap().is_none());
}

#[test]
fn vouch_votes_persist_with_status() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    let record = db::create_vouch(
        &conn,
        "alice",
        None,
        None,
        "bob",
        &strings(&["bob"]),
        &strings(&["bob"]),
        None,
        RecordStatus::Pending,
    )
    .unwrap();

    db::update_vouch_votes(
        &conn,
        record.id,
        &strings(&["bob", "carol"]),
        &strings(&["dave"]),
        RecordStatus::Approved,
    )
    .unwrap();

    let found = db::find_vouch_by_subject(&conn, "alice").unwrap().unwrap();
    assert_eq!(found.upvoters, strings(&["bob", "carol"]));
    assert_eq!(found.downvoters, strings(&["dave"]));
    assert_eq!(found.status, RecordStatus::Approved);
}

#[test]
fn deleting_a_vouch_untracks_it() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    let record = db::create_vouch(
        &conn,
        "alice",
        None,
        None,
        "bob",
        &strings(&["bob"]),
        &strings(&["bob"]),
        None,
        RecordStatus::Pending,
    )
    .unwrap();
    db::delete_vouch(&conn, record.id).unwrap();
    assert!(db::find_vouch_by_subject(&conn, "alice").unwrap().is_none());
}

#[test]
fn veto_round_trip_tracks_submitter_hashes() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    let record = db::create_veto(
        &conn,
        "mallory",
        None,
        None,
        &strings(&["scammed me"]),
        &strings(&["hash-a"]),
        &strings(&["bob"]),
        &strings(&["file-1", "file-2"]),
        RecordStatus::Pending,
    )
    .unwrap();

    assert!(db::veto_has_submitter(&record, "hash-a"));
    assert!(!db::veto_has_submitter(&record, "hash-b"));
    assert_eq!(record.images, strings(&["file-1", "file-2"]));

    let found = db::find_veto_by_subject(&conn, "Mallory").unwrap().unwrap();
    assert_eq!(found.id, record.id);
    assert_eq!(found.feedback, strings(&["scammed me"]));
}

#[test]
fn veto_merge_appends_feedback_and_submitters() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    let record = db::create_veto(
        &conn,
        "mallory",
        None,
        None,
        &strings(&["scammed me"]),
        &strings(&["hash-a"]),
        &strings(&["bob"]),
        &[],
        RecordStatus::Pending,
    )
    .unwrap();

    db::update_veto_content(
        &conn,
        record.id,
        &strings(&["scammed me", "fake account"]),
        &strings(&["hash-a", "hash-b"]),
        &strings(&["bob", "carol"]),
        &strings(&["file-1"]),
        RecordStatus::Pending,
    )
    .unwrap();

    let found = db::find_veto_by_subject(&conn, "mallory").unwrap().unwrap();
    assert_eq!(found.feedback.len(), 2);
    assert!(db::veto_has_submitter(&found, "hash-b"));
    assert_eq!(found.upvoters, strings(&["bob", "carol"]));
    assert_eq!(found.images, strings(&["file-1"]));
}

#[test]
fn thresholds_default_until_settings_exist_then_latest_wins() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    assert_eq!(db::current_thresholds(&conn).unwrap(), Thresholds::default());

    db::create_settings(
        &conn,
        &Thresholds {
            required_upvotes: 5,
            required_downvotes: 2,
        },
    )
    .unwrap();
    db::create_settings(
        &conn,
        &Thresholds {
            required_upvotes: 7,
            required_downvotes: 4,
        },
    )
    .unwrap();

    let current = db::current_thresholds(&conn).unwrap();
    assert_eq!(current.required_upvotes, 7);
    assert_eq!(current.required_downvotes, 4);
}

#[test]
fn recent_record_listing_includes_fresh_rows() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    db::create_vouch(
        &conn,
        "alice",
        None,
        None,
        "bob",
        &strings(&["bob"]),
        &strings(&["bob"]),
        None,
        RecordStatus::Pending,
    )
    .unwrap();
    db::create_veto(
        &conn,
        "mallory",
        None,
        None,
        &strings(&["bad"]),
        &strings(&["hash-a"]),
        &[],
        &[],
        RecordStatus::Pending,
    )
    .unwrap();

    assert_eq!(db::list_vouches_since(&conn, 1).unwrap().len(), 1);
    assert_eq!(db::list_vetoes_since(&conn, 1).unwrap().len(), 1);
    assert_eq!(db::list_all_vouches(&conn).unwrap().len(), 1);
    assert_eq!(db::list_all_vetoes(&conn).unwrap().len(), 1);
}

#[test]
fn schema_init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.sqlite");
    let pool = db::create_pool(path.to_str().unwrap()).unwrap();
    drop(pool);
    // Opening the same file again must not fail or wipe data.
    let pool = db::create_pool(path.to_str().unwrap()).unwrap();
    let conn = db::get_connection(&pool).unwrap();
    db::init_schema(&conn).unwrap();
}

#[test]
fn since_listing_scopes_by_creation_date_not_updates() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    let vouch = db::create_vouch(
        &conn,
        "alice",
        None,
        None,
        "bob",
        &strings(&["bob"]),
        &strings(&["bob"]),
        None,
        RecordStatus::Pending,
    )
    .unwrap();
    let veto = db::create_veto(
        &conn,
        "mallory",
        None,
        None,
        &strings(&["bad"]),
        &strings(&["hash-a"]),
        &[],
        &[],
        RecordStatus::Pending,
    )
    .unwrap();

    let old = (chrono::Utc::now() - chrono::Duration::days(90)).to_rfc3339();
    conn.execute(
        "UPDATE vouches SET created_at = ?1",
        &[&old as &dyn rusqlite::ToSql],
    )
    .unwrap();
    conn.execute(
        "UPDATE vetoes SET created_at = ?1",
        &[&old as &dyn rusqlite::ToSql],
    )
    .unwrap();

    // A fresh vote write bumps updated_at but must not pull the record
    // back into the window.
    db::update_vouch_votes(&conn, vouch.id, &strings(&["bob"]), &[], RecordStatus::Pending)
        .unwrap();
    db::update_veto_votes(&conn, veto.id, &strings(&["z"]), &[], RecordStatus::Pending).unwrap();

    assert!(db::list_vouches_since(&conn, 30).unwrap().is_empty());
    assert!(db::list_vetoes_since(&conn, 30).unwrap().is_empty());
    assert_eq!(db::list_vouches_since(&conn, 365).unwrap().len(), 1);
    assert_eq!(db::list_vetoes_since(&conn, 365).unwrap().len(), 1);
}

#[test]
fn vetoes_are_listed_by_submitter_hash() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    db::create_veto(
        &conn,
        "mallory",
        None,
        None,
        &strings(&["bad"]),
        &strings(&["hash-a"]),
        &[],
        &[],
        RecordStatus::Pending,
    )
    .unwrap();
    db::create_veto(
        &conn,
        "trudy",
        None,
        None,
        &strings(&["worse"]),
        &strings(&["hash-b", "hash-a"]),
        &[],
        &[],
        RecordStatus::Pending,
    )
    .unwrap();

    let mine: Vec<String> = db::list_vetoes_by_submitter(&conn, "hash-a")
        .unwrap()
        .into_iter()
        .map(|r| r.subject)
        .collect();
    assert_eq!(mine.len(), 2);
    assert!(mine.contains(&"mallory".to_string()));

    let theirs = db::list_vetoes_by_submitter(&conn, "hash-b").unwrap();
    assert_eq!(theirs.len(), 1);
    assert_eq!(theirs[0].subject, "trudy");

    assert!(db::list_vetoes_by_submitter(&conn, "hash-c").unwrap().is_empty());
}

#[test]
fn vouch_can_be_retargeted_to_a_new_subject() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    let record = db::create_vouch(
        &conn,
        "alice",
        None,
        None,
        "bob",
        &strings(&["bob"]),
        &strings(&["bob"]),
        Some("solid"),
        RecordStatus::Pending,
    )
    .unwrap();

    db::update_vouch_subject(&conn, record.id, "alicia").unwrap();

    assert!(db::find_vouch_by_subject(&conn, "alice").unwrap().is_none());
    let moved = db::find_vouch_by_subject(&conn, "alicia").unwrap().unwrap();
    assert_eq!(moved.id, record.id);
    assert_eq!(moved.upvoters, strings(&["bob"]));
    assert_eq!(moved.description.as_deref(), Some("solid"));
}
