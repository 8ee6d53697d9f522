//! End-to-end flow tests exercising the record logic against a real
//! database: duplicate merges, vote reconciliation and the batch status
//! refresh.
//!
//! Run with: cargo test --test moderation_flow_test

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use safeguard::admin::update::refresh_statuses;
use safeguard::core::identity::hash_user_id;
use safeguard::records::{
    apply_vote, derive_status, merge_description, push_unique, RecordStatus, Thresholds,
    VoteDirection, VoteOutcome,
};
use safeguard::storage::db::{self, DbPool};
use safeguard::telegram::caption;

fn test_pool(dir: &TempDir) -> DbPool {
    let path = dir.path().join("flow.sqlite");
    db::create_pool(path.to_str().unwrap()).expect("pool creation")
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// A second vouch for the same subject merges instead of duplicating.
#[test]
fn duplicate_vouch_merges_vouchers_votes_and_description() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();
    let thresholds = Thresholds {
        required_upvotes: 2,
        required_downvotes: 2,
    };

    let mut record = db::create_vouch(
        &conn,
        "alice",
        None,
        None,
        "bob",
        &strings(&["bob"]),
        &strings(&["bob"]),
        Some("good trader"),
        RecordStatus::Pending,
    )
    .unwrap();

    // Second voucher arrives.
    push_unique(&mut record.vouchers, "carol");
    let already_voted = record.upvoters.iter().any(|v| v == "carol")
        || record.downvoters.iter().any(|v| v == "carol");
    if !already_voted {
        record.upvoters.push("carol".to_string());
    }
    record.description =
        merge_description(record.description.as_deref(), Some("vouched twice"));
    record.status = derive_status(record.upvoters.len(), record.downvoters.len(), &thresholds);
    db::update_vouch_content(
        &conn,
        record.id,
        &record.vouchers,
        &record.upvoters,
        record.description.as_deref(),
        record.status,
    )
    .unwrap();

    let merged = db::find_vouch_by_subject(&conn, "alice").unwrap().unwrap();
    assert_eq!(merged.vouchers, strings(&["bob", "carol"]));
    assert_eq!(merged.upvoters, strings(&["bob", "carol"]));
    assert_eq!(
        merged.description.as_deref(),
        Some("good trader\n\nvouched twice")
    );
    assert_eq!(merged.status, RecordStatus::Approved);
}

/// A voucher who already downvoted is not force-added to the upvoters.
#[test]
fn merge_does_not_override_an_existing_downvote() {
    let mut upvoters = strings(&["bob"]);
    let downvoters = strings(&["carol"]);

    let already_voted = upvoters.iter().any(|v| v == "carol")
        || downvoters.iter().any(|v| v == "carol");
    if !already_voted {
        upvoters.push("carol".to_string());
    }

    assert_eq!(upvoters, strings(&["bob"]));
    assert_eq!(downvoters, strings(&["carol"]));
}

/// Full toggle cycle persisted through the vote update path.
#[test]
fn vote_presses_toggle_switch_and_persist() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();
    let thresholds = Thresholds::default();

    let mut record = db::create_vouch(
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

    let press = |record: &mut db::VouchRecord, voter: &str, dir: VoteDirection| {
        apply_vote(&mut record.upvoters, &mut record.downvoters, voter, dir)
    };

    assert_eq!(press(&mut record, "carol", VoteDirection::Up), VoteOutcome::Added);
    assert_eq!(press(&mut record, "carol", VoteDirection::Down), VoteOutcome::Switched);
    assert_eq!(press(&mut record, "carol", VoteDirection::Down), VoteOutcome::Removed);

    record.status = derive_status(record.upvoters.len(), record.downvoters.len(), &thresholds);
    db::update_vouch_votes(&conn, record.id, &record.upvoters, &record.downvoters, record.status)
        .unwrap();

    let stored = db::find_vouch_by_subject(&conn, "alice").unwrap().unwrap();
    assert_eq!(stored.upvoters, strings(&["bob"]));
    assert!(stored.downvoters.is_empty());
}

/// Repeat veto submissions by the same user are detectable by hash.
#[test]
fn veto_rejects_duplicate_submitter_by_hash() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    let submitter = hash_user_id(777);
    let record = db::create_veto(
        &conn,
        "mallory",
        None,
        None,
        &strings(&["scam"]),
        &[submitter.clone()],
        &[],
        &[],
        RecordStatus::Pending,
    )
    .unwrap();

    assert!(db::veto_has_submitter(&record, &submitter));
    assert!(!db::veto_has_submitter(&record, &hash_user_id(778)));
}

/// The batch refresh changes exactly the records whose stored status
/// disagrees with the current thresholds.
#[test]
fn refresh_statuses_updates_only_stale_records() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let conn = db::get_connection(&pool).unwrap();

    // Status stored as pending, but two upvotes meet the new threshold.
    db::create_vouch(
        &conn,
        "alice",
        None,
        None,
        "bob",
        &strings(&["bob"]),
        &strings(&["bob", "carol"]),
        None,
        RecordStatus::Pending,
    )
    .unwrap();
    // Already correct.
    db::create_vouch(
        &conn,
        "erin",
        None,
        None,
        "bob",
        &strings(&["bob"]),
        &strings(&["bob"]),
        None,
        RecordStatus::Pending,
    )
    .unwrap();
    // Veto with enough downvotes to flip to rejected.
    db::create_veto(
        &conn,
        "mallory",
        None,
        None,
        &strings(&["scam"]),
        &strings(&["hash-a"]),
        &[],
        &[],
        RecordStatus::Pending,
    )
    .unwrap();
    let veto = db::find_veto_by_subject(&conn, "mallory").unwrap().unwrap();
    db::update_veto_votes(
        &conn,
        veto.id,
        &[],
        &strings(&["x", "y"]),
        RecordStatus::Pending,
    )
    .unwrap();

    let thresholds = Thresholds {
        required_upvotes: 2,
        required_downvotes: 2,
    };
    let report = refresh_statuses(&conn, &thresholds, 7).unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.changes.len(), 2);

    let alice = db::find_vouch_by_subject(&conn, "alice").unwrap().unwrap();
    assert_eq!(alice.status, RecordStatus::Approved);
    let erin = db::find_vouch_by_subject(&conn, "erin").unwrap().unwrap();
    assert_eq!(erin.status, RecordStatus::Pending);
    let mallory = db::find_veto_by_subject(&conn, "mallory").unwrap().unwrap();
    assert_eq!(mallory.status, RecordStatus::Rejected);
}

/// Captions always reflect the stored voter lists.
#[test]
fn captions_track_database_state() {
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

    let caption = caption::vouch_caption(&record);
    assert!(caption.contains("@alice"));
    assert!(caption.contains("✅ Upvotes: 1"));
    assert!(caption.contains("⏳ Pending"));
}
