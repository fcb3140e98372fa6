//! Integration tests for the group-upload admission gates and the
//! retry-callback plumbing
//!
//! Run with: cargo test --test handlers_test

use std::sync::Arc;

use duomirror::storage::db::{create_pool, get_connection, DbPool};
use duomirror::storage::uploads::{self, NewUploadTask};
use duomirror::storage::groups;
use duomirror::telegram::handlers::uploads::{admit_upload, SkipReason, UploadDecision};
use duomirror::upload::classifier::{FileInfo, RejectReason};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const ADMIN_ID: i64 = 777;
const WATCHED_CHAT: i64 = -100200300;

fn setup() -> (TempDir, Arc<DbPool>) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("test.sqlite");
    let db_pool = Arc::new(create_pool(path.to_str().expect("utf8 path")).expect("Failed to create pool"));
    {
        let conn = get_connection(&db_pool).unwrap();
        groups::seed_admins(&conn, &[ADMIN_ID]).unwrap();
        groups::add_group(&conn, WATCHED_CHAT, "Premium Group").unwrap();
    }
    (dir, db_pool)
}

fn sample_info(duration: i64) -> FileInfo {
    FileInfo {
        file_id: "file-abc".to_string(),
        file_unique_id: "unique-abc".to_string(),
        original_filename: "movie.mp4".to_string(),
        file_size: 50 * 1024 * 1024,
        mime_type: "video/mp4".to_string(),
        duration,
        dimensions: Some((1280, 720)),
    }
}

fn task_count(db_pool: &Arc<DbPool>) -> i64 {
    let conn = get_connection(db_pool).unwrap();
    conn.query_row("SELECT COUNT(*) FROM uploads", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn test_non_admin_sender_is_dropped_without_task() {
    let (_dir, db_pool) = setup();

    let decision = admit_upload(&db_pool, Some(999), WATCHED_CHAT, Some(sample_info(1800))).unwrap();
    assert_eq!(decision, UploadDecision::Skip(SkipReason::SenderNotAdmin));
    assert_eq!(task_count(&db_pool), 0);
}

#[test]
fn test_anonymous_sender_is_dropped() {
    let (_dir, db_pool) = setup();

    let decision = admit_upload(&db_pool, None, WATCHED_CHAT, Some(sample_info(1800))).unwrap();
    assert_eq!(decision, UploadDecision::Skip(SkipReason::SenderNotAdmin));
}

#[test]
fn test_unwatched_group_is_dropped() {
    let (_dir, db_pool) = setup();

    let decision = admit_upload(&db_pool, Some(ADMIN_ID), -100999999, Some(sample_info(1800))).unwrap();
    assert_eq!(decision, UploadDecision::Skip(SkipReason::GroupNotWatched));
}

#[test]
fn test_short_clip_is_silently_rejected_without_task() {
    let (_dir, db_pool) = setup();

    let decision = admit_upload(&db_pool, Some(ADMIN_ID), WATCHED_CHAT, Some(sample_info(10))).unwrap();
    assert_eq!(
        decision,
        UploadDecision::Skip(SkipReason::Rejected(RejectReason::TooShort))
    );
    assert_eq!(task_count(&db_pool), 0);
}

#[test]
fn test_non_video_payload_is_dropped() {
    let (_dir, db_pool) = setup();

    let decision = admit_upload(&db_pool, Some(ADMIN_ID), WATCHED_CHAT, None).unwrap();
    assert_eq!(decision, UploadDecision::Skip(SkipReason::NotAVideo));
}

#[test]
fn test_duplicate_candidate_is_dropped() {
    let (_dir, db_pool) = setup();
    let info = sample_info(1800);

    let existing_id = {
        let conn = get_connection(&db_pool).unwrap();
        uploads::insert_task(
            &conn,
            &NewUploadTask {
                chat_id: WATCHED_CHAT,
                message_id: 42,
                user_id: ADMIN_ID,
                file_id: &info.file_id,
                file_unique_id: &info.file_unique_id,
                original_filename: &info.original_filename,
                remote_filename: "Ab12Cd34Ef56_movie.mp4",
                file_size: info.file_size,
                mime_type: &info.mime_type,
                duration: info.duration,
            },
        )
        .unwrap()
    };

    let decision = admit_upload(&db_pool, Some(ADMIN_ID), WATCHED_CHAT, Some(info)).unwrap();
    assert_eq!(decision, UploadDecision::Skip(SkipReason::Duplicate(existing_id)));
    assert_eq!(task_count(&db_pool), 1);
}

#[test]
fn test_valid_candidate_from_admin_is_accepted() {
    let (_dir, db_pool) = setup();
    let info = sample_info(1800);

    let decision = admit_upload(&db_pool, Some(ADMIN_ID), WATCHED_CHAT, Some(info.clone())).unwrap();
    assert_eq!(decision, UploadDecision::Accept(info));
}
