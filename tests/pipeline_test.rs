//! Integration tests for the upload pipeline and the retry ledger
//!
//! Run with: cargo test --test pipeline_test

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duomirror::core::error::AppError;
use duomirror::core::retry::RetryConfig;
use duomirror::storage::db::{create_pool, get_connection, DbPool};
use duomirror::storage::failures::{self, ErrorCategory, FailureState};
use duomirror::storage::uploads::{self, NewUploadTask, UploadStatus};
use duomirror::storage::videos;
use duomirror::upload::ledger::{dispatch_retry, RetryOutcome, RetryTarget};
use duomirror::upload::pipeline::UploadPipeline;
use duomirror::upload::provider::{DualOutcome, HostError, ProviderKind, ProviderResult, UploadRequest, VideoHost};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Gateway double that replays scripted responses in order
struct ScriptedHost {
    dual: Mutex<VecDeque<Result<DualOutcome, HostError>>>,
    single: Mutex<VecDeque<Result<ProviderResult, HostError>>>,
    dual_calls: AtomicU32,
    single_calls: AtomicU32,
}

impl ScriptedHost {
    fn new() -> Self {
        Self {
            dual: Mutex::new(VecDeque::new()),
            single: Mutex::new(VecDeque::new()),
            dual_calls: AtomicU32::new(0),
            single_calls: AtomicU32::new(0),
        }
    }

    fn script_dual(&self, response: Result<DualOutcome, HostError>) {
        self.dual.lock().unwrap().push_back(response);
    }

    fn script_single(&self, response: Result<ProviderResult, HostError>) {
        self.single.lock().unwrap().push_back(response);
    }

    fn dual_calls(&self) -> u32 {
        self.dual_calls.load(Ordering::SeqCst)
    }

    fn single_calls(&self) -> u32 {
        self.single_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoHost for ScriptedHost {
    async fn upload_dual(&self, _request: &UploadRequest) -> Result<DualOutcome, HostError> {
        self.dual_calls.fetch_add(1, Ordering::SeqCst);
        self.dual
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(HostError::Gateway("dual script exhausted".to_string())))
    }

    async fn upload_single(&self, _provider: ProviderKind, _request: &UploadRequest) -> Result<ProviderResult, HostError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.single
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(HostError::Gateway("single script exhausted".to_string())))
    }

    async fn sync_catalog(&self) -> Result<u64, HostError> {
        Ok(0)
    }
}

fn both_ok(regular: &str, premium: &str) -> Result<DualOutcome, HostError> {
    Ok(DualOutcome {
        regular: ProviderResult::ok(ProviderKind::Regular, regular),
        premium: ProviderResult::ok(ProviderKind::Premium, premium),
    })
}

fn premium_down(regular: &str, error: &str) -> Result<DualOutcome, HostError> {
    Ok(DualOutcome {
        regular: ProviderResult::ok(ProviderKind::Regular, regular),
        premium: ProviderResult::err(ProviderKind::Premium, error),
    })
}

fn both_down(error: &str) -> Result<DualOutcome, HostError> {
    Ok(DualOutcome {
        regular: ProviderResult::err(ProviderKind::Regular, error),
        premium: ProviderResult::err(ProviderKind::Premium, error),
    })
}

struct Harness {
    _dir: TempDir,
    db_pool: Arc<DbPool>,
    host: Arc<ScriptedHost>,
    pipeline: UploadPipeline,
}

fn setup() -> Harness {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("test.sqlite");
    let db_pool = Arc::new(create_pool(path.to_str().expect("utf8 path")).expect("Failed to create pool"));
    let host = Arc::new(ScriptedHost::new());
    let host_dyn: Arc<dyn VideoHost> = Arc::clone(&host) as Arc<dyn VideoHost>;
    let pipeline =
        UploadPipeline::new(Arc::clone(&db_pool), host_dyn).with_retry_config(RetryConfig::quick());
    Harness {
        _dir: dir,
        db_pool,
        host,
        pipeline,
    }
}

impl Harness {
    fn host_dyn(&self) -> Arc<dyn VideoHost> {
        Arc::clone(&self.host) as Arc<dyn VideoHost>
    }
}

fn sample_task<'a>() -> NewUploadTask<'a> {
    NewUploadTask {
        chat_id: -100200300,
        message_id: 42,
        user_id: 777,
        file_id: "file-abc",
        file_unique_id: "unique-abc",
        original_filename: "movie.mp4",
        remote_filename: "Ab12Cd34Ef56_movie.mp4",
        file_size: 50 * 1024 * 1024,
        mime_type: "video/mp4",
        duration: 1800,
    }
}

#[tokio::test]
async fn test_dual_success_completes_and_creates_video() {
    let h = setup();
    h.host.script_dual(both_ok("reg1", "prem1"));

    let report = h.pipeline.process(&sample_task()).await.unwrap();
    assert_eq!(report.status, UploadStatus::Completed);
    assert!(report.failure_id.is_none());
    let video_id = report.video_id.unwrap();

    let conn = get_connection(&h.db_pool).unwrap();
    let task = uploads::get_task(&conn, report.upload_id).unwrap().unwrap();
    assert_eq!(task.status, UploadStatus::Completed);
    assert_eq!(task.regular_file_code.as_deref(), Some("reg1"));
    assert_eq!(task.premium_file_code.as_deref(), Some("prem1"));
    assert_eq!(task.video_id, Some(video_id));
    assert!(task.processed_at.is_some());

    let video = videos::get_video(&conn, video_id).unwrap().unwrap();
    assert_eq!(video.title, "movie.mp4");
    assert_eq!(video.regular_file_code.as_deref(), Some("reg1"));

    assert_eq!(h.host.dual_calls(), 1);
}

#[tokio::test]
async fn test_partial_success_records_failure() {
    let h = setup();
    h.host.script_dual(premium_down("reg1", "premium quota exceeded"));

    let report = h.pipeline.process(&sample_task()).await.unwrap();
    assert_eq!(report.status, UploadStatus::PartialSuccess);
    assert!(report.video_id.is_some());

    let conn = get_connection(&h.db_pool).unwrap();
    let failure = failures::get_failure(&conn, report.failure_id.unwrap()).unwrap().unwrap();
    assert_eq!(failure.category, ErrorCategory::PremiumFailed);
    assert_eq!(failure.state, FailureState::Open);
    assert_eq!(failure.attempt_count, 1);
    assert!(failure.regular_error.is_none());
    assert_eq!(failure.premium_error.as_deref(), Some("premium quota exceeded"));

    let task = uploads::get_task(&conn, report.upload_id).unwrap().unwrap();
    assert_eq!(task.regular_file_code.as_deref(), Some("reg1"));
    assert!(task.premium_file_code.is_none());
}

#[tokio::test]
async fn test_both_sides_failing_yields_failed_task() {
    let h = setup();
    h.host.script_dual(both_down("storage maintenance"));

    let report = h.pipeline.process(&sample_task()).await.unwrap();
    assert_eq!(report.status, UploadStatus::Failed);
    assert!(report.video_id.is_none());

    let conn = get_connection(&h.db_pool).unwrap();
    let failure = failures::get_failure(&conn, report.failure_id.unwrap()).unwrap().unwrap();
    assert_eq!(failure.category, ErrorCategory::BothFailed);
    assert_eq!(failure.regular_error.as_deref(), Some("storage maintenance"));
    assert_eq!(failure.premium_error.as_deref(), Some("storage maintenance"));

    // Per-side failures are reported in a successful call; no call retry happens
    assert_eq!(h.host.dual_calls(), 1);
}

#[tokio::test]
async fn test_transient_gateway_errors_are_retried() {
    let h = setup();
    h.host.script_dual(Err(HostError::Gateway("busy".to_string())));
    h.host.script_dual(Err(HostError::Gateway("busy".to_string())));
    h.host.script_dual(both_ok("reg1", "prem1"));

    let report = h.pipeline.process(&sample_task()).await.unwrap();
    assert_eq!(report.status, UploadStatus::Completed);
    assert_eq!(h.host.dual_calls(), 3);
}

#[tokio::test]
async fn test_call_exhaustion_records_unknown_failure() {
    let h = setup();
    for _ in 0..3 {
        h.host.script_dual(Err(HostError::Gateway("busy".to_string())));
    }

    let report = h.pipeline.process(&sample_task()).await.unwrap();
    assert_eq!(report.status, UploadStatus::Failed);
    assert_eq!(h.host.dual_calls(), 3);

    let conn = get_connection(&h.db_pool).unwrap();
    let failure = failures::get_failure(&conn, report.failure_id.unwrap()).unwrap().unwrap();
    assert_eq!(failure.category, ErrorCategory::Unknown);
    assert!(failure.regular_error.is_none());

    let task = uploads::get_task(&conn, report.upload_id).unwrap().unwrap();
    assert!(task.error_message.is_some());
}

#[tokio::test]
async fn test_single_side_retry_resolves_partial_failure() {
    let h = setup();
    h.host.script_dual(premium_down("reg1", "quota"));
    let report = h.pipeline.process(&sample_task()).await.unwrap();
    let failure_id = report.failure_id.unwrap();

    h.host.script_single(Ok(ProviderResult::ok(ProviderKind::Premium, "prem1")));
    let outcome = dispatch_retry(
        &h.db_pool,
        &h.host_dyn(),
        h.pipeline.retry_config(),
        failure_id,
        RetryTarget::Premium,
    )
    .await
    .unwrap();
    assert_eq!(outcome, RetryOutcome::Resolved);
    assert_eq!(h.host.single_calls(), 1);

    let conn = get_connection(&h.db_pool).unwrap();
    let failure = failures::get_failure(&conn, failure_id).unwrap().unwrap();
    assert_eq!(failure.state, FailureState::Resolved);

    let history = failure.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].provider, "premium");
    assert_eq!(history[0].attempt, 2);
    assert!(history[0].success);

    let task = uploads::get_task(&conn, report.upload_id).unwrap().unwrap();
    assert_eq!(task.status, UploadStatus::Completed);
    assert_eq!(task.premium_file_code.as_deref(), Some("prem1"));

    // The catalog row created by the partial success was merged, not duplicated
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
    let video = videos::get_video(&conn, task.video_id.unwrap()).unwrap().unwrap();
    assert_eq!(video.regular_file_code.as_deref(), Some("reg1"));
    assert_eq!(video.premium_file_code.as_deref(), Some("prem1"));
}

#[tokio::test]
async fn test_retry_both_after_total_failure() {
    let h = setup();
    h.host.script_dual(both_down("maintenance"));
    let report = h.pipeline.process(&sample_task()).await.unwrap();
    let failure_id = report.failure_id.unwrap();

    h.host.script_dual(both_ok("reg1", "prem1"));
    let outcome = dispatch_retry(
        &h.db_pool,
        &h.host_dyn(),
        h.pipeline.retry_config(),
        failure_id,
        RetryTarget::Both,
    )
    .await
    .unwrap();
    assert_eq!(outcome, RetryOutcome::Resolved);

    let conn = get_connection(&h.db_pool).unwrap();
    let failure = failures::get_failure(&conn, failure_id).unwrap().unwrap();
    let history = failure.history();
    // One entry per attempted side
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|entry| entry.attempt == 2 && entry.success));
}

#[tokio::test]
async fn test_still_failing_retry_reopens_record() {
    let h = setup();
    h.host.script_dual(premium_down("reg1", "quota"));
    let report = h.pipeline.process(&sample_task()).await.unwrap();
    let failure_id = report.failure_id.unwrap();

    h.host
        .script_single(Ok(ProviderResult::err(ProviderKind::Premium, "still quota")));
    let outcome = dispatch_retry(
        &h.db_pool,
        &h.host_dyn(),
        h.pipeline.retry_config(),
        failure_id,
        RetryTarget::Premium,
    )
    .await
    .unwrap();
    assert_eq!(outcome, RetryOutcome::StillFailing);

    let conn = get_connection(&h.db_pool).unwrap();
    let failure = failures::get_failure(&conn, failure_id).unwrap().unwrap();
    assert_eq!(failure.state, FailureState::Open);
    assert_eq!(failure.attempt_count, 2);
    assert_eq!(failure.category, ErrorCategory::PremiumFailed);
    assert_eq!(failure.premium_error.as_deref(), Some("still quota"));

    let task = uploads::get_task(&conn, report.upload_id).unwrap().unwrap();
    assert_eq!(task.status, UploadStatus::PartialSuccess);
}

#[tokio::test]
async fn test_attempt_cap_refuses_dispatch_without_host_calls() {
    let h = setup();
    h.host.script_dual(both_down("maintenance"));
    let report = h.pipeline.process(&sample_task()).await.unwrap();
    let failure_id = report.failure_id.unwrap();

    {
        let conn = get_connection(&h.db_pool).unwrap();
        conn.execute(
            "UPDATE upload_failures SET attempt_count = 3 WHERE id = ?",
            rusqlite::params![failure_id],
        )
        .unwrap();
    }

    let calls_before = h.host.dual_calls() + h.host.single_calls();
    let outcome = dispatch_retry(
        &h.db_pool,
        &h.host_dyn(),
        h.pipeline.retry_config(),
        failure_id,
        RetryTarget::Both,
    )
    .await
    .unwrap();
    assert_eq!(outcome, RetryOutcome::ManualRequired);
    assert_eq!(h.host.dual_calls() + h.host.single_calls(), calls_before);

    let conn = get_connection(&h.db_pool).unwrap();
    let failure = failures::get_failure(&conn, failure_id).unwrap().unwrap();
    assert!(failure.requires_manual_upload);
    assert_eq!(failure.state, FailureState::ManualRequired);

    // A further dispatch is refused up front
    let outcome = dispatch_retry(
        &h.db_pool,
        &h.host_dyn(),
        h.pipeline.retry_config(),
        failure_id,
        RetryTarget::Both,
    )
    .await
    .unwrap();
    assert_eq!(outcome, RetryOutcome::ManualRequired);
}

#[tokio::test]
async fn test_failed_final_attempt_flags_manual() {
    let h = setup();
    h.host.script_dual(both_down("maintenance"));
    let report = h.pipeline.process(&sample_task()).await.unwrap();
    let failure_id = report.failure_id.unwrap();

    {
        let conn = get_connection(&h.db_pool).unwrap();
        conn.execute(
            "UPDATE upload_failures SET attempt_count = 2 WHERE id = ?",
            rusqlite::params![failure_id],
        )
        .unwrap();
    }

    h.host.script_dual(both_down("still down"));
    let outcome = dispatch_retry(
        &h.db_pool,
        &h.host_dyn(),
        h.pipeline.retry_config(),
        failure_id,
        RetryTarget::Both,
    )
    .await
    .unwrap();
    assert_eq!(outcome, RetryOutcome::ManualRequired);

    let conn = get_connection(&h.db_pool).unwrap();
    let failure = failures::get_failure(&conn, failure_id).unwrap().unwrap();
    assert!(failure.requires_manual_upload);
    assert_eq!(failure.attempt_count, 3);
}

#[tokio::test]
async fn test_retry_of_unknown_or_resolved_failure() {
    let h = setup();

    let outcome = dispatch_retry(
        &h.db_pool,
        &h.host_dyn(),
        h.pipeline.retry_config(),
        999,
        RetryTarget::Both,
    )
    .await
    .unwrap();
    assert_eq!(outcome, RetryOutcome::NotFound);

    h.host.script_dual(premium_down("reg1", "quota"));
    let report = h.pipeline.process(&sample_task()).await.unwrap();
    let failure_id = report.failure_id.unwrap();
    {
        let conn = get_connection(&h.db_pool).unwrap();
        failures::resolve(&conn, failure_id).unwrap();
    }

    let outcome = dispatch_retry(
        &h.db_pool,
        &h.host_dyn(),
        h.pipeline.retry_config(),
        failure_id,
        RetryTarget::Premium,
    )
    .await
    .unwrap();
    assert_eq!(outcome, RetryOutcome::AlreadyResolved);
    assert_eq!(h.host.single_calls(), 0);
}

#[tokio::test]
async fn test_rerun_of_recorded_task_revalidates_and_dispatches() {
    let h = setup();
    h.host.script_dual(both_down("maintenance"));
    let report = h.pipeline.process(&sample_task()).await.unwrap();

    let task = {
        let conn = get_connection(&h.db_pool).unwrap();
        uploads::get_task(&conn, report.upload_id).unwrap().unwrap()
    };

    h.host.script_dual(both_ok("reg1", "prem1"));
    let rerun = h.pipeline.process_existing(&task).await.unwrap();
    assert_eq!(rerun.upload_id, report.upload_id);
    assert_eq!(rerun.status, UploadStatus::Completed);
    assert_eq!(h.host.dual_calls(), 2);
}

#[tokio::test]
async fn test_rerun_refuses_task_failing_acceptance_rules() {
    let h = setup();
    let task = {
        let conn = get_connection(&h.db_pool).unwrap();
        let mut short_clip = sample_task();
        short_clip.duration = 10;
        let id = uploads::insert_task(&conn, &short_clip).unwrap();
        uploads::get_task(&conn, id).unwrap().unwrap()
    };

    let err = h.pipeline.process_existing(&task).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(h.host.dual_calls(), 0);

    // The refused task keeps its recorded status
    let conn = get_connection(&h.db_pool).unwrap();
    let stored = uploads::get_task(&conn, task.id).unwrap().unwrap();
    assert_eq!(stored.status, UploadStatus::Pending);
}
