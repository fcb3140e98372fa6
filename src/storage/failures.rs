//! Failure record storage module
//!
//! One row per surfaced upload failure, driving the admin retry
//! workflow. `retry_history` is a JSON array of per-provider attempt
//! entries appended on every admin-triggered retry.

use super::db::DbConnection;
use rusqlite::Result;
use serde::{Deserialize, Serialize};

/// Which side(s) of the dual upload failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    RegularFailed,
    PremiumFailed,
    BothFailed,
    /// Total failure without structured per-provider errors
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::RegularFailed => "regular_failed",
            ErrorCategory::PremiumFailed => "premium_failed",
            ErrorCategory::BothFailed => "both_failed",
            ErrorCategory::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> ErrorCategory {
        match raw {
            "regular_failed" => ErrorCategory::RegularFailed,
            "premium_failed" => ErrorCategory::PremiumFailed,
            "both_failed" => ErrorCategory::BothFailed,
            _ => ErrorCategory::Unknown,
        }
    }
}

/// Retry workflow state of a failure record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureState {
    Open,
    Retrying,
    Resolved,
    ManualRequired,
}

impl FailureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureState::Open => "open",
            FailureState::Retrying => "retrying",
            FailureState::Resolved => "resolved",
            FailureState::ManualRequired => "manual_required",
        }
    }

    pub fn parse(raw: &str) -> FailureState {
        match raw {
            "retrying" => FailureState::Retrying,
            "resolved" => FailureState::Resolved,
            "manual_required" => FailureState::ManualRequired,
            _ => FailureState::Open,
        }
    }
}

/// One entry in the retry history JSON array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryHistoryEntry {
    /// RFC 3339 timestamp of the attempt
    pub timestamp: String,
    /// "regular" or "premium"
    pub provider: String,
    /// Failure-level attempt number
    pub attempt: i64,
    pub success: bool,
}

/// Structure representing a failure record row
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub id: i64,
    /// Parent upload task
    pub upload_id: i64,
    pub category: ErrorCategory,
    pub regular_error: Option<String>,
    pub premium_error: Option<String>,
    /// Admin-triggered retry dispatches so far (capped at 3)
    pub attempt_count: i64,
    pub requires_manual_upload: bool,
    pub state: FailureState,
    /// Raw JSON retry history
    pub retry_history: String,
    pub created_at: String,
    pub updated_at: String,
}

impl FailureRecord {
    /// Parses the stored retry history; malformed JSON reads as empty.
    pub fn history(&self) -> Vec<RetryHistoryEntry> {
        serde_json::from_str(&self.retry_history).unwrap_or_default()
    }
}

/// Parameters for inserting a new failure record
#[derive(Debug)]
pub struct NewFailure<'a> {
    pub upload_id: i64,
    pub category: ErrorCategory,
    pub regular_error: Option<&'a str>,
    pub premium_error: Option<&'a str>,
}

const FAILURE_COLUMNS: &str = "id, upload_id, category, regular_error, premium_error,
        attempt_count, requires_manual_upload, state, retry_history, created_at, updated_at";

fn row_to_failure(row: &rusqlite::Row<'_>) -> Result<FailureRecord> {
    let category: String = row.get(2)?;
    let state: String = row.get(7)?;
    Ok(FailureRecord {
        id: row.get(0)?,
        upload_id: row.get(1)?,
        category: ErrorCategory::parse(&category),
        regular_error: row.get(3)?,
        premium_error: row.get(4)?,
        attempt_count: row.get(5)?,
        requires_manual_upload: row.get::<_, i64>(6)? != 0,
        state: FailureState::parse(&state),
        retry_history: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Inserts a new failure record in state `open` with attempt_count 1
///
/// The first (automatic) upload dispatch counts as the first attempt.
pub fn insert_failure(conn: &DbConnection, failure: &NewFailure) -> Result<i64> {
    conn.execute(
        "INSERT INTO upload_failures (upload_id, category, regular_error, premium_error)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            failure.upload_id,
            failure.category.as_str(),
            failure.regular_error,
            failure.premium_error,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Gets a failure record by ID
pub fn get_failure(conn: &DbConnection, failure_id: i64) -> Result<Option<FailureRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM upload_failures WHERE id = ?",
        FAILURE_COLUMNS
    ))?;
    let mut rows = stmt.query(rusqlite::params![failure_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_failure(row)?)),
        None => Ok(None),
    }
}

/// Gets unresolved failures, newest first (for /failures)
pub fn open_failures(conn: &DbConnection, limit: i64) -> Result<Vec<FailureRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM upload_failures WHERE state != 'resolved' ORDER BY id DESC LIMIT ?",
        FAILURE_COLUMNS
    ))?;
    let failures = stmt
        .query_map(rusqlite::params![limit], row_to_failure)?
        .collect::<Result<Vec<_>>>()?;
    Ok(failures)
}

/// Counts unresolved failures (for /stats)
pub fn open_failure_count(conn: &DbConnection) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM upload_failures WHERE state != 'resolved'",
        [],
        |row| row.get(0),
    )
}

/// Updates the workflow state
pub fn set_state(conn: &DbConnection, failure_id: i64, state: FailureState) -> Result<()> {
    conn.execute(
        "UPDATE upload_failures SET state = ?, updated_at = datetime('now') WHERE id = ?",
        rusqlite::params![state.as_str(), failure_id],
    )?;
    Ok(())
}

/// Increments attempt_count and returns the new value
pub fn bump_attempt(conn: &DbConnection, failure_id: i64) -> Result<i64> {
    conn.execute(
        "UPDATE upload_failures SET attempt_count = attempt_count + 1, updated_at = datetime('now') WHERE id = ?",
        rusqlite::params![failure_id],
    )?;
    conn.query_row(
        "SELECT attempt_count FROM upload_failures WHERE id = ?",
        rusqlite::params![failure_id],
        |row| row.get(0),
    )
}

/// Marks the failure as needing a manual upload; retries stop here
pub fn mark_manual(conn: &DbConnection, failure_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE upload_failures
         SET requires_manual_upload = 1, state = 'manual_required', updated_at = datetime('now')
         WHERE id = ?",
        rusqlite::params![failure_id],
    )?;
    Ok(())
}

/// Marks the failure as resolved
pub fn resolve(conn: &DbConnection, failure_id: i64) -> Result<()> {
    set_state(conn, failure_id, FailureState::Resolved)
}

/// Rewrites the per-side errors and the category after a retry
pub fn update_errors(
    conn: &DbConnection,
    failure_id: i64,
    category: ErrorCategory,
    regular_error: Option<&str>,
    premium_error: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE upload_failures
         SET category = ?, regular_error = ?, premium_error = ?, updated_at = datetime('now')
         WHERE id = ?",
        rusqlite::params![category.as_str(), regular_error, premium_error, failure_id],
    )?;
    Ok(())
}

/// Appends an entry to the JSON retry history
pub fn append_history(conn: &DbConnection, failure_id: i64, entry: &RetryHistoryEntry) -> Result<()> {
    let raw: String = conn.query_row(
        "SELECT retry_history FROM upload_failures WHERE id = ?",
        rusqlite::params![failure_id],
        |row| row.get(0),
    )?;
    let mut history: Vec<RetryHistoryEntry> = serde_json::from_str(&raw).unwrap_or_default();
    history.push(entry.clone());
    let updated = serde_json::to_string(&history).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE upload_failures SET retry_history = ?, updated_at = datetime('now') WHERE id = ?",
        rusqlite::params![updated, failure_id],
    )?;
    Ok(())
}
