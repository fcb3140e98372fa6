//! Upload task storage module
//!
//! One row per accepted group video. Rows are never deleted, only
//! status-transitioned, so they double as the audit trail and the
//! duplicate-suppression index.

use super::db::DbConnection;
use rusqlite::Result;

/// Lifecycle status of an upload task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    PartialSuccess,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Processing => "processing",
            UploadStatus::Completed => "completed",
            UploadStatus::PartialSuccess => "partial_success",
            UploadStatus::Failed => "failed",
        }
    }

    /// Parses a stored status string; unknown values read back as `Pending`.
    pub fn parse(raw: &str) -> UploadStatus {
        match raw {
            "processing" => UploadStatus::Processing,
            "completed" => UploadStatus::Completed,
            "partial_success" => UploadStatus::PartialSuccess,
            "failed" => UploadStatus::Failed,
            _ => UploadStatus::Pending,
        }
    }

    /// True once the task reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Completed | UploadStatus::PartialSuccess | UploadStatus::Failed
        )
    }
}

/// Structure representing an upload task row
#[derive(Debug, Clone)]
pub struct UploadTask {
    /// Unique ID of the task
    pub id: i64,
    /// Chat where the source message was posted
    pub chat_id: i64,
    /// Source message ID
    pub message_id: i32,
    /// Telegram ID of the posting admin
    pub user_id: i64,
    /// Telegram file_id for retrieval
    pub file_id: String,
    /// Telegram file_unique_id for deduplication
    pub file_unique_id: String,
    /// Original filename from Telegram
    pub original_filename: String,
    /// Generated collision-resistant name used at the host
    pub remote_filename: String,
    /// File size in bytes
    pub file_size: i64,
    /// MIME type
    pub mime_type: String,
    /// Duration in seconds
    pub duration: i64,
    /// Current lifecycle status
    pub status: UploadStatus,
    /// Attempt-in-flight note ("retry attempt 2/3")
    pub status_note: Option<String>,
    /// File code on the regular hosting account
    pub regular_file_code: Option<String>,
    /// File code on the premium hosting account
    pub premium_file_code: Option<String>,
    /// Last call-level error, if any
    pub error_message: Option<String>,
    /// Linked video record, once any side succeeded
    pub video_id: Option<i64>,
    /// Creation timestamp
    pub created_at: String,
    /// Timestamp of reaching a terminal status
    pub processed_at: Option<String>,
}

/// Parameters for inserting a new upload task
#[derive(Debug)]
pub struct NewUploadTask<'a> {
    pub chat_id: i64,
    pub message_id: i32,
    pub user_id: i64,
    pub file_id: &'a str,
    pub file_unique_id: &'a str,
    pub original_filename: &'a str,
    pub remote_filename: &'a str,
    pub file_size: i64,
    pub mime_type: &'a str,
    pub duration: i64,
}

const TASK_COLUMNS: &str = "id, chat_id, message_id, user_id, file_id, file_unique_id,
        original_filename, remote_filename, file_size, mime_type, duration,
        status, status_note, regular_file_code, premium_file_code,
        error_message, video_id, created_at, processed_at";

fn row_to_task(row: &rusqlite::Row<'_>) -> Result<UploadTask> {
    let status: String = row.get(11)?;
    Ok(UploadTask {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        message_id: row.get(2)?,
        user_id: row.get(3)?,
        file_id: row.get(4)?,
        file_unique_id: row.get(5)?,
        original_filename: row.get(6)?,
        remote_filename: row.get(7)?,
        file_size: row.get(8)?,
        mime_type: row.get(9)?,
        duration: row.get(10)?,
        status: UploadStatus::parse(&status),
        status_note: row.get(12)?,
        regular_file_code: row.get(13)?,
        premium_file_code: row.get(14)?,
        error_message: row.get(15)?,
        video_id: row.get(16)?,
        created_at: row.get(17)?,
        processed_at: row.get(18)?,
    })
}

/// Inserts a new upload task with status `pending`
///
/// Returns the ID of the inserted row.
pub fn insert_task(conn: &DbConnection, task: &NewUploadTask) -> Result<i64> {
    conn.execute(
        "INSERT INTO uploads (
            chat_id, message_id, user_id, file_id, file_unique_id,
            original_filename, remote_filename, file_size, mime_type, duration, status
         )
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'pending')",
        rusqlite::params![
            task.chat_id,
            task.message_id,
            task.user_id,
            task.file_id,
            task.file_unique_id,
            task.original_filename,
            task.remote_filename,
            task.file_size,
            task.mime_type,
            task.duration,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Gets a task by ID
pub fn get_task(conn: &DbConnection, task_id: i64) -> Result<Option<UploadTask>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM uploads WHERE id = ?", TASK_COLUMNS))?;
    let mut rows = stmt.query(rusqlite::params![task_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_task(row)?)),
        None => Ok(None),
    }
}

/// Finds an existing task for the given Telegram file_unique_id
///
/// Used for duplicate suppression before any bookkeeping happens.
pub fn find_by_unique_id(conn: &DbConnection, file_unique_id: &str) -> Result<Option<UploadTask>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM uploads WHERE file_unique_id = ? ORDER BY id DESC LIMIT 1",
        TASK_COLUMNS
    ))?;
    let mut rows = stmt.query(rusqlite::params![file_unique_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_task(row)?)),
        None => Ok(None),
    }
}

/// Finds the most recent task for a chat/message pair (legacy /retry form)
pub fn find_by_message(conn: &DbConnection, chat_id: i64, message_id: i32) -> Result<Option<UploadTask>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM uploads WHERE chat_id = ? AND message_id = ? ORDER BY id DESC LIMIT 1",
        TASK_COLUMNS
    ))?;
    let mut rows = stmt.query(rusqlite::params![chat_id, message_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_task(row)?)),
        None => Ok(None),
    }
}

/// Updates the status and the in-flight note of a task
pub fn set_status(conn: &DbConnection, task_id: i64, status: UploadStatus, note: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE uploads SET status = ?, status_note = ? WHERE id = ?",
        rusqlite::params![status.as_str(), note, task_id],
    )?;
    Ok(())
}

/// Moves a task to a terminal status, stamping processed_at
pub fn finish_task(conn: &DbConnection, task_id: i64, status: UploadStatus, error_message: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE uploads
         SET status = ?, status_note = NULL, error_message = ?, processed_at = datetime('now')
         WHERE id = ?",
        rusqlite::params![status.as_str(), error_message, task_id],
    )?;
    Ok(())
}

/// Records provider file codes, keeping any code already present
pub fn set_file_codes(
    conn: &DbConnection,
    task_id: i64,
    regular_file_code: Option<&str>,
    premium_file_code: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE uploads
         SET regular_file_code = COALESCE(?, regular_file_code),
             premium_file_code = COALESCE(?, premium_file_code)
         WHERE id = ?",
        rusqlite::params![regular_file_code, premium_file_code, task_id],
    )?;
    Ok(())
}

/// Links a task to its video record
pub fn set_video_id(conn: &DbConnection, task_id: i64, video_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE uploads SET video_id = ? WHERE id = ?",
        rusqlite::params![video_id, task_id],
    )?;
    Ok(())
}

/// Gets the most recent tasks, newest first (for /status)
pub fn recent_tasks(conn: &DbConnection, limit: i64) -> Result<Vec<UploadTask>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM uploads ORDER BY id DESC LIMIT ?",
        TASK_COLUMNS
    ))?;
    let tasks = stmt
        .query_map(rusqlite::params![limit], row_to_task)?
        .collect::<Result<Vec<_>>>()?;
    Ok(tasks)
}

/// Aggregates over a rolling window (for /stats)
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadStats {
    pub total: i64,
    pub completed: i64,
    pub partial: i64,
    pub failed: i64,
    pub in_flight: i64,
    pub total_bytes: i64,
}

/// Computes upload statistics over the last `days` days
pub fn stats_since(conn: &DbConnection, days: i64) -> Result<UploadStats> {
    let cutoff = format!("-{} days", days);
    conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'partial_success' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status IN ('pending', 'processing') THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(file_size), 0)
         FROM uploads WHERE created_at >= datetime('now', ?)",
        rusqlite::params![cutoff],
        |row| {
            Ok(UploadStats {
                total: row.get(0)?,
                completed: row.get(1)?,
                partial: row.get(2)?,
                failed: row.get(3)?,
                in_flight: row.get(4)?,
                total_bytes: row.get(5)?,
            })
        },
    )
}

// CRUD tests live in the integration suite to run against a pooled,
// migrated database. See tests/storage_test.rs.
