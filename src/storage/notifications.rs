//! Notification audit log storage
//!
//! Every admin notification dispatch writes one row, whether or not any
//! delivery succeeded, so fan-out behavior can be audited later.

use super::db::DbConnection;
use rusqlite::Result;

/// Parameters for logging a notification dispatch
#[derive(Debug)]
pub struct NewNotification<'a> {
    /// Related failure record, when the notification concerns one
    pub failure_id: Option<i64>,
    /// "upload_failure", "upload_success", ...
    pub kind: &'a str,
    /// How many admins actually received the message
    pub sent_to_count: i64,
    pub category: Option<&'a str>,
    /// Leading fragment of the message text
    pub message_preview: &'a str,
}

/// Inserts an audit row for one notification dispatch
pub fn log_notification(conn: &DbConnection, notification: &NewNotification) -> Result<i64> {
    conn.execute(
        "INSERT INTO notification_log (failure_id, kind, sent_to_count, category, message_preview)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            notification.failure_id,
            notification.kind,
            notification.sent_to_count,
            notification.category,
            notification.message_preview,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Counts audit rows for a failure (used in tests and diagnostics)
pub fn notification_count_for_failure(conn: &DbConnection, failure_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM notification_log WHERE failure_id = ?",
        rusqlite::params![failure_id],
        |row| row.get(0),
    )
}
