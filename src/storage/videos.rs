//! Video catalog storage module
//!
//! A row exists once at least one hosting account accepted the file.
//! Inserts are idempotent on the provider file codes so a retried or
//! re-delivered upload never creates a second catalog entry.

use super::db::DbConnection;
use rusqlite::Result;

/// Structure representing a video catalog row
#[derive(Debug, Clone)]
pub struct VideoRecord {
    pub id: i64,
    pub title: String,
    pub regular_file_code: Option<String>,
    pub premium_file_code: Option<String>,
    pub file_size: Option<i64>,
    pub duration: Option<i64>,
    pub status: String,
    pub created_at: String,
}

/// Parameters for inserting a new video record
#[derive(Debug)]
pub struct NewVideo<'a> {
    pub title: &'a str,
    pub regular_file_code: Option<&'a str>,
    pub premium_file_code: Option<&'a str>,
    pub file_size: Option<i64>,
    pub duration: Option<i64>,
}

fn row_to_video(row: &rusqlite::Row<'_>) -> Result<VideoRecord> {
    Ok(VideoRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        regular_file_code: row.get(2)?,
        premium_file_code: row.get(3)?,
        file_size: row.get(4)?,
        duration: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Finds a video carrying the given file code on either account
pub fn find_by_file_code(conn: &DbConnection, file_code: &str) -> Result<Option<VideoRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, regular_file_code, premium_file_code, file_size, duration, status, created_at
         FROM videos WHERE regular_file_code = ?1 OR premium_file_code = ?1",
    )?;
    let mut rows = stmt.query(rusqlite::params![file_code])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_video(row)?)),
        None => Ok(None),
    }
}

/// Gets a video by ID
pub fn get_video(conn: &DbConnection, video_id: i64) -> Result<Option<VideoRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, regular_file_code, premium_file_code, file_size, duration, status, created_at
         FROM videos WHERE id = ?",
    )?;
    let mut rows = stmt.query(rusqlite::params![video_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_video(row)?)),
        None => Ok(None),
    }
}

/// Inserts a video record, or merges into the existing one
///
/// If either file code already belongs to a catalog row, that row is
/// reused and any newly available code is filled in. Returns the row ID
/// either way.
pub fn insert_or_get(conn: &DbConnection, video: &NewVideo) -> Result<i64> {
    let existing = match (video.regular_file_code, video.premium_file_code) {
        (Some(code), _) => find_by_file_code(conn, code)?,
        (None, Some(code)) => find_by_file_code(conn, code)?,
        (None, None) => None,
    };
    let existing = match existing {
        None => {
            if let Some(code) = video.premium_file_code {
                find_by_file_code(conn, code)?
            } else {
                None
            }
        }
        found => found,
    };

    if let Some(record) = existing {
        conn.execute(
            "UPDATE videos
             SET regular_file_code = COALESCE(regular_file_code, ?),
                 premium_file_code = COALESCE(premium_file_code, ?)
             WHERE id = ?",
            rusqlite::params![video.regular_file_code, video.premium_file_code, record.id],
        )?;
        return Ok(record.id);
    }

    conn.execute(
        "INSERT INTO videos (title, regular_file_code, premium_file_code, file_size, duration)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            video.title,
            video.regular_file_code,
            video.premium_file_code,
            video.file_size,
            video.duration,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

// Idempotence tests live in the integration suite. See tests/storage_test.rs.
