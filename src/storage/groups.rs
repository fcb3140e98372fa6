//! Premium group allowlist and admin roster storage
//!
//! Both halves of the silent authorization gate live here: a message is
//! processed only when the sender is an active admin AND the chat is a
//! premium group with auto-upload enabled.

use super::db::DbConnection;
use rusqlite::Result;

/// Structure representing an allowlisted group
#[derive(Debug, Clone)]
pub struct PremiumGroup {
    pub chat_id: i64,
    pub chat_title: String,
    pub auto_upload_enabled: bool,
    pub created_at: String,
}

/// Adds a group to the allowlist with auto-upload enabled
///
/// Returns `Ok(true)` if inserted, `Ok(false)` if the group was already listed.
pub fn add_group(conn: &DbConnection, chat_id: i64, chat_title: &str) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO premium_groups (chat_id, chat_title) VALUES (?1, ?2)",
        rusqlite::params![chat_id, chat_title],
    )?;
    Ok(inserted > 0)
}

/// Lists all allowlisted groups
pub fn list_groups(conn: &DbConnection) -> Result<Vec<PremiumGroup>> {
    let mut stmt = conn.prepare(
        "SELECT chat_id, chat_title, auto_upload_enabled, created_at
         FROM premium_groups ORDER BY created_at",
    )?;
    let groups = stmt
        .query_map([], |row| {
            Ok(PremiumGroup {
                chat_id: row.get(0)?,
                chat_title: row.get(1)?,
                auto_upload_enabled: row.get::<_, i64>(2)? != 0,
                created_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;
    Ok(groups)
}

/// Counts allowlisted groups
pub fn group_count(conn: &DbConnection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM premium_groups", [], |row| row.get(0))
}

/// Checks the group half of the gate: listed AND auto-upload enabled
pub fn is_premium_group_with_autoupload(conn: &DbConnection, chat_id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM premium_groups WHERE chat_id = ? AND auto_upload_enabled = 1",
        rusqlite::params![chat_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Checks the sender half of the gate: an active admin row exists
pub fn is_admin(conn: &DbConnection, user_id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM admins WHERE user_id = ? AND is_active = 1",
        rusqlite::params![user_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Returns the user IDs of all active admins (notification fan-out list)
pub fn active_admins(conn: &DbConnection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT user_id FROM admins WHERE is_active = 1 ORDER BY user_id")?;
    let admins = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>>>()?;
    Ok(admins)
}

/// Upserts admin rows from the environment bootstrap list
///
/// Called once at startup so a fresh database still gates correctly.
pub fn seed_admins(conn: &DbConnection, user_ids: &[i64]) -> Result<usize> {
    let mut seeded = 0;
    for user_id in user_ids {
        seeded += conn.execute(
            "INSERT OR IGNORE INTO admins (user_id) VALUES (?)",
            rusqlite::params![user_id],
        )?;
    }
    Ok(seeded)
}
