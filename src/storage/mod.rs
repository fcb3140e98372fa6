//! SQLite-backed bookkeeping: upload tasks, failures, videos, groups, admins.

pub mod db;
pub mod failures;
pub mod groups;
pub mod notifications;
pub mod uploads;
pub mod videos;

pub use db::{create_pool, get_connection, DbConnection, DbPool};
