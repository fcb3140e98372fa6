//! duomirror: mirrors videos posted in registered premium Telegram
//! groups to a dual-account video host (regular and premium behind one
//! gateway), with SQLite bookkeeping and an admin failure/retry
//! workflow.

pub mod core;
pub mod storage;
pub mod telegram;
pub mod upload;
