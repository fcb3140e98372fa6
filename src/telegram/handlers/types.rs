//! Handler types, dependencies, and the admin gate helper

use std::sync::Arc;

use crate::core::config;
use crate::storage::db::{self, get_connection};
use crate::storage::groups;
use crate::telegram::cache::CallbackCache;
use crate::upload::pipeline::UploadPipeline;
use crate::upload::provider::VideoHost;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<db::DbPool>,
    pub pipeline: Arc<UploadPipeline>,
    pub host: Arc<dyn VideoHost>,
    pub callback_cache: Arc<CallbackCache>,
}

impl HandlerDeps {
    pub fn new(
        db_pool: Arc<db::DbPool>,
        pipeline: Arc<UploadPipeline>,
        host: Arc<dyn VideoHost>,
        callback_cache: Arc<CallbackCache>,
    ) -> Self {
        Self {
            db_pool,
            pipeline,
            host,
            callback_cache,
        }
    }
}

/// The sender half of the authorization gate: an admin is anyone on the
/// environment bootstrap list or with an active row in the admins table.
pub fn is_admin_user(db_pool: &Arc<db::DbPool>, user_id: i64) -> bool {
    if config::admin::ADMIN_IDS.contains(&user_id) {
        return true;
    }
    match get_connection(db_pool) {
        Ok(conn) => groups::is_admin(&conn, user_id).unwrap_or(false),
        Err(e) => {
            log::warn!("Failed to get DB connection for admin check: {}", e);
            false
        }
    }
}
