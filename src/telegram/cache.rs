//! Expiring cache behind the retry keyboards
//!
//! Retry prompts stay actionable for one hour. Pressing a button on an
//! expired prompt gets a polite "use /failures" answer instead of a
//! dispatch against stale state. The cache is an injected dependency
//! (part of `HandlerDeps`), and main sweeps it periodically.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::storage::failures::ErrorCategory;

/// Context remembered for one retry prompt
#[derive(Debug, Clone)]
struct CachedPrompt {
    category: ErrorCategory,
    upload_id: i64,
    created_at: Instant,
}

/// TTL map from failure ID to prompt context
pub struct CallbackCache {
    entries: Arc<Mutex<HashMap<i64, CachedPrompt>>>,
    ttl: Duration,
}

impl CallbackCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Registers a freshly sent retry prompt.
    pub async fn insert(&self, failure_id: i64, category: ErrorCategory, upload_id: i64) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            failure_id,
            CachedPrompt {
                category,
                upload_id,
                created_at: Instant::now(),
            },
        );
    }

    /// Looks up a prompt; expired entries are dropped on access.
    pub async fn get(&self, failure_id: i64) -> Option<(ErrorCategory, i64)> {
        let mut entries = self.entries.lock().await;
        match entries.get(&failure_id) {
            Some(cached) if cached.created_at.elapsed() < self.ttl => Some((cached.category, cached.upload_id)),
            Some(_) => {
                entries.remove(&failure_id);
                None
            }
            None => None,
        }
    }

    /// Removes a prompt once its failure is settled.
    pub async fn remove(&self, failure_id: i64) {
        self.entries.lock().await.remove(&failure_id);
    }

    /// Drops all expired entries; returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, cached| cached.created_at.elapsed() < self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!("Swept {} expired retry prompt(s)", removed);
        }
        removed
    }
}
