//! Live transport sessions keyed by account.

use std::collections::HashMap;
use std::sync::Arc;

use adrelay_core::traits::Transport;
use tokio::sync::RwLock;

/// Shared, read-mostly map of connected accounts.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<i64, Arc<dyn Transport>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user_id: i64) -> Option<Arc<dyn Transport>> {
        self.inner.read().await.get(&user_id).cloned()
    }

    pub async fn insert(&self, user_id: i64, transport: Arc<dyn Transport>) {
        self.inner.write().await.insert(user_id, transport);
    }

    pub async fn remove(&self, user_id: i64) -> Option<Arc<dyn Transport>> {
        self.inner.write().await.remove(&user_id)
    }

    pub async fn contains(&self, user_id: i64) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    /// Connected account ids, sorted.
    pub async fn user_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.inner.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
