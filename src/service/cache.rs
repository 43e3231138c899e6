use crate::models::mail::{CachedView, Folder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Cache key for one rendered mail view of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewKey {
    Threads { folder: Folder, page_token: Option<String> },
    Thread(String),
    Stats,
}

impl ViewKey {
    fn matches(&self, view: &CachedView) -> bool {
        match (self, view) {
            (ViewKey::Threads { .. }, CachedView::Threads) => true,
            (ViewKey::Thread(id), CachedView::Thread(other)) => id == other,
            (ViewKey::Stats, CachedView::Stats) => true,
            _ => false,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    stored_at: Instant,
    value: serde_json::Value,
}

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Short-lived cache of provider reads, scoped per connection.
#[derive(Debug)]
pub struct ViewCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<(Uuid, ViewKey), CacheEntry>>,
}

impl ViewCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_seconds),
            max_entries: DEFAULT_MAX_ENTRIES,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Periodically drops entries whose TTL has passed.
    pub fn spawn_cleanup_task(self: Arc<Self>, every: Duration) {
        let every = every.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let pruned = self.prune(Instant::now()).await;
                if pruned > 0 {
                    tracing::debug!(pruned, "pruned expired cached views");
                }
            }
        });
    }

    pub async fn prune(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.stored_at) < self.ttl);
        before - entries.len()
    }

    pub async fn get<T: DeserializeOwned>(&self, connection_id: Uuid, key: &ViewKey) -> Option<T> {
        let mut entries = self.entries.lock().await;
        let cache_key = (connection_id, key.clone());
        let entry = entries.get(&cache_key)?;
        if entry.stored_at.elapsed() >= self.ttl {
            entries.remove(&cache_key);
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    pub async fn put<T: Serialize>(&self, connection_id: Uuid, key: ViewKey, value: &T) {
        if self.ttl.is_zero() {
            return;
        }
        match serde_json::to_value(value) {
            Ok(value) => {
                let now = Instant::now();
                let mut entries = self.entries.lock().await;
                let cache_key = (connection_id, key);
                if entries.len() >= self.max_entries && !entries.contains_key(&cache_key) {
                    entries.retain(|_, entry| now.saturating_duration_since(entry.stored_at) < self.ttl);
                    if entries.len() >= self.max_entries {
                        let oldest = entries.iter().min_by_key(|(_, entry)| entry.stored_at).map(|(k, _)| k.clone());
                        if let Some(oldest) = oldest {
                            entries.remove(&oldest);
                        }
                    }
                }
                entries.insert(cache_key, CacheEntry { stored_at: now, value });
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize view for cache"),
        }
    }

    /// Drops every cached entry of `connection_id` matching one of `views`.
    pub async fn invalidate(&self, connection_id: Uuid, views: &[CachedView]) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|(id, key), _| *id != connection_id || !views.iter().any(|view| key.matches(view)));
        before - entries.len()
    }

    pub async fn evict_connection(&self, connection_id: Uuid) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|(id, _), _| *id != connection_id);
        before - entries.len()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    #[cfg(test)]
    pub async fn contains(&self, connection_id: Uuid, key: &ViewKey) -> bool {
        self.entries.lock().await.contains_key(&(connection_id, key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threads(folder: Folder, page: Option<&str>) -> ViewKey {
        ViewKey::Threads {
            folder,
            page_token: page.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn invalidating_threads_drops_every_page_and_folder() {
        let cache = ViewCache::new(60);
        let conn = Uuid::new_v4();
        cache.put(conn, threads(Folder::Inbox, None), &1).await;
        cache.put(conn, threads(Folder::Inbox, Some("p2")), &2).await;
        cache.put(conn, threads(Folder::Spam, None), &3).await;
        cache.put(conn, ViewKey::Stats, &4).await;

        let removed = cache.invalidate(conn, &[CachedView::Threads]).await;
        assert_eq!(removed, 3);
        assert_eq!(cache.get::<i32>(conn, &ViewKey::Stats).await, Some(4));
    }

    #[tokio::test]
    async fn invalidation_is_scoped_to_connection() {
        let cache = ViewCache::new(60);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.put(a, ViewKey::Stats, &1).await;
        cache.put(b, ViewKey::Stats, &2).await;

        cache.invalidate(a, &[CachedView::Stats]).await;
        assert!(cache.get::<i32>(a, &ViewKey::Stats).await.is_none());
        assert_eq!(cache.get::<i32>(b, &ViewKey::Stats).await, Some(2));
    }

    #[tokio::test]
    async fn thread_invalidation_matches_id() {
        let cache = ViewCache::new(60);
        let conn = Uuid::new_v4();
        cache.put(conn, ViewKey::Thread("t1".to_string()), &1).await;
        cache.put(conn, ViewKey::Thread("t2".to_string()), &2).await;

        cache.invalidate(conn, &[CachedView::Thread("t1".to_string())]).await;
        assert!(!cache.contains(conn, &ViewKey::Thread("t1".to_string())).await);
        assert!(cache.contains(conn, &ViewKey::Thread("t2".to_string())).await);
    }

    #[tokio::test]
    async fn evict_connection_clears_all_views() {
        let cache = ViewCache::new(60);
        let conn = Uuid::new_v4();
        cache.put(conn, ViewKey::Stats, &1).await;
        cache.put(conn, threads(Folder::Bin, None), &2).await;
        assert_eq!(cache.evict_connection(conn).await, 2);
    }

    #[tokio::test]
    async fn prune_drops_expired_entries() {
        let cache = ViewCache::new(1);
        let conn = Uuid::new_v4();
        for i in 0..1000 {
            cache.put(conn, ViewKey::Thread(format!("t{i}")), &i).await;
        }
        cache.put(conn, ViewKey::Stats, &0).await;

        assert_eq!(cache.prune(Instant::now()).await, 0);
        assert_eq!(cache.prune(Instant::now() + Duration::from_secs(2)).await, 1001);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn full_cache_evicts_oldest_entry() {
        let cache = ViewCache::new(60).with_max_entries(2);
        let conn = Uuid::new_v4();
        for (i, id) in ["t1", "t2", "t3"].into_iter().enumerate() {
            cache.put(conn, ViewKey::Thread(id.to_string()), &i).await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert_eq!(cache.len().await, 2);
        assert!(!cache.contains(conn, &ViewKey::Thread("t1".to_string())).await);
        assert!(cache.contains(conn, &ViewKey::Thread("t3".to_string())).await);

        cache.put(conn, ViewKey::Thread("t3".to_string()), &4).await;
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn zero_ttl_disables_caching() {
        let cache = ViewCache::new(0);
        let conn = Uuid::new_v4();
        cache.put(conn, ViewKey::Stats, &1).await;
        assert!(cache.get::<i32>(conn, &ViewKey::Stats).await.is_none());
    }
}
