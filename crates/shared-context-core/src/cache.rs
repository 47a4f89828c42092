//! Cache Layer: one `moka` TTL+LRU segment per class, sized and
//! timed independently, with hit/miss counters for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache as MokaCache;
use serde_json::Value;

struct Segment {
    cache: MokaCache<String, Value>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Segment {
    fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: MokaCache::builder().max_capacity(capacity).time_to_live(ttl).build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn get(&self, key: &str) -> Option<Value> {
        let hit = self.cache.get(key).await;
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    async fn insert(&self, key: String, value: Value) {
        self.cache.insert(key, value).await;
    }

    fn invalidate_prefix(&self, prefix: &str) {
        let prefix = prefix.to_string();
        self.cache.invalidate_entries_if(move |k, _| k.starts_with(&prefix)).ok();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

/// The four cache classes, each with its own capacity and TTL.
pub struct Cache {
    sessions: Segment,
    message_pages: Segment,
    search: Segment,
    agent_memory: Segment,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            sessions: Segment::new(50, Duration::from_secs(60)),
            message_pages: Segment::new(100, Duration::from_secs(30)),
            search: Segment::new(200, Duration::from_secs(120)),
            agent_memory: Segment::new(500, Duration::from_secs(300)),
        }
    }
}

/// Per-segment capacity and TTL, read from configuration at startup.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub sessions_capacity: u64,
    pub sessions_ttl: Duration,
    pub message_pages_capacity: u64,
    pub message_pages_ttl: Duration,
    pub search_capacity: u64,
    pub search_ttl: Duration,
    pub agent_memory_capacity: u64,
    pub agent_memory_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sessions_capacity: 50,
            sessions_ttl: Duration::from_secs(60),
            message_pages_capacity: 100,
            message_pages_ttl: Duration::from_secs(30),
            search_capacity: 200,
            search_ttl: Duration::from_secs(120),
            agent_memory_capacity: 500,
            agent_memory_ttl: Duration::from_secs(300),
        }
    }
}

impl Cache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            sessions: Segment::new(config.sessions_capacity, config.sessions_ttl),
            message_pages: Segment::new(config.message_pages_capacity, config.message_pages_ttl),
            search: Segment::new(config.search_capacity, config.search_ttl),
            agent_memory: Segment::new(config.agent_memory_capacity, config.agent_memory_ttl),
        }
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Value> {
        self.sessions.get(&format!("session:{session_id}")).await
    }

    pub async fn put_session(&self, session_id: &str, value: Value) {
        self.sessions.insert(format!("session:{session_id}"), value).await;
    }

    pub fn invalidate_session(&self, session_id: &str) {
        self.sessions.invalidate_prefix(&format!("session:{session_id}"));
    }

    pub async fn get_message_page(&self, session_id: &str, offset: i64, limit: i64) -> Option<Value> {
        self.message_pages.get(&format!("messages:{session_id}:{offset}:{limit}")).await
    }

    pub async fn put_message_page(&self, session_id: &str, offset: i64, limit: i64, value: Value) {
        self.message_pages
            .insert(format!("messages:{session_id}:{offset}:{limit}"), value)
            .await;
    }

    pub fn invalidate_messages(&self, session_id: &str) {
        self.message_pages.invalidate_prefix(&format!("messages:{session_id}:"));
    }

    pub async fn get_search(&self, cache_key: &str) -> Option<Value> {
        self.search.get(&format!("search:{cache_key}")).await
    }

    pub async fn put_search(&self, cache_key: &str, value: Value) {
        self.search.insert(format!("search:{cache_key}"), value).await;
    }

    pub fn invalidate_search(&self, cache_key: &str) {
        self.search.invalidate_prefix(&format!("search:{cache_key}"));
    }

    pub async fn get_memory(&self, agent_id: &str, cache_key: &str) -> Option<Value> {
        self.agent_memory.get(&format!("memory:{agent_id}:{cache_key}")).await
    }

    pub async fn put_memory(&self, agent_id: &str, cache_key: &str, value: Value) {
        self.agent_memory.insert(format!("memory:{agent_id}:{cache_key}"), value).await;
    }

    pub fn invalidate_memory(&self, agent_id: &str) {
        self.agent_memory.invalidate_prefix(&format!("memory:{agent_id}:"));
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            sessions: self.sessions.stats(),
            message_pages: self.message_pages.stats(),
            search: self.search.stats(),
            agent_memory: self.agent_memory.stats(),
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStatsReport {
    pub sessions: CacheStats,
    pub message_pages: CacheStats,
    pub search: CacheStats,
    pub agent_memory: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_hit_updates_counters() {
        let cache = Cache::new();
        assert!(cache.get_session("session_a").await.is_none());
        cache.put_session("session_a", serde_json::json!({"id": "session_a"})).await;
        assert!(cache.get_session("session_a").await.is_some());
        let stats = cache.stats();
        assert_eq!(stats.sessions.hits, 1);
        assert_eq!(stats.sessions.misses, 1);
    }

    #[tokio::test]
    async fn invalidate_prefix_drops_matching_pages() {
        let cache = Cache::new();
        cache.put_message_page("session_a", 0, 50, serde_json::json!([])).await;
        cache.invalidate_messages("session_a");
        cache.message_pages.cache.run_pending_tasks().await;
        assert!(cache.get_message_page("session_a", 0, 50).await.is_none());
    }
}
