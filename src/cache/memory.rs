use super::Cache;
use crate::error::Result;
use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache as MokaCache;
use std::time::{ Duration, Instant };

const MAX_ENTRIES: u64 = 10_000;

#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Option<Duration>,
}

/// Each entry expires after its own TTL; a rewrite restarts the clock.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _remaining: Option<Duration>
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// In-process cache used when Redis is disabled or unreachable.
/// Bounded, with expired entries evicted in the background whether or not they are read again.
pub struct MemoryCache {
    entries: MokaCache<String, Entry>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(MAX_ENTRIES)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            entries: MokaCache::builder().max_capacity(max_entries).expire_after(PerEntryTtl).build(),
        }
    }

    /// Live entry count after pending evictions have been applied.
    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
