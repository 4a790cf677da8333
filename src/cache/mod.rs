pub mod memory;
pub mod redis;

use crate::cli::Args;
use crate::error::Result;
use async_trait::async_trait;
use log::{ info, warn };
use serde::{ de::DeserializeOwned, Serialize };
use std::sync::Arc;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Key/value store with per-entry expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    fn backend(&self) -> &'static str;
}

/// Connects to Redis when enabled, otherwise (or when the connection fails) falls back to
/// an in-process cache.
pub async fn init(args: &Args) -> Arc<dyn Cache> {
    if args.enable_redis {
        match RedisCache::connect(&args.redis_url).await {
            Ok(cache) => {
                info!("Cache connected to Redis at {}", args.redis_url);
                return Arc::new(cache);
            }
            Err(e) => {
                warn!("Redis unavailable ({}), using in-memory cache", e);
            }
        }
    }
    Arc::new(MemoryCache::new())
}

/// Reads and decodes a cached JSON value. Failures are logged and reported as a miss.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    match cache.get(key).await {
        Ok(Some(raw)) =>
            match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    None
                }
            }
        Ok(None) => None,
        Err(e) => {
            warn!("Cache read failed for {}: {}", key, e);
            None
        }
    }
}

/// Encodes and stores a JSON value. Failures are logged and ignored.
pub async fn set_json<T: Serialize + ?Sized>(cache: &dyn Cache, key: &str, value: &T, ttl_secs: u64) {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Could not encode cache entry {}: {}", key, e);
            return;
        }
    };
    if let Err(e) = cache.set(key, &raw, ttl_secs).await {
        warn!("Cache write failed for {}: {}", key, e);
    }
}

pub async fn invalidate(cache: &dyn Cache, keys: &[String]) {
    for key in keys {
        if let Err(e) = cache.delete(key).await {
            warn!("Cache delete failed for {}: {}", key, e);
        }
    }
}
