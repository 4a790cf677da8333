use super::Cache;
use crate::error::Result;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{ AsyncCommands, Client };
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct RedisCache {
    conn: Arc<Mutex<MultiplexedConnection>>,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn connection(&self) -> Arc<Mutex<MultiplexedConnection>> {
        self.conn.clone()
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut guard = self.conn.lock().await;
        let value: Option<String> = guard.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if ttl_secs > 0 {
            guard.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        } else {
            guard.set::<_, _, ()>(key, value).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut guard = self.conn.lock().await;
        guard.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        redis::cmd("PING").query_async::<_, String>(&mut *guard).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
