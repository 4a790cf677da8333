use super::{ HistoryLimits, HistoryStore };
use crate::error::Result;
use crate::models::chat::{ ChatMessage, Conversation };
use async_trait::async_trait;
use chrono::Utc;
use log::error;
use redis::aio::MultiplexedConnection;
use redis::{ AsyncCommands, Client };
use serde::{ Deserialize, Serialize };
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Serialize, Deserialize)]
struct StoredMessage {
    role: String,
    content: String,
    timestamp: i64,
}

/// Each session is a Redis list, newest message at the head.
pub struct RedisHistoryStore {
    conn: Arc<Mutex<MultiplexedConnection>>,
    key_prefix: String,
    limits: HistoryLimits,
}

impl RedisHistoryStore {
    pub async fn connect(url: &str, key_prefix: &str, limits: HistoryLimits) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            key_prefix: key_prefix.to_string(),
            limits,
        })
    }

    fn key(&self, conversation_id: &str) -> String {
        format!("{}{}", self.key_prefix, conversation_id)
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn add_message(&self, conversation_id: &str, role: &str, content: &str) -> Result<()> {
        let key = self.key(conversation_id);
        let message = StoredMessage {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now().timestamp(),
        };
        let json_msg = serde_json::to_string(&message)?;

        let mut conn = self.conn.lock().await;
        let Some(last) = last_index(self.limits.max_messages) else {
            conn.del::<_, ()>(&key).await?;
            return Ok(());
        };
        let _: i64 = conn.lpush(&key, &json_msg).await?;
        conn.ltrim::<_, ()>(&key, 0, last).await?;
        if self.limits.ttl_secs > 0 {
            conn.expire::<_, ()>(&key, expire_secs(self.limits.ttl_secs)).await?;
        }
        Ok(())
    }

    async fn get_conversation(&self, conversation_id: &str, limit: usize) -> Result<Conversation> {
        let key = self.key(conversation_id);
        // LRANGE 0 -1 would return the whole list
        let Some(last) = last_index(limit.min(self.limits.max_messages)) else {
            return Ok(Conversation {
                id: conversation_id.to_string(),
                messages: Vec::new(),
            });
        };
        let json_entries: Vec<String> = {
            let mut conn = self.conn.lock().await;
            conn.lrange(&key, 0, last).await?
        };

        let mut messages = Vec::with_capacity(json_entries.len());
        for json_entry in &json_entries {
            match serde_json::from_str::<StoredMessage>(json_entry) {
                Ok(msg) =>
                    messages.push(ChatMessage {
                        role: msg.role,
                        content: msg.content,
                        timestamp: msg.timestamp,
                    }),
                Err(e) => error!("Error parsing history entry: {}", e),
            }
        }
        messages.reverse();

        Ok(Conversation {
            id: conversation_id.to_string(),
            messages,
        })
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conn.del::<_, ()>(self.key(conversation_id)).await?;
        Ok(())
    }
}

/// Index of the last of `count` list entries; `None` for an empty range.
fn last_index(count: usize) -> Option<isize> {
    count.checked_sub(1).map(|i| isize::try_from(i).unwrap_or(isize::MAX))
}

fn expire_secs(ttl_secs: u64) -> i64 {
    i64::try_from(ttl_secs).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_range_has_no_last_index() {
        assert_eq!(last_index(0), None);
        assert_eq!(last_index(1), Some(0));
        assert_eq!(last_index(50), Some(49));
        assert_eq!(last_index(usize::MAX), Some(isize::MAX));
    }

    #[test]
    fn huge_ttl_saturates_instead_of_wrapping() {
        assert_eq!(expire_secs(604_800), 604_800);
        assert_eq!(expire_secs(u64::MAX), i64::MAX);
    }
}
