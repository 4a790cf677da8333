use super::{ HistoryLimits, HistoryStore };
use crate::error::Result;
use crate::models::chat::{ ChatMessage, Conversation };
use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache as MokaCache;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

const MAX_SESSIONS: u64 = 10_000;

/// Session histories expire `ttl_secs` after their last write, like the Redis list's EXPIRE.
pub struct MemoryHistoryStore {
    sessions: MokaCache<String, VecDeque<ChatMessage>>,
    write_lock: Mutex<()>,
    limits: HistoryLimits,
}

impl MemoryHistoryStore {
    pub fn new(limits: HistoryLimits) -> Self {
        let mut builder = MokaCache::builder().max_capacity(MAX_SESSIONS);
        if limits.ttl_secs > 0 {
            builder = builder.time_to_live(Duration::from_secs(limits.ttl_secs));
        }
        Self {
            sessions: builder.build(),
            write_lock: Mutex::new(()),
            limits,
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn add_message(&self, conversation_id: &str, role: &str, content: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut messages = self.sessions.get(conversation_id).await.unwrap_or_default();
        messages.push_back(ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now().timestamp(),
        });
        while messages.len() > self.limits.max_messages {
            messages.pop_front();
        }
        self.sessions.insert(conversation_id.to_string(), messages).await;
        Ok(())
    }

    async fn get_conversation(&self, conversation_id: &str, limit: usize) -> Result<Conversation> {
        let messages = self.sessions
            .get(conversation_id).await
            .map(|all| {
                let skip = all.len().saturating_sub(limit);
                all.into_iter().skip(skip).collect()
            })
            .unwrap_or_default();
        Ok(Conversation {
            id: conversation_id.to_string(),
            messages,
        })
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.sessions.invalidate(conversation_id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max: usize) -> MemoryHistoryStore {
        MemoryHistoryStore::new(HistoryLimits { max_messages: max, ttl_secs: 0 })
    }

    #[tokio::test]
    async fn history_is_capped_and_chronological() {
        let store = store(50);
        for i in 0..60 {
            store.add_message("s1", "user", &format!("message {}", i)).await.unwrap();
        }
        let conv = store.get_conversation("s1", 100).await.unwrap();
        assert_eq!(conv.messages.len(), 50);
        assert_eq!(conv.messages.first().unwrap().content, "message 10");
        assert_eq!(conv.messages.last().unwrap().content, "message 59");
    }

    #[tokio::test]
    async fn limit_returns_most_recent_messages() {
        let store = store(50);
        for i in 0..5 {
            store.add_message("s1", "user", &format!("m{}", i)).await.unwrap();
        }
        let conv = store.get_conversation("s1", 2).await.unwrap();
        let contents: Vec<_> = conv.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn zero_limit_returns_nothing() {
        let store = store(50);
        store.add_message("s1", "user", "hi").await.unwrap();
        assert!(store.get_conversation("s1", 0).await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn sessions_are_isolated_and_clearable() {
        let store = store(10);
        store.add_message("a", "user", "hi").await.unwrap();
        store.add_message("b", "user", "hello").await.unwrap();
        store.clear("a").await.unwrap();
        assert!(store.get_conversation("a", 10).await.unwrap().messages.is_empty());
        assert_eq!(store.get_conversation("b", 10).await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn idle_session_expires_after_ttl() {
        let store = MemoryHistoryStore::new(HistoryLimits { max_messages: 50, ttl_secs: 1 });
        store.add_message("s1", "user", "hi").await.unwrap();
        assert_eq!(store.get_conversation("s1", 10).await.unwrap().messages.len(), 1);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(store.get_conversation("s1", 10).await.unwrap().messages.is_empty());
    }
}
