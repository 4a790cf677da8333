mod memory;
mod redis;

use crate::cli::Args;
use crate::error::Result;
use crate::models::chat::Conversation;
use async_trait::async_trait;
use log::{ info, warn };
use std::sync::Arc;

pub use self::memory::MemoryHistoryStore;
pub use self::redis::RedisHistoryStore;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn add_message(&self, conversation_id: &str, role: &str, content: &str) -> Result<()>;

    /// Most recent `limit` messages, oldest first.
    async fn get_conversation(&self, conversation_id: &str, limit: usize) -> Result<Conversation>;

    async fn clear(&self, conversation_id: &str) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct HistoryLimits {
    pub max_messages: usize,
    pub ttl_secs: u64,
}

impl HistoryLimits {
    pub fn from_args(args: &Args) -> Self {
        Self {
            max_messages: args.history_max_messages.max(1),
            ttl_secs: args.history_ttl,
        }
    }
}

pub async fn initialize_history_store(args: &Args) -> Arc<dyn HistoryStore> {
    let limits = HistoryLimits::from_args(args);
    if args.enable_redis {
        match RedisHistoryStore::connect(&args.redis_url, &args.history_redis_prefix, limits.clone()).await {
            Ok(store) => {
                info!("Chat history will be stored in Redis at {}", args.redis_url);
                return Arc::new(store);
            }
            Err(e) => warn!("Redis history store unavailable ({}), keeping history in memory", e),
        }
    }
    Arc::new(MemoryHistoryStore::new(limits))
}

pub fn format_history_for_prompt(conversation: &Conversation) -> String {
    if conversation.messages.is_empty() {
        return String::new();
    }
    let mut result = String::from("Previous conversation:\n");
    for msg in &conversation.messages {
        let role_display = match msg.role.as_str() {
            "user" => "User",
            "assistant" => "Assistant",
            "system" => "System",
            other => other,
        };
        result.push_str(&format!("{}: {}\n", role_display, msg.content));
    }
    result
}
