pub mod gemini;

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;

pub use self::gemini::GeminiChatClient;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<CompletionResponse>;

    fn get_model(&self) -> String;
}
