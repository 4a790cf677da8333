use async_trait::async_trait;
use log::{ info, warn };
use reqwest::Client;
use serde::{ Deserialize, Serialize };

use super::{ ChatClient, CompletionResponse };
use crate::error::{ AppError, Result };

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: Option<GoogleContent>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    #[serde(default)]
    text: Option<String>,
}

/// Calls a Gemini `generateContent` endpoint. `api_url` is the full model URL.
pub struct GeminiChatClient {
    http: Client,
    api_key: String,
    api_url: String,
}

impl GeminiChatClient {
    pub fn new(http: Client, api_key: String, api_url: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AppError::Config("Gemini API key is required for GeminiChatClient".into()));
        }
        Ok(Self { http, api_key, api_url })
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete(&self, prompt: &str) -> Result<CompletionResponse> {
        info!("GeminiChatClient::complete() → url={}", self.api_url);
        let payload = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt.to_string() }],
            }],
        };

        let resp = self.http
            .post(&self.api_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream {
                service: "Gemini".into(),
                status: status.as_u16(),
            });
        }

        let body: GoogleResponse = resp.json().await?;
        let text = body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text));

        match text {
            Some(response) => Ok(CompletionResponse { response }),
            None => {
                warn!("Unexpected Gemini API response format");
                Err(AppError::Llm("Gemini response contained no text".into()))
            }
        }
    }

    fn get_model(&self) -> String {
        self.api_url
            .rsplit('/')
            .next()
            .and_then(|last| last.split(':').next())
            .unwrap_or("gemini")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn extracts_first_candidate_text() {
        let server = MockServer::start_async().await;
        let mock = server.mock_async(|when, then| {
            when.method(POST).path("/models/gemini-2.0-flash:generateContent").query_param("key", "k");
            then.status(200).json_body(
                json!({
                "candidates": [{"content": {"parts": [{"text": "OK"}]}}]
            })
            );
        }).await;

        let client = GeminiChatClient::new(
            Client::new(),
            "k".into(),
            server.url("/models/gemini-2.0-flash:generateContent")
        ).unwrap();
        let resp = client.complete("ping").await.unwrap();
        assert_eq!(resp.response, "OK");
        assert_eq!(client.get_model(), "gemini-2.0-flash");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn maps_error_status_to_upstream() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(POST);
            then.status(403).body("forbidden");
        }).await;

        let client = GeminiChatClient::new(Client::new(), "k".into(), server.url("/gen")).unwrap();
        match client.complete("ping").await {
            Err(AppError::Upstream { status, .. }) => assert_eq!(status, 403),
            other => panic!("unexpected result {:?}", other.map(|r| r.response)),
        }
    }

    #[tokio::test]
    async fn empty_candidates_is_an_llm_error() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({"candidates": []}));
        }).await;

        let client = GeminiChatClient::new(Client::new(), "k".into(), server.url("/gen")).unwrap();
        assert!(matches!(client.complete("ping").await, Err(AppError::Llm(_))));
    }

    #[test]
    fn requires_api_key() {
        assert!(GeminiChatClient::new(Client::new(), " ".into(), "http://x".into()).is_err());
    }
}
