//! HTTP client for the AminoVerse backend.

use super::tabs::Tab;
use crate::error::{ AppError, Result };
use crate::models::chat::{ ChatRequest, ChatResponse };
use crate::models::status::ServiceStatus;
use async_trait::async_trait;
use log::debug;
use reqwest::{ Client, Response };
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use url::Url;

#[async_trait]
pub trait Backend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Raw payload behind `tab` for `protein_id`; normalized by the caller.
    async fn follow_up(&self, tab: Tab, protein_id: &str) -> Result<JsonValue>;

    async fn status(&self) -> Result<ServiceStatus>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` includes the API prefix, e.g. `http://localhost:8000/api`.
    pub fn new(http: Client, base_url: &str) -> Self {
        Self { http, base_url: base_url.trim_end_matches('/').to_string() }
    }

    /// The id is pushed as a single percent-encoded path segment.
    fn follow_up_url(&self, tab: Tab, protein_id: &str) -> Result<Url> {
        let id = protein_id.trim();
        // url drops dot segments instead of encoding them
        if id.is_empty() || id == "." || id == ".." {
            return Err(AppError::BadRequest(format!("Invalid protein id: {:?}", protein_id)));
        }
        let mut url = Url::parse(&self.base_url).map_err(|e|
            AppError::Config(format!("Invalid API URL {}: {}", self.base_url, e))
        )?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AppError::Config(format!("API URL {} cannot take a path", self.base_url)))?;
            segments.pop_if_empty();
            match tab {
                Tab::Structure => segments.extend(["protein", id, "structure"]),
                Tab::Network => segments.extend(["protein", id, "interactions"]),
                Tab::KnowledgeGraph => segments.extend(["knowledge-graph", id]),
            };
        }
        Ok(url)
    }
}

async fn decode<T: DeserializeOwned>(service: &str, resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        return Err(AppError::Upstream { service: service.to_string(), status: status.as_u16() });
    }
    Ok(resp.json().await?)
}

#[async_trait]
impl Backend for ApiClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let resp = self.http.post(format!("{}/chat", self.base_url)).json(request).send().await?;
        decode("chat", resp).await
    }

    async fn follow_up(&self, tab: Tab, protein_id: &str) -> Result<JsonValue> {
        let url = self.follow_up_url(tab, protein_id)?;
        debug!("Fetching {} pane data from {}", tab, url);
        let resp = self.http.get(url).send().await?;
        decode(tab.as_str(), resp).await
    }

    async fn status(&self) -> Result<ServiceStatus> {
        let resp = self.http.get(format!("{}/status/", self.base_url)).send().await?;
        decode("status", resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(Client::new(), &server.url("/api/"))
    }

    #[tokio::test]
    async fn posts_chat_message_with_session() {
        let server = MockServer::start_async().await;
        let mock = server.mock_async(|when, then| {
            when.method(POST)
                .path("/api/chat")
                .json_body_partial(r#"{"message": "Tell me about TP53", "session_id": "abc"}"#);
            then.status(200).json_body(json!({"message": "TP53 is...", "follow_up_suggestions": []}));
        }).await;

        let request = ChatRequest {
            message: "Tell me about TP53".into(),
            session_id: Some("abc".into()),
            user_id: None,
        };
        let reply = client(&server).chat(&request).await.unwrap();
        mock.assert_async().await;
        assert_eq!(reply.message, "TP53 is...");
    }

    #[tokio::test]
    async fn follow_ups_hit_pane_routes() {
        let server = MockServer::start_async().await;
        let kg = server.mock_async(|when, then| {
            when.method(GET).path("/api/knowledge-graph/P04637");
            then.status(200).json_body(json!({"nodes": [], "edges": []}));
        }).await;
        let api = client(&server);
        assert_eq!(api.follow_up(Tab::KnowledgeGraph, "P04637").await.unwrap()["nodes"], json!([]));
        kg.assert_async().await;
    }

    #[test]
    fn protein_id_is_a_single_encoded_segment() {
        let api = ApiClient::new(Client::new(), "http://localhost:8000/api");
        let url = api.follow_up_url(Tab::Structure, "P0/4637 x?y#z").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/protein/P0%2F4637%20x%3Fy%23z/structure");
        let url = api.follow_up_url(Tab::KnowledgeGraph, " ../admin ").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/knowledge-graph/..%2Fadmin");
        assert!(matches!(api.follow_up_url(Tab::Network, ".."), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn blank_protein_id_is_rejected_before_any_request() {
        let server = MockServer::start_async().await;
        let any = server.mock_async(|when, then| {
            when.any_request();
            then.status(200).json_body(json!({}));
        }).await;
        let err = client(&server).follow_up(Tab::Network, "  ").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        any.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_error() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/api/protein/P04637/interactions");
            then.status(503);
        }).await;
        let err = client(&server).follow_up(Tab::Network, "P04637").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { status: 503, .. }));
    }
}
