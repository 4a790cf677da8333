pub mod api;
pub mod chat;

use crate::cli::Args;
use crate::error::AppError;
use crate::services::{ KnowledgeGraphService, LlmService, ProteinService, StatusService };
use axum::{
    extract::{ Request, State },
    http::HeaderValue,
    middleware::{ self, Next },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use log::{ error, info, warn };
use serde_json::{ json, Value as JsonValue };
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::{ AllowOrigin, Any, CorsLayer };

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone)]
pub struct AppState {
    pub proteins: Arc<ProteinService>,
    pub llm: Arc<LlmService>,
    pub knowledge_graph: Arc<KnowledgeGraphService>,
    pub status: Arc<StatusService>,
    limiter: Option<Arc<Limiter>>,
}

impl AppState {
    pub fn new(
        proteins: Arc<ProteinService>,
        llm: Arc<LlmService>,
        knowledge_graph: Arc<KnowledgeGraphService>,
        status: Arc<StatusService>,
        rate_limit_per_second: u32
    ) -> Self {
        let limiter = NonZeroU32::new(rate_limit_per_second).map(|n|
            Arc::new(RateLimiter::direct(Quota::per_second(n)))
        );
        Self { proteins, llm, knowledge_graph, status, limiter }
    }
}

pub fn router(state: AppState, args: &Args) -> Router {
    let api = Router::new()
        .route("/chat", post(chat::process_chat))
        .route("/protein/{protein_id}", get(api::get_protein))
        .route("/protein/{protein_id}/structure", get(api::get_structure))
        .route("/protein/{protein_id}/interactions", get(api::get_interactions))
        .route("/protein/{protein_id}/diseases", get(api::get_diseases))
        .route("/protein/{protein_id}/drugs", get(api::get_drugs))
        .route("/protein/{protein_id}/variants", get(api::get_variants))
        .route("/knowledge-graph/search", get(api::search_knowledge_graph))
        .route("/knowledge-graph/path", get(api::find_path))
        .route("/knowledge-graph/interactions", post(api::add_interaction))
        .route("/knowledge-graph/drug-targets", post(api::add_drug_target))
        .route("/knowledge-graph/{entity_id}", get(api::get_knowledge_graph))
        .route("/status", get(api::check_all))
        .route("/status/", get(api::check_all))
        .route("/status/neo4j", get(api::check_neo4j))
        .route("/status/redis", get(api::check_redis))
        .route("/status/llm", get(api::check_llm))
        .route("/status/apis", get(api::check_apis))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    let prefix = args.api_prefix.trim_end_matches('/');
    let app = Router::new().route("/", get(root));
    let app = if prefix.is_empty() { app.merge(api) } else { app.nest(prefix, api) };
    app.layer(cors_layer(&args.cors_origin_list())).with_state(state)
}

async fn root() -> Json<JsonValue> {
    Json(
        json!({
        "message": "Welcome to AminoVerse",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/api/docs"
    })
    )
}

async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            warn!("Global request rate limit exceeded for {}", req.uri().path());
            return AppError::RateLimited.into_response();
        }
    }
    next.run(req).await
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

/// Binds and serves until the listener fails. TLS is used when configured.
pub async fn serve(app: Router, args: &Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = args.server_addr.parse::<SocketAddr>()?;

    match (args.enable_tls, &args.tls_cert_path, &args.tls_key_path) {
        (true, Some(cert_path), Some(key_path)) => {
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
            info!("Starting HTTPS API server on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
        }
        _ => {
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                e
            })?;
            info!("Starting HTTP API server on: http://{}", addr);
            axum::serve(listener, app.into_make_service()).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::{ Cache, MemoryCache };
    use crate::config::prompt::builtin_prompts;
    use crate::graph::tests::db_for;
    use crate::history::{ HistoryLimits, MemoryHistoryStore };
    use crate::services::protein::tests::test_sources;
    use crate::services::CacheTtl;
    use axum::body::{ to_bytes, Body };
    use axum::http::{ Request as HttpRequest, StatusCode };
    use clap::Parser;
    use httpmock::MockServer;
    use tower::ServiceExt;

    /// Backend wired to `server` for every external dependency, with no LLM key.
    pub(crate) fn test_app(server: &MockServer, rate_limit: u32) -> Router {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let history = Arc::new(MemoryHistoryStore::new(HistoryLimits { max_messages: 50, ttl_secs: 60 }));
        let ttl = CacheTtl::default();
        let graph = db_for(server);
        let sources = test_sources(server);
        let llm = Arc::new(LlmService::new(None, builtin_prompts().unwrap(), cache.clone(), history, 10, ttl));
        let state = AppState::new(
            Arc::new(ProteinService::new(cache.clone(), graph.clone(), sources.clone(), ttl)),
            llm.clone(),
            Arc::new(KnowledgeGraphService::new(graph.clone(), cache.clone(), ttl.short)),
            Arc::new(StatusService::new(graph, cache, llm, sources)),
            rate_limit
        );
        router(state, &Args::parse_from(["aminoverse"]))
    }

    pub(crate) async fn body_json(resp: Response) -> JsonValue {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub(crate) fn post_json(uri: &str, body: JsonValue) -> HttpRequest<Body> {
        HttpRequest::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn root_reports_name_and_version() {
        let server = MockServer::start_async().await;
        let resp = test_app(&server, 0)
            .oneshot(HttpRequest::get("/").body(Body::empty()).unwrap()).await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["message"], "Welcome to AminoVerse");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn requests_over_the_limit_get_429() {
        let server = MockServer::start_async().await;
        let app = test_app(&server, 1);
        let first = app.clone().oneshot(post_json("/api/chat", json!({"message": " "}))).await.unwrap();
        assert_eq!(first.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let second = app.oneshot(post_json("/api/chat", json!({"message": " "}))).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
