pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod graph;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;
pub mod services;
pub mod sources;

use cli::Args;
use graph::GraphDb;
use llm::{ ChatClient, chat::GeminiChatClient };
use log::{ info, warn };
use models::status::ServiceState;
use server::AppState;
use services::{ CacheTtl, KnowledgeGraphService, LlmService, ProteinService, StatusService };
use sources::Sources;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

/// Messages of session history included in LLM prompts.
const PROMPT_HISTORY_MESSAGES: usize = 10;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("API Prefix: {}", args.api_prefix);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("Rate Limit: {} req/s", args.rate_limit_per_second);
    info!("Neo4j URI: {} (database '{}')", args.neo4j_uri, args.neo4j_database);
    info!("Redis Enabled: {}", args.enable_redis);
    if args.enable_redis {
        info!("Redis URL: {}", args.redis_url);
    }
    info!("History Limit: {} messages, TTL {}s", args.history_max_messages, args.history_ttl);
    info!("Cache TTL: data {}s, short {}s", args.cache_data_ttl, args.cache_short_ttl);
    info!("Gemini Configured: {}", !args.gemini_api_key.is_empty());
    info!("DisGeNET Configured: {}", !args.disgenet_api_key.is_empty());
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("(built-in)"));
    info!("-------------------------");

    let http = sources::build_http_client(args.http_timeout)?;
    let cache = cache::init(&args).await;
    let history = history::initialize_history_store(&args).await;
    let prompts = config::prompt::load_prompts(args.prompts_path.as_deref())?;
    let ttl = CacheTtl::from_args(&args);
    let graph_db = GraphDb::from_args(http.clone(), &args);
    let sources = Sources::from_args(http.clone(), &args);

    let chat_client: Option<Arc<dyn ChatClient>> = if args.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY is not set; using template responses and pattern-based intent detection");
        None
    } else {
        Some(Arc::new(GeminiChatClient::new(http.clone(), args.gemini_api_key.clone(), args.gemini_api_url.clone())?))
    };

    let llm = Arc::new(LlmService::new(chat_client, prompts, cache.clone(), history, PROMPT_HISTORY_MESSAGES, ttl));
    let proteins = Arc::new(ProteinService::new(cache.clone(), graph_db.clone(), sources.clone(), ttl));
    let knowledge_graph = Arc::new(KnowledgeGraphService::new(graph_db.clone(), cache.clone(), ttl.short));
    let status = Arc::new(StatusService::new(graph_db.clone(), cache, llm.clone(), sources));

    let summary = status.check_all_services().await;
    info!("--- Service Status ---");
    info!("Neo4j: {:?}", summary.neo4j);
    info!("Redis: {:?}", summary.redis);
    info!("LLM: {:?}", summary.llm);
    info!("External APIs: {:?}", summary.api_integrations);
    info!("----------------------");
    if !summary.all_ok() {
        warn!("Some services are unavailable; affected features will degrade");
    }

    if summary.neo4j == ServiceState::Ok && args.seed_on_startup {
        match graph::ensure_seeded(&graph_db, Path::new(&args.seed_file)).await {
            Ok(true) => info!("Knowledge graph seeded from {}", args.seed_file),
            Ok(false) => info!("Knowledge graph already populated; skipping seed"),
            Err(e) => warn!("Could not seed knowledge graph from {}: {}", args.seed_file, e),
        }
    }

    let state = AppState::new(proteins, llm, knowledge_graph, status, args.rate_limit_per_second);
    let app = server::router(state, &args);
    server::serve(app, &args).await
}
