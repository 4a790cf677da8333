use super::LlmService;
use crate::cache::Cache;
use crate::error::{ AppError, Result };
use crate::graph::GraphDb;
use crate::models::status::{ ApiIntegrations, ApiProbe, ServiceState, ServiceStatus, SingleCheck };
use crate::sources::Sources;
use log::warn;
use std::collections::BTreeMap;
use std::sync::Arc;

const PROBE_KEY: &str = "status:probe";

/// Health checks for every dependency, each run independently.
pub struct StatusService {
    graph: GraphDb,
    cache: Arc<dyn Cache>,
    llm: Arc<LlmService>,
    sources: Sources,
}

impl StatusService {
    pub fn new(graph: GraphDb, cache: Arc<dyn Cache>, llm: Arc<LlmService>, sources: Sources) -> Self {
        Self { graph, cache, llm, sources }
    }

    pub async fn check_all_services(&self) -> ServiceStatus {
        let (neo4j, redis, llm, apis) = tokio::join!(
            self.check_neo4j(),
            self.check_redis(),
            self.check_llm(),
            self.probe_apis(false)
        );
        let mut status = ServiceStatus::checking();
        (status.neo4j, status.neo4j_error) = split(neo4j);
        (status.redis, status.redis_error) = split(redis);
        (status.llm, status.llm_error) = split(llm);
        status.api_integrations = summarize(&apis);
        status.api_details = apis;
        status
    }

    pub async fn check_neo4j(&self) -> SingleCheck {
        match self.graph.test_connection().await {
            Ok(()) => ok("Neo4j connection successful"),
            Err(e) => failed(format!("Neo4j connection failed: {}", e)),
        }
    }

    pub async fn check_redis(&self) -> SingleCheck {
        if self.cache.backend() != "redis" {
            return failed(format!("Redis not connected, using {} cache", self.cache.backend()));
        }
        match self.redis_round_trip().await {
            Ok(()) => ok("Redis connection successful"),
            Err(e) => failed(format!("Redis connection failed: {}", e)),
        }
    }

    async fn redis_round_trip(&self) -> Result<()> {
        self.cache.set(PROBE_KEY, "ok", 10).await?;
        let value = self.cache.get(PROBE_KEY).await?;
        self.cache.delete(PROBE_KEY).await?;
        match value.as_deref() {
            Some("ok") => Ok(()),
            _ => Err(AppError::Config("probe value did not round-trip".into())),
        }
    }

    pub async fn check_llm(&self) -> SingleCheck {
        match self.llm.test_connection().await {
            Ok(_) => ok(&format!("LLM connection successful ({})", self.llm.model().unwrap_or_default())),
            Err(e) => failed(format!("LLM connection failed: {}", e)),
        }
    }

    /// UniProt and PDB, plus STRING when `include_string` is set.
    pub async fn probe_apis(&self, include_string: bool) -> BTreeMap<String, ApiProbe> {
        let (uniprot, pdb, string_db) = tokio::join!(
            self.sources.uniprot.probe(),
            self.sources.pdb.probe(),
            async {
                if include_string { Some(self.sources.string_db.probe().await) } else { None }
            }
        );
        let mut out = BTreeMap::new();
        out.insert("uniprot".to_string(), to_probe("UniProt", uniprot));
        out.insert("pdb".to_string(), to_probe("PDB", pdb));
        if let Some(result) = string_db {
            out.insert("string_db".to_string(), to_probe("STRING", result));
        }
        out
    }

    pub async fn check_apis(&self) -> ApiIntegrations {
        let services = self.probe_apis(true).await;
        ApiIntegrations { status: summarize(&services), services }
    }
}

fn ok(message: &str) -> SingleCheck {
    SingleCheck { status: ServiceState::Ok, message: message.to_string() }
}

fn failed(message: String) -> SingleCheck {
    warn!("{}", message);
    SingleCheck { status: ServiceState::Error, message }
}

fn split(check: SingleCheck) -> (ServiceState, Option<String>) {
    match check.status {
        ServiceState::Ok => (ServiceState::Ok, None),
        state => (state, Some(check.message)),
    }
}

fn to_probe(name: &str, result: Result<u16>) -> ApiProbe {
    match result {
        Ok(code) if (200..300).contains(&code) => ApiProbe { status: ServiceState::Ok, status_code: Some(code), error: None },
        Ok(code) => {
            warn!("{} API returned status code {}", name, code);
            ApiProbe {
                status: ServiceState::Error,
                status_code: Some(code),
                error: Some(format!("{} API returned status code {}", name, code)),
            }
        }
        Err(e) => {
            warn!("{} API check failed: {}", name, e);
            ApiProbe { status: ServiceState::Error, status_code: None, error: Some(e.to_string()) }
        }
    }
}

/// `Ok` when every probe passed, `Partial` when some did, `Error` otherwise.
pub fn summarize(apis: &BTreeMap<String, ApiProbe>) -> ServiceState {
    let healthy = apis.values().filter(|p| p.status == ServiceState::Ok).count();
    match healthy {
        0 => ServiceState::Error,
        n if n == apis.len() => ServiceState::Ok,
        _ => ServiceState::Partial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::prompt::builtin_prompts;
    use crate::graph::tests::db_for;
    use crate::history::{ HistoryLimits, MemoryHistoryStore };
    use crate::services::protein::tests::test_sources;
    use crate::services::CacheTtl;
    use httpmock::prelude::*;
    use serde_json::json;

    fn status_service(server: &MockServer) -> StatusService {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let llm = LlmService::new(
            None,
            builtin_prompts().unwrap(),
            cache.clone(),
            Arc::new(MemoryHistoryStore::new(HistoryLimits { max_messages: 50, ttl_secs: 60 })),
            10,
            CacheTtl::default()
        );
        StatusService::new(db_for(server), cache, Arc::new(llm), test_sources(server))
    }

    #[tokio::test]
    async fn each_dependency_is_reported_independently() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(POST).path("/db/neo4j/tx/commit");
            then.status(200).json_body(
                json!({"results": [{"columns": ["num"], "data": [{"row": [1]}]}], "errors": []})
            );
        }).await;
        server.mock_async(|when, then| {
            when.method(GET).path("/uniprot/P04637");
            then.status(200).json_body(json!({"primaryAccession": "P04637"}));
        }).await;
        server.mock_async(|when, then| {
            when.path("/pdb/graphql");
            then.status(503);
        }).await;

        let status = status_service(&server).check_all_services().await;
        assert_eq!(status.server, ServiceState::Ok);
        assert_eq!(status.neo4j, ServiceState::Ok);
        assert!(status.neo4j_error.is_none());
        assert_eq!(status.redis, ServiceState::Error);
        assert_eq!(status.llm, ServiceState::Error);
        assert!(status.llm_error.unwrap().contains("GEMINI_API_KEY"));
        assert_eq!(status.api_integrations, ServiceState::Partial);
        assert_eq!(status.api_details["pdb"].status_code, Some(503));
    }

    #[test]
    fn summary_reflects_probe_mix() {
        let probe = |status| ApiProbe { status, status_code: None, error: None };
        let mut apis = BTreeMap::new();
        apis.insert("a".to_string(), probe(ServiceState::Ok));
        assert_eq!(summarize(&apis), ServiceState::Ok);
        apis.insert("b".to_string(), probe(ServiceState::Error));
        assert_eq!(summarize(&apis), ServiceState::Partial);
        apis.insert("a".to_string(), probe(ServiceState::Error));
        assert_eq!(summarize(&apis), ServiceState::Error);
    }
}
