use crate::cache::{ self, Cache };
use crate::error::{ AppError, Result };
use crate::graph::GraphDb;
use crate::models::graph::{ EntityType, GraphPath, KnowledgeGraph, SearchHit, SearchResults };
use crate::models::protein::{ Drug, Interaction };
use log::{ info, warn };
use serde_json::Value as JsonValue;
use sha2::{ Digest, Sha256 };
use std::sync::Arc;

const SEARCH_LIMIT: usize = 20;
const PER_LABEL_LIMIT: usize = 50;
/// Bumped on every graph write; part of every subgraph, search and path cache key.
const GENERATION_KEY: &str = "kg_generation";

pub struct KnowledgeGraphService {
    graph: GraphDb,
    cache: Arc<dyn Cache>,
    ttl_secs: u64,
}

impl KnowledgeGraphService {
    pub fn new(graph: GraphDb, cache: Arc<dyn Cache>, ttl_secs: u64) -> Self {
        Self { graph, cache, ttl_secs }
    }

    pub fn graph(&self) -> &GraphDb {
        &self.graph
    }

    /// Everything within two hops of the entity.
    pub async fn get_entity_graph(&self, entity_id: &str, entity_type: EntityType) -> Result<KnowledgeGraph> {
        let key = entity_graph_key(entity_type, entity_id, self.generation().await);
        if let Some(cached) = cache::get_json::<KnowledgeGraph>(self.cache.as_ref(), &key).await {
            info!("Retrieved knowledge graph for {}:{} from cache", entity_type, entity_id);
            return Ok(cached);
        }

        let graph = self.graph.entity_subgraph(entity_type.label(), entity_id).await?;
        if graph.is_empty() {
            return Err(AppError::NotFound(format!("Knowledge graph for {} {}", entity_type, entity_id)));
        }
        cache::set_json(self.cache.as_ref(), &key, &graph, self.ttl_secs).await;
        Ok(graph)
    }

    pub async fn get_protein_knowledge_graph(&self, protein_id: &str) -> Result<KnowledgeGraph> {
        self.get_entity_graph(protein_id, EntityType::Protein).await
    }

    /// Matches on id or name across proteins, diseases, drugs and pathways, best 20 overall.
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::BadRequest("Search query must not be empty".into()));
        }
        let key = format!(
            "kg_search:{}:g{}",
            hex::encode(Sha256::digest(query.to_lowercase().as_bytes())),
            self.generation().await
        );
        if let Some(cached) = cache::get_json::<SearchResults>(self.cache.as_ref(), &key).await {
            return Ok(cached);
        }

        let mut scored: Vec<(EntityType, SearchHit)> = Vec::new();
        for entity_type in EntityType::SEARCHABLE {
            let rows = self.graph.search_label(entity_type.label(), query, PER_LABEL_LIMIT).await?;
            for mut props in rows {
                let Some(id) = props.remove("id").and_then(|v| v.as_str().map(String::from)) else {
                    continue;
                };
                let name = match props.remove("name") {
                    Some(JsonValue::String(name)) if !name.is_empty() => name,
                    _ => id.clone(),
                };
                let score = similarity(query, &id, &name);
                scored.push((entity_type, SearchHit { id, name, score, properties: props }));
            }
        }
        scored.sort_by(|a, b| b.1.score.partial_cmp(&a.1.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut results = SearchResults::default();
        for (entity_type, hit) in scored.into_iter().take(SEARCH_LIMIT) {
            if let Some(bucket) = results.bucket_mut(entity_type) {
                bucket.push(hit);
            }
        }
        cache::set_json(self.cache.as_ref(), &key, &results, self.ttl_secs).await;
        Ok(results)
    }

    pub async fn find_shortest_path(&self, source_id: &str, target_id: &str) -> Result<GraphPath> {
        if source_id.trim().is_empty() || target_id.trim().is_empty() {
            return Err(AppError::BadRequest("Both source and target are required".into()));
        }
        let key = format!("kg_path:{}:{}:g{}", source_id, target_id, self.generation().await);
        if let Some(cached) = cache::get_json::<GraphPath>(self.cache.as_ref(), &key).await {
            return Ok(cached);
        }

        let path = match self.graph.shortest_path(source_id, target_id).await? {
            Some(graph) =>
                GraphPath {
                    found: true,
                    length: graph.edges.len(),
                    nodes: graph.nodes,
                    relationships: graph.edges,
                    message: None,
                },
            None =>
                GraphPath {
                    found: false,
                    length: 0,
                    nodes: Vec::new(),
                    relationships: Vec::new(),
                    message: Some(format!("No path found between {} and {}", source_id, target_id)),
                },
        };
        cache::set_json(self.cache.as_ref(), &key, &path, self.ttl_secs).await;
        Ok(path)
    }

    pub async fn add_protein_interaction(&self, source_id: &str, interaction: &Interaction) -> Result<()> {
        self.graph.create_protein_interaction(source_id, interaction).await?;
        self.bump_generation().await;
        let mut keys = protein_keys(source_id, "interactions");
        keys.extend(protein_keys(&interaction.protein_id, "interactions"));
        cache::invalidate(self.cache.as_ref(), &keys).await;
        info!("Added interaction {} -> {}", source_id, interaction.protein_id);
        Ok(())
    }

    pub async fn add_drug_target(&self, drug: &Drug, protein_id: &str, affinity: Option<f64>) -> Result<()> {
        self.graph.create_drug_target(drug, protein_id, affinity).await?;
        self.bump_generation().await;
        cache::invalidate(self.cache.as_ref(), &protein_keys(protein_id, "drugs")).await;
        info!("Added drug target {} -> {}", drug.drug_id, protein_id);
        Ok(())
    }

    async fn generation(&self) -> u64 {
        match self.cache.get(GENERATION_KEY).await {
            Ok(raw) => raw.and_then(|g| g.parse().ok()).unwrap_or(0),
            Err(e) => {
                warn!("Could not read knowledge graph generation: {}", e);
                0
            }
        }
    }

    /// A write can change any subgraph within two hops, any search and any path.
    async fn bump_generation(&self) {
        let next = self.generation().await + 1;
        if let Err(e) = self.cache.set(GENERATION_KEY, &next.to_string(), 0).await {
            warn!("Could not advance knowledge graph generation: {}", e);
        }
    }
}

fn entity_graph_key(entity_type: EntityType, entity_id: &str, generation: u64) -> String {
    format!("entity_graph:{}:{}:g{}", entity_type.label(), entity_id, generation)
}

/// Protein-service entries that embed a protein's relationships of `kind`.
fn protein_keys(protein_id: &str, kind: &str) -> Vec<String> {
    vec![format!("protein:{}", protein_id), format!("{}:{}", kind, protein_id)]
}

fn similarity(query: &str, id: &str, name: &str) -> f64 {
    let q = query.to_lowercase();
    let (id, name) = (id.to_lowercase(), name.to_lowercase());
    if q == id || q == name {
        return 1.0;
    }
    let score = strsim::jaro_winkler(&q, &id).max(strsim::jaro_winkler(&q, &name));
    if score.is_nan() {
        warn!("Similarity for '{}' was not a number", query);
        return 0.0;
    }
    score
}
