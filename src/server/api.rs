use super::AppState;
use crate::error::{ AppError, Result };
use crate::models::graph::{ EntityType, GraphPath, KnowledgeGraph, SearchResults };
use crate::models::protein::{ Disease, Drug, Interaction, ProteinRecord, StructureInfo, Variant };
use crate::models::status::{ ApiIntegrations, ServiceStatus, SingleCheck };
use axum::{ extract::{ Path, Query, State }, http::StatusCode, Json };
use serde::Deserialize;
use serde_json::{ json, Value as JsonValue };

pub async fn get_protein(State(state): State<AppState>, Path(protein_id): Path<String>) -> Json<ProteinRecord> {
    Json(state.proteins.get_protein_info(&protein_id).await)
}

pub async fn get_structure(State(state): State<AppState>, Path(protein_id): Path<String>) -> Json<StructureInfo> {
    Json(state.proteins.get_structure(&protein_id).await)
}

pub async fn get_interactions(
    State(state): State<AppState>,
    Path(protein_id): Path<String>
) -> Json<Vec<Interaction>> {
    Json(state.proteins.get_interactions(&protein_id).await)
}

pub async fn get_diseases(State(state): State<AppState>, Path(protein_id): Path<String>) -> Json<Vec<Disease>> {
    Json(state.proteins.get_disease_associations(&protein_id).await)
}

pub async fn get_drugs(State(state): State<AppState>, Path(protein_id): Path<String>) -> Json<Vec<Drug>> {
    Json(state.proteins.get_drug_interactions(&protein_id).await)
}

pub async fn get_variants(State(state): State<AppState>, Path(protein_id): Path<String>) -> Json<Vec<Variant>> {
    Json(state.proteins.get_variants(&protein_id).await)
}

#[derive(Deserialize)]
pub struct EntityGraphParams {
    pub entity_type: Option<String>,
}

pub async fn get_knowledge_graph(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
    Query(params): Query<EntityGraphParams>
) -> Result<Json<KnowledgeGraph>> {
    let entity_type = match params.entity_type.as_deref() {
        Some(raw) => raw.parse::<EntityType>().map_err(AppError::BadRequest)?,
        None => EntityType::Protein,
    };
    Ok(Json(state.knowledge_graph.get_entity_graph(&entity_id, entity_type).await?))
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

pub async fn search_knowledge_graph(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>
) -> Result<Json<SearchResults>> {
    let query = params.q.unwrap_or_default();
    Ok(Json(state.knowledge_graph.search(&query).await?))
}

#[derive(Deserialize)]
pub struct PathParams {
    pub source: Option<String>,
    pub target: Option<String>,
}

pub async fn find_path(State(state): State<AppState>, Query(params): Query<PathParams>) -> Result<Json<GraphPath>> {
    let source = params.source.unwrap_or_default();
    let target = params.target.unwrap_or_default();
    Ok(Json(state.knowledge_graph.find_shortest_path(&source, &target).await?))
}

#[derive(Deserialize)]
pub struct NewInteraction {
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub target_name: Option<String>,
    pub score: f64,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

pub async fn add_interaction(
    State(state): State<AppState>,
    Json(body): Json<NewInteraction>
) -> Result<(StatusCode, Json<JsonValue>)> {
    if body.source_id.trim().is_empty() || body.target_id.trim().is_empty() {
        return Err(AppError::BadRequest("source_id and target_id are required".into()));
    }
    if !(0.0..=1.0).contains(&body.score) {
        return Err(AppError::BadRequest(format!("score must be within [0, 1], got {}", body.score)));
    }
    let interaction = Interaction {
        protein_name: body.target_name.unwrap_or_else(|| body.target_id.clone()),
        protein_id: body.target_id,
        score: body.score,
        evidence: body.evidence,
        source: body.source.or_else(|| Some("manual".into())),
    };
    state.knowledge_graph.add_protein_interaction(&body.source_id, &interaction).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "created" }))))
}

#[derive(Deserialize)]
pub struct NewDrugTarget {
    pub drug_id: String,
    pub protein_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mechanism: Option<String>,
    #[serde(default)]
    pub affinity: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

pub async fn add_drug_target(
    State(state): State<AppState>,
    Json(body): Json<NewDrugTarget>
) -> Result<(StatusCode, Json<JsonValue>)> {
    if body.drug_id.trim().is_empty() || body.protein_id.trim().is_empty() {
        return Err(AppError::BadRequest("drug_id and protein_id are required".into()));
    }
    let drug = Drug {
        name: body.name.unwrap_or_else(|| body.drug_id.clone()),
        drug_id: body.drug_id,
        description: body.description,
        mechanism: body.mechanism,
        source: body.source.or_else(|| Some("manual".into())),
    };
    state.knowledge_graph.add_drug_target(&drug, &body.protein_id, body.affinity).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "created" }))))
}

pub async fn check_all(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.status.check_all_services().await)
}

pub async fn check_neo4j(State(state): State<AppState>) -> Json<SingleCheck> {
    Json(state.status.check_neo4j().await)
}

pub async fn check_redis(State(state): State<AppState>) -> Json<SingleCheck> {
    Json(state.status.check_redis().await)
}

pub async fn check_llm(State(state): State<AppState>) -> Json<SingleCheck> {
    Json(state.status.check_llm().await)
}

pub async fn check_apis(State(state): State<AppState>) -> Json<ApiIntegrations> {
    Json(state.status.check_apis().await)
}
