use super::AppState;
use crate::error::{ AppError, Result };
use crate::models::chat::{ ChatRequest, ChatResponse, Intent, VisualizationType };
use crate::models::protein::ProteinRecord;
use crate::services::ResponseData;
use axum::{ extract::State, Json };
use log::{ info, warn };
use serde::Serialize;
use serde_json::Value as JsonValue;

fn to_json<T: Serialize + ?Sized>(value: &T) -> Option<JsonValue> {
    serde_json::to_value(value).ok()
}

fn protein_json(protein: &ProteinRecord) -> Option<JsonValue> {
    to_json(protein)
}

/// Classifies the message, gathers the data its intent needs and answers with a reply,
/// optional visualization payload and follow-up suggestions.
pub async fn process_chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Result<Json<ChatResponse>> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("Message must not be empty".into()));
    }
    let session = req.session_id.as_deref().filter(|s| !s.is_empty());
    if let Some(session_id) = session {
        if let Err(e) = state.llm.history().add_message(session_id, "user", message).await {
            warn!("Could not store user message for session {}: {}", session_id, e);
        }
    }

    let analysis = state.llm.analyze_query(message).await;
    let Some(entity) = analysis.entities.first() else {
        let reply = state.llm.generate_response(message, ResponseData::None, session).await;
        return Ok(
            Json(ChatResponse {
                message: reply,
                follow_up_suggestions: vec![
                    "Tell me about TP53".into(),
                    "Show me the structure of BRCA1".into(),
                    "What diseases are associated with PTEN?".into()
                ],
                ..Default::default()
            })
        );
    };
    info!("Dispatching chat message as {} for {}", analysis.intent, entity);

    let response = match analysis.intent {
        Intent::ProteinInfo | Intent::General => {
            let protein = state.proteins.get_protein_info(entity).await;
            let reply = state.llm.generate_response(message, ResponseData::Protein(&protein), session).await;
            let mut follow_ups = vec![
                format!("Show me the structure of {}", entity),
                format!("What diseases are associated with {}?", entity)
            ];
            if analysis.intent == Intent::ProteinInfo {
                follow_ups.push(format!("Show protein interactions for {}", entity));
                follow_ups.push(format!("What drugs target {}?", entity));
            }
            ChatResponse {
                message: reply,
                data: protein_json(&protein),
                follow_up_suggestions: follow_ups,
                ..Default::default()
            }
        }
        Intent::StructureInfo => {
            let protein = state.proteins.get_protein_info(entity).await;
            let structure = match &protein.structure {
                Some(structure) => structure.clone(),
                None => state.proteins.get_structure(entity).await,
            };
            let reply = state.llm.generate_response(message, ResponseData::Structure(&structure), session).await;
            ChatResponse {
                message: reply,
                data: protein_json(&protein),
                visualization_data: to_json(&structure),
                visualization_type: Some(VisualizationType::Structure),
                follow_up_suggestions: vec![
                    format!("What is the function of {}?", entity),
                    format!("Show protein interactions for {}", entity)
                ],
            }
        }
        Intent::Interactions => {
            let (interactions, protein) = tokio::join!(
                state.proteins.get_interactions(entity),
                state.proteins.get_protein_info(entity)
            );
            let reply = state.llm.generate_response(
                message,
                ResponseData::Interactions(&interactions),
                session
            ).await;
            let partner = interactions
                .first()
                .map(|i| i.protein_name.clone())
                .unwrap_or_else(|| entity.clone());
            ChatResponse {
                message: reply,
                data: protein_json(&protein),
                visualization_data: to_json(&interactions),
                visualization_type: Some(VisualizationType::Interactions),
                follow_up_suggestions: vec![
                    format!("Tell me about {}", partner),
                    format!("What diseases are associated with {}?", entity)
                ],
            }
        }
        Intent::DiseaseInfo => {
            let (diseases, protein, graph) = tokio::join!(
                state.proteins.get_disease_associations(entity),
                state.proteins.get_protein_info(entity),
                state.knowledge_graph.get_protein_knowledge_graph(entity)
            );
            let reply = state.llm.generate_response(message, ResponseData::Diseases(&diseases), session).await;
            let graph = match graph {
                Ok(graph) => Some(graph),
                Err(e) => {
                    warn!("No knowledge graph for {}: {}", entity, e);
                    None
                }
            };
            let disease = diseases
                .first()
                .map(|d| d.name.as_str())
                .unwrap_or("diseases");
            ChatResponse {
                message: reply,
                data: protein_json(&protein),
                visualization_type: graph.as_ref().map(|_| VisualizationType::KnowledgeGraph),
                visualization_data: graph.as_ref().and_then(to_json),
                follow_up_suggestions: vec![
                    format!("What drugs can treat {} associated with {}?", disease, entity),
                    format!("Tell me about {}", entity)
                ],
            }
        }
        Intent::DrugInfo => {
            let (drugs, protein) = tokio::join!(
                state.proteins.get_drug_interactions(entity),
                state.proteins.get_protein_info(entity)
            );
            let reply = state.llm.generate_response(message, ResponseData::Drugs(&drugs), session).await;
            let drug = drugs
                .first()
                .map(|d| d.name.as_str())
                .unwrap_or("this drug");
            ChatResponse {
                message: reply,
                data: protein_json(&protein),
                follow_up_suggestions: vec![
                    format!("What diseases are associated with {}?", entity),
                    format!("How does {} work?", drug)
                ],
                ..Default::default()
            }
        }
        Intent::VariantInfo => {
            let (variants, protein) = tokio::join!(
                state.proteins.get_variants(entity),
                state.proteins.get_protein_info(entity)
            );
            let reply = state.llm.generate_response(message, ResponseData::Variants(&variants), session).await;
            ChatResponse {
                message: reply,
                data: protein_json(&protein),
                follow_up_suggestions: vec![
                    format!("What diseases are associated with {} variants?", entity),
                    format!("Tell me more about {}", entity)
                ],
                ..Default::default()
            }
        }
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use crate::graph::tests::empty_tx;
    use crate::models::chat::Intent;
    use crate::server::tests::{ body_json, post_json, test_app };
    use crate::services::llm::classify_with_patterns;
    use axum::http::StatusCode;
    use httpmock::prelude::*;
    use serde_json::json;
    use tower::ServiceExt;

    async fn mock_graph(server: &MockServer) {
        server.mock_async(|when, then| {
            when.method(POST).path("/db/neo4j/tx/commit");
            then.status(200).json_body(empty_tx());
        }).await;
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let server = MockServer::start_async().await;
        let resp = test_app(&server, 0)
            .oneshot(post_json("/api/chat", json!({"message": "   \n"}))).await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn general_question_gets_starter_suggestions() {
        let server = MockServer::start_async().await;
        let resp = test_app(&server, 0)
            .oneshot(post_json("/api/chat", json!({"message": "hello", "session_id": "s1"}))).await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert!(json["message"].as_str().unwrap().contains("TP53 or BRCA1"));
        assert_eq!(json["follow_up_suggestions"][0], "Tell me about TP53");
        assert!(json.get("visualization_type").is_none());
    }

    #[tokio::test]
    async fn protein_question_returns_record_and_follow_ups() {
        let server = MockServer::start_async().await;
        mock_graph(&server).await;
        server.mock_async(|when, then| {
            when.method(GET).path("/uniprot/P04637");
            then.status(200).json_body(
                json!({
                "genes": [{"geneName": {"value": "TP53"}}],
                "proteinDescription": {"recommendedName": {"fullName": {"value": "Cellular tumor antigen p53"}}},
                "comments": [{"commentType": "FUNCTION", "texts": [{"value": "Acts as a tumor suppressor."}]}]
            })
            );
        }).await;

        let resp = test_app(&server, 0)
            .oneshot(post_json("/api/chat", json!({"message": "Tell me about TP53"}))).await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["data"]["id"], "P04637");
        assert!(json["message"].as_str().unwrap().starts_with("TP53 (Cellular tumor antigen p53) is a protein that"));
        assert_eq!(json["follow_up_suggestions"].as_array().unwrap().len(), 4);
        assert_eq!(json["follow_up_suggestions"][0], "Show me the structure of P04637");
    }

    #[tokio::test]
    async fn structure_question_carries_structure_visualization() {
        let server = MockServer::start_async().await;
        mock_graph(&server).await;
        server.mock_async(|when, then| {
            when.method(GET).path("/alphafold/prediction/P38398");
            then.status(200).json_body(
                json!([{"entryId": "AF-P38398-F1", "globalMetricValue": 61.2, "uniprotEnd": 1863,
                         "pdbUrl": "https://alphafold.ebi.ac.uk/files/AF-P38398-F1-model_v4.pdb"}])
            );
        }).await;

        let resp = test_app(&server, 0)
            .oneshot(post_json("/api/chat", json!({"message": "Show me the structure of BRCA1"}))).await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["visualization_type"], "structure");
        assert_eq!(json["visualization_data"]["source"], "alphafold");
        assert_eq!(json["visualization_data"]["alphafold_id"], "P38398");
        assert!(json["message"].as_str().unwrap().contains("AlphaFold"));
    }

    #[test]
    fn suggested_follow_ups_classify_without_a_model() {
        let cases = [
            ("Show me the structure of P04637", Intent::StructureInfo, "P04637"),
            ("What diseases are associated with P04637?", Intent::DiseaseInfo, "P04637"),
            ("Show protein interactions for P04637", Intent::Interactions, "P04637"),
            ("What drugs target P04637?", Intent::DrugInfo, "P04637"),
            ("What is the function of P38398?", Intent::ProteinInfo, "P38398"),
            ("Tell me about MDM2", Intent::ProteinInfo, "Q00987"),
            ("What drugs can treat Breast cancer associated with P04637?", Intent::DrugInfo, "P04637"),
            ("What drugs can treat Li-Fraumeni syndrome for TP53?", Intent::DrugInfo, "P04637"),
            ("Tell me about P04637", Intent::ProteinInfo, "P04637"),
            ("What diseases are associated with P04637 variants?", Intent::DiseaseInfo, "P04637"),
            ("Tell me more about P04637", Intent::ProteinInfo, "P04637"),
            ("Tell me about TP53", Intent::ProteinInfo, "P04637"),
            ("Show me the structure of BRCA1", Intent::StructureInfo, "P38398"),
            ("What diseases are associated with PTEN?", Intent::DiseaseInfo, "P60484"),
        ];
        for (query, intent, entity) in cases {
            let analysis = classify_with_patterns(query);
            assert_eq!(analysis.intent, intent, "{}", query);
            assert_eq!(analysis.entities, vec![entity.to_string()], "{}", query);
        }
    }

    #[test]
    fn drug_follow_up_never_yields_a_filler_entity() {
        let analysis = classify_with_patterns("How does Nutlin-3 work?");
        assert!(!analysis.entities.iter().any(|e| e == "FUNCTION" || e == "THE"));
        let analysis = classify_with_patterns("What is the role of the protein?");
        assert!(analysis.entities.is_empty());
    }
}
