use serde::{ Serialize, Deserialize };
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ChatMessage>,
}

/// Body of `POST /chat`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_user")]
    pub user_id: Option<String>,
}

fn default_user() -> Option<String> {
    Some("anonymous".to_string())
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationType {
    Structure,
    Interactions,
    KnowledgeGraph,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ChatResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(default)]
    pub follow_up_suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization_data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization_type: Option<VisualizationType>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ProteinInfo,
    StructureInfo,
    Interactions,
    DiseaseInfo,
    DrugInfo,
    VariantInfo,
    General,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::ProteinInfo,
        Intent::StructureInfo,
        Intent::Interactions,
        Intent::DiseaseInfo,
        Intent::DrugInfo,
        Intent::VariantInfo,
        Intent::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ProteinInfo => "protein_info",
            Intent::StructureInfo => "structure_info",
            Intent::Interactions => "interactions",
            Intent::DiseaseInfo => "disease_info",
            Intent::DrugInfo => "drug_info",
            Intent::VariantInfo => "variant_info",
            Intent::General => "general",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .iter()
            .find(|i| i.as_str() == s.trim().to_lowercase())
            .copied()
            .ok_or_else(|| format!("Unknown intent: '{}'", s))
    }
}

/// Outcome of classifying a user query.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QueryAnalysis {
    pub intent: Intent,
    pub entities: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_round_trips_through_str() {
        for intent in Intent::ALL {
            assert_eq!(intent.as_str().parse::<Intent>().unwrap(), intent);
        }
        assert!("weather".parse::<Intent>().is_err());
    }

    #[test]
    fn chat_response_omits_empty_visualization() {
        let resp = ChatResponse {
            message: "hi".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("visualization_type").is_none());
        assert_eq!(json["follow_up_suggestions"], serde_json::json!([]));
    }

    #[test]
    fn chat_request_defaults_user() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"Tell me about TP53"}"#).unwrap();
        assert_eq!(req.user_id.as_deref(), Some("anonymous"));
        assert!(req.session_id.is_none());
    }
}
