use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value as JsonValue };
use std::fmt;
use std::str::FromStr;

/// Node labels the knowledge graph knows about. Only these are ever placed into Cypher text.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EntityType {
    Protein,
    Disease,
    Drug,
    Pathway,
    Gene,
    Structure,
    Variant,
}

impl EntityType {
    pub const SEARCHABLE: [EntityType; 4] = [
        EntityType::Protein,
        EntityType::Disease,
        EntityType::Drug,
        EntityType::Pathway,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Protein => "Protein",
            EntityType::Disease => "Disease",
            EntityType::Drug => "Drug",
            EntityType::Pathway => "Pathway",
            EntityType::Gene => "Gene",
            EntityType::Structure => "Structure",
            EntityType::Variant => "Variant",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "protein" => Ok(EntityType::Protein),
            "disease" => Ok(EntityType::Disease),
            "drug" => Ok(EntityType::Drug),
            "pathway" => Ok(EntityType::Pathway),
            "gene" => Ok(EntityType::Gene),
            "structure" => Ok(EntityType::Structure),
            "variant" => Ok(EntityType::Variant),
            _ => Err(format!("Unsupported entity type: '{}'", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    #[serde(flatten)]
    pub properties: Map<String, JsonValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(flatten)]
    pub properties: Map<String, JsonValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct KnowledgeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl KnowledgeGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub score: f64,
    #[serde(flatten)]
    pub properties: Map<String, JsonValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchResults {
    pub proteins: Vec<SearchHit>,
    pub diseases: Vec<SearchHit>,
    pub drugs: Vec<SearchHit>,
    pub pathways: Vec<SearchHit>,
}

impl SearchResults {
    pub fn bucket_mut(&mut self, entity: EntityType) -> Option<&mut Vec<SearchHit>> {
        match entity {
            EntityType::Protein => Some(&mut self.proteins),
            EntityType::Disease => Some(&mut self.diseases),
            EntityType::Drug => Some(&mut self.drugs),
            EntityType::Pathway => Some(&mut self.pathways),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GraphPath {
    pub found: bool,
    pub length: usize,
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_parses_case_insensitively() {
        assert_eq!("protein".parse::<EntityType>().unwrap(), EntityType::Protein);
        assert_eq!("Pathway".parse::<EntityType>().unwrap(), EntityType::Pathway);
        assert!("Protein) DETACH DELETE (n".parse::<EntityType>().is_err());
    }

    #[test]
    fn node_flattens_properties() {
        let mut props = Map::new();
        props.insert("function".into(), JsonValue::from("tumor suppressor"));
        let node = GraphNode {
            id: "P04637".into(),
            node_type: "Protein".into(),
            label: "TP53".into(),
            properties: props,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "Protein");
        assert_eq!(json["function"], "tumor suppressor");
    }
}
