//! Tolerant decoding of visualization payloads.
//!
//! Payloads may arrive as bare arrays, wrapped in `interactions` / `nodes`+`edges` / `data` /
//! `results` / `visualization_data`, as JSON-encoded strings, or as objects whose arrays have
//! unrelated names. Every entry point returns `Normalized::Data` or `Normalized::NoData`; no
//! input shape panics and nothing is invented when the payload is empty.

use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value as JsonValue };
use std::collections::HashMap;

/// JSON-in-a-string payloads are unwrapped at most this many times.
const MAX_DECODE_DEPTH: usize = 3;
/// Wrapper objects are descended at most this many levels.
const MAX_WRAPPER_DEPTH: usize = 4;

const INTERACTION_KEYS: [&str; 7] = [
    "interactions",
    "visualization_data",
    "data",
    "results",
    "edges",
    "links",
    "partners",
];
const GRAPH_WRAPPER_KEYS: [&str; 5] = ["visualization_data", "data", "results", "graph", "knowledge_graph"];
const EDGE_LIST_KEYS: [&str; 3] = ["edges", "relationships", "links"];
const FIELD_ORDER: [&str; 7] = ["id", "name", "full_name", "function", "description", "organism", "length"];
const MAX_FIELD_CHARS: usize = 120;

#[derive(Clone, Debug, PartialEq)]
pub enum Normalized<T> {
    Data(T),
    NoData {
        reason: String,
    },
}

impl<T> Normalized<T> {
    pub fn no_data(reason: impl Into<String>) -> Self {
        Normalized::NoData { reason: reason.into() }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Normalized::Data(d) => Some(d),
            Normalized::NoData { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Normalized<U> {
        match self {
            Normalized::Data(d) => Normalized::Data(f(d)),
            Normalized::NoData { reason } => Normalized::NoData { reason },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub id: String,
    pub label: String,
    pub node_type: String,
    #[serde(default)]
    pub properties: Map<String, JsonValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub source: String,
    pub target: String,
    pub edge_type: String,
    pub score: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkGraph {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

impl NetworkGraph {
    pub fn node(&self, id: &str) -> Option<&NetworkNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

#[derive(Default)]
struct GraphBuilder {
    graph: NetworkGraph,
    node_index: HashMap<String, usize>,
    edge_index: HashMap<(String, String), usize>,
}

impl GraphBuilder {
    fn add_node(&mut self, id: &str, label: &str, node_type: &str, properties: Map<String, JsonValue>) {
        if let Some(&i) = self.node_index.get(id) {
            let node = &mut self.graph.nodes[i];
            if node.label == node.id && !label.is_empty() {
                node.label = label.to_string();
            }
            return;
        }
        self.node_index.insert(id.to_string(), self.graph.nodes.len());
        self.graph.nodes.push(NetworkNode {
            id: id.to_string(),
            label: if label.is_empty() { id.to_string() } else { label.to_string() },
            node_type: node_type.to_string(),
            properties,
        });
    }

    fn has_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    /// Undirected dedup; the higher score wins. Self-loops are dropped.
    fn add_edge(&mut self, source: &str, target: &str, edge_type: &str, score: Option<f64>) {
        if source == target {
            return;
        }
        let key = if source < target {
            (source.to_string(), target.to_string())
        } else {
            (target.to_string(), source.to_string())
        };
        if let Some(&i) = self.edge_index.get(&key) {
            let edge = &mut self.graph.edges[i];
            if score.unwrap_or(f64::MIN) > edge.score.unwrap_or(f64::MIN) {
                edge.score = score;
            }
            return;
        }
        self.edge_index.insert(key, self.graph.edges.len());
        self.graph.edges.push(NetworkEdge {
            source: source.to_string(),
            target: target.to_string(),
            edge_type: edge_type.to_string(),
            score,
        });
    }
}

/// Unwraps JSON-encoded strings.
fn decode(value: &JsonValue) -> JsonValue {
    let mut current = value.clone();
    for _ in 0..MAX_DECODE_DEPTH {
        let JsonValue::String(s) = &current else {
            break;
        };
        let trimmed = s.trim();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with('"')) {
            break;
        }
        match serde_json::from_str::<JsonValue>(trimmed) {
            Ok(parsed) => {
                current = parsed;
            }
            Err(_) => break,
        }
    }
    current
}

fn text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_text(record: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| text(&record[*k]))
}

fn score(record: &JsonValue, keys: &[&str]) -> Option<f64> {
    let raw = keys.iter().find_map(|k| {
        let v = &record[*k];
        v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    })?;
    if !raw.is_finite() {
        return None;
    }
    Some(if raw > 1.0 { (raw / 1000.0).min(1.0) } else { raw.max(0.0) })
}

fn longest_array(map: &Map<String, JsonValue>) -> Option<Vec<JsonValue>> {
    map.values()
        .filter_map(|v| match decode(v) {
            JsonValue::Array(items) if !items.is_empty() => Some(items),
            _ => None,
        })
        .max_by_key(|items| items.len())
}

fn find_records(value: &JsonValue, keys: &[&str], depth: usize) -> Option<Vec<JsonValue>> {
    match decode(value) {
        JsonValue::Array(items) => Some(items),
        JsonValue::Object(map) => {
            if depth < MAX_WRAPPER_DEPTH {
                for key in keys {
                    if let Some(inner) = map.get(*key) {
                        if let Some(records) = find_records(inner, keys, depth + 1) {
                            if !records.is_empty() {
                                return Some(records);
                            }
                        }
                    }
                }
            }
            longest_array(&map)
        }
        _ => None,
    }
}

/// Interaction network centred on `query_id`.
pub fn normalize_interactions(query_id: &str, payload: &JsonValue) -> Normalized<NetworkGraph> {
    let Some(records) = find_records(payload, &INTERACTION_KEYS, 0) else {
        return Normalized::no_data(format!("No interaction data for {}", query_id));
    };
    let records: Vec<JsonValue> = records
        .iter()
        .map(decode)
        .filter(|r| r.is_object())
        .collect();

    let center_alias = string_center_alias(query_id, &records);
    let is_center = |name: &str| {
        name.eq_ignore_ascii_case(query_id) ||
            center_alias.as_deref().is_some_and(|alias| name.eq_ignore_ascii_case(alias))
    };

    let mut builder = GraphBuilder::default();
    builder.add_node(query_id, center_alias.as_deref().unwrap_or(query_id), "query", Map::new());

    for record in &records {
        let edge_score = score(record, &["score", "combined_score", "confidence", "weight"]);
        if record.get("preferredName_A").is_some() || record.get("preferredName_B").is_some() {
            let a = first_text(record, &["preferredName_A", "stringId_A"]);
            let b = first_text(record, &["preferredName_B", "stringId_B"]);
            let (Some(a), Some(b)) = (a, b) else {
                continue;
            };
            let a_id = if is_center(&a) { query_id.to_string() } else { a.clone() };
            let b_id = if is_center(&b) { query_id.to_string() } else { b.clone() };
            builder.add_node(&a_id, &a, "protein", Map::new());
            builder.add_node(&b_id, &b, "protein", Map::new());
            builder.add_edge(&a_id, &b_id, "interacts_with", edge_score);
        } else if record.get("protein_id").is_some() || record.get("protein_name").is_some() {
            let id = first_text(record, &["protein_id", "protein_name"]);
            let Some(id) = id else {
                continue;
            };
            let label = first_text(record, &["protein_name", "protein_id"]).unwrap_or_else(|| id.clone());
            if is_center(&id) || is_center(&label) {
                continue;
            }
            builder.add_node(&id, &label, "protein", Map::new());
            builder.add_edge(query_id, &id, "interacts_with", edge_score);
        } else {
            let source = first_text(record, &["source", "from", "startNode"]);
            let target = first_text(record, &["target", "to", "endNode"]);
            let (Some(source), Some(target)) = (source, target) else {
                continue;
            };
            let source = if is_center(&source) { query_id.to_string() } else { source };
            let target = if is_center(&target) { query_id.to_string() } else { target };
            builder.add_node(&source, &source, "protein", Map::new());
            builder.add_node(&target, &target, "protein", Map::new());
            let edge_type = first_text(record, &["type", "label"]).unwrap_or_else(|| "interacts_with".into());
            builder.add_edge(&source, &target, &edge_type, edge_score);
        }
    }

    if builder.graph.edges.is_empty() {
        return Normalized::no_data(format!("No interactions found for {}", query_id));
    }
    Normalized::Data(builder.graph)
}

/// STRING records name the query protein by gene symbol; the most frequent name is taken
/// to be the centre when the accession itself never appears.
fn string_center_alias(query_id: &str, records: &[JsonValue]) -> Option<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in records {
        for key in ["preferredName_A", "preferredName_B"] {
            if let Some(name) = text(&record[key]) {
                if name.eq_ignore_ascii_case(query_id) {
                    return None;
                }
                *counts.entry(name).or_default() += 1;
            }
        }
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(name, _)| name)
}

fn looks_like_edge(record: &JsonValue) -> bool {
    first_text(record, &["source", "from", "startNode"]).is_some() &&
        first_text(record, &["target", "to", "endNode"]).is_some()
}

/// Node and edge record lists found in `value`.
fn find_graph(value: &JsonValue, depth: usize) -> Option<(Vec<JsonValue>, Vec<JsonValue>)> {
    match decode(value) {
        JsonValue::Array(items) => {
            if items.iter().any(looks_like_edge) { Some((Vec::new(), items)) } else { Some((items, Vec::new())) }
        }
        JsonValue::Object(map) => {
            if let Some(JsonValue::Array(nodes)) = map.get("nodes").map(decode) {
                let edges = EDGE_LIST_KEYS.iter()
                    .find_map(|k| match map.get(*k).map(decode) {
                        Some(JsonValue::Array(edges)) => Some(edges),
                        _ => None,
                    })
                    .unwrap_or_default();
                return Some((nodes, edges));
            }
            if depth < MAX_WRAPPER_DEPTH {
                for key in GRAPH_WRAPPER_KEYS {
                    if let Some(inner) = map.get(key) {
                        if let Some(found) = find_graph(inner, depth + 1) {
                            if !found.0.is_empty() || !found.1.is_empty() {
                                return Some(found);
                            }
                        }
                    }
                }
            }
            let items = longest_array(&map)?;
            find_graph(&JsonValue::Array(items), depth + 1)
        }
        _ => None,
    }
}

/// Knowledge-graph nodes and edges. Edges to unknown nodes are dropped.
pub fn normalize_graph(payload: &JsonValue) -> Normalized<NetworkGraph> {
    let Some((node_records, edge_records)) = find_graph(payload, 0) else {
        return Normalized::no_data("No graph data in response");
    };
    let derive_nodes = node_records.is_empty();

    let mut builder = GraphBuilder::default();
    for record in node_records.iter().map(decode) {
        let Some(id) = first_text(&record, &["id", "identifier"]).or_else(|| text(&record["properties"]["id"])) else {
            continue;
        };
        let label = first_text(&record, &["name", "label"]).unwrap_or_else(|| id.clone());
        let node_type = first_text(&record, &["type", "node_type", "group"])
            .or_else(|| text(&record["labels"][0]))
            .unwrap_or_else(|| "Entity".into());
        let properties = match record {
            JsonValue::Object(mut map) => {
                for consumed in ["id", "name", "label", "type"] {
                    map.remove(consumed);
                }
                map
            }
            _ => Map::new(),
        };
        builder.add_node(&id, &label, &node_type, properties);
    }

    for record in edge_records.iter().map(decode) {
        let source = first_text(&record, &["source", "from", "startNode", "start"]);
        let target = first_text(&record, &["target", "to", "endNode", "end"]);
        let (Some(source), Some(target)) = (source, target) else {
            continue;
        };
        if derive_nodes {
            builder.add_node(&source, &source, "Entity", Map::new());
            builder.add_node(&target, &target, "Entity", Map::new());
        } else if !builder.has_node(&source) || !builder.has_node(&target) {
            continue;
        }
        let edge_type = first_text(&record, &["type", "label", "relationship", "relation"]).unwrap_or_else(||
            "related_to".into()
        );
        builder.add_edge(&source, &target, &edge_type, score(&record, &["score", "weight", "confidence"]));
    }

    if builder.graph.nodes.is_empty() {
        return Normalized::no_data("Knowledge graph is empty");
    }
    Normalized::Data(builder.graph)
}

fn field_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) if s.trim().is_empty() => None,
        JsonValue::String(s) => {
            let s = s.trim();
            if s.chars().count() > MAX_FIELD_CHARS {
                Some(format!("{}...", s.chars().take(MAX_FIELD_CHARS).collect::<String>()))
            } else {
                Some(s.to_string())
            }
        }
        JsonValue::Array(items) if items.is_empty() => None,
        JsonValue::Array(items) => Some(format!("{} items", items.len())),
        JsonValue::Object(_) => None,
    }
}

/// Flat name/value rows for a detail pane. Nested objects are flattened one level.
pub fn normalize_fields(payload: &JsonValue) -> Normalized<Vec<Field>> {
    let mut value = decode(payload);
    if value.get("id").is_none() {
        if let Some(inner) = value.get("data").map(decode).filter(JsonValue::is_object) {
            value = inner;
        }
    }
    let JsonValue::Object(map) = value else {
        return Normalized::no_data("Details are not an object");
    };

    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_by_key(|k| {
        let rank = FIELD_ORDER.iter().position(|f| *f == k.as_str()).unwrap_or(FIELD_ORDER.len());
        (rank, k.to_string())
    });

    let mut fields = Vec::new();
    for key in keys {
        let raw = decode(&map[key]);
        if let JsonValue::Object(inner) = &raw {
            for (child, v) in inner {
                if let Some(value) = field_value(v) {
                    fields.push(Field { name: format!("{}.{}", key, child), value });
                }
            }
        } else if let Some(value) = field_value(&raw) {
            fields.push(Field { name: key.clone(), value });
        }
    }

    if fields.is_empty() {
        return Normalized::no_data("No details available");
    }
    Normalized::Data(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn partner_labels(graph: &NetworkGraph) -> Vec<String> {
        let mut labels: Vec<String> = graph.nodes
            .iter()
            .filter(|n| n.node_type != "query")
            .map(|n| n.label.clone())
            .collect();
        labels.sort();
        labels
    }

    #[test]
    fn interactions_from_bare_array() {
        let payload =
            json!([
            {"protein_id": "Q00987", "protein_name": "MDM2", "score": 0.999},
            {"protein_id": "Q09472", "protein_name": "EP300", "score": 0.95},
            {"protein_id": "Q00987", "protein_name": "MDM2", "score": 0.5}
        ]);
        let graph = normalize_interactions("P04637", &payload).data().cloned().unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.edges[0].score, Some(0.999));
        assert!(graph.edges.iter().all(|e| e.source == "P04637"));
    }

    #[test]
    fn interactions_from_wrapped_json_string() {
        let inner = json!({"interactions": [{"protein_id": "Q00987", "protein_name": "MDM2", "score": 0.9}]});
        let payload = json!({"visualization_data": inner.to_string()});
        let graph = normalize_interactions("P04637", &JsonValue::String(payload.to_string()));
        assert_eq!(partner_labels(graph.data().unwrap()), vec!["MDM2"]);
    }

    #[test]
    fn string_records_find_their_centre_by_symbol() {
        let payload =
            json!([
            {"preferredName_A": "TP53", "preferredName_B": "MDM2", "stringId_A": "9606.A", "stringId_B": "9606.B", "score": 999},
            {"preferredName_A": "TP53", "preferredName_B": "SIRT1", "score": 0.87}
        ]);
        let graph = normalize_interactions("P04637", &payload).data().cloned().unwrap();
        assert_eq!(graph.node("P04637").unwrap().label, "TP53");
        assert_eq!(partner_labels(&graph), vec!["MDM2", "SIRT1"]);
        assert_eq!(graph.edges[0].score, Some(0.999));
    }

    #[test]
    fn unrelated_array_names_use_longest_array() {
        let payload =
            json!({
            "meta": [1],
            "whatever": [
                {"source": "P04637", "target": "Q00987"},
                {"source": "P04637", "target": "P38398"}
            ]
        });
        let graph = normalize_interactions("P04637", &payload).data().cloned().unwrap();
        assert_eq!(graph.edges.len(), 2);
    }

    #[test]
    fn odd_shapes_yield_no_data_instead_of_panicking() {
        let shapes = [
            JsonValue::Null,
            json!(42),
            json!("not json at all"),
            json!("{broken"),
            json!([]),
            json!({}),
            json!([1, "two", null]),
            json!({"interactions": "[]"}),
            json!([[{"protein_id": "x"}]]),
        ];
        for shape in shapes {
            assert!(
                matches!(normalize_interactions("P04637", &shape), Normalized::NoData { .. }),
                "{}",
                shape
            );
            let graph = normalize_graph(&shape);
            assert!(graph.data().map_or(true, |g| !g.nodes.is_empty()), "{}", shape);
            let fields = normalize_fields(&shape);
            assert!(fields.data().map_or(true, |f| !f.is_empty()), "{}", shape);
        }
    }

    #[test]
    fn graph_drops_dangling_edges_and_duplicate_nodes() {
        let payload =
            json!({
            "nodes": [
                {"id": "P04637", "type": "Protein", "label": "TP53"},
                {"id": "DOID:1612", "type": "Disease", "name": "Breast cancer"},
                {"id": "P04637", "type": "Protein", "label": "TP53"}
            ],
            "edges": [
                {"id": "edge_0", "source": "P04637", "target": "DOID:1612", "type": "ASSOCIATED_WITH"},
                {"id": "edge_1", "source": "P04637", "target": "CHEMBL0", "type": "TARGETS"}
            ]
        });
        let graph = normalize_graph(&payload).data().cloned().unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.node("DOID:1612").unwrap().label, "Breast cancer");
        assert_eq!(graph.node("P04637").unwrap().label, "TP53");
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].edge_type, "ASSOCIATED_WITH");
    }

    #[test]
    fn graph_inside_chat_response_and_neo4j_style_labels() {
        let payload =
            json!({
            "message": "...",
            "visualization_data": {
                "nodes": [{"id": "1", "labels": ["Drug"], "properties": {"name": "Gefitinib"}}],
                "relationships": []
            }
        });
        let graph = normalize_graph(&payload).data().cloned().unwrap();
        assert_eq!(graph.nodes[0].node_type, "Drug");
        assert_eq!(graph.nodes[0].label, "1");
    }

    #[test]
    fn edge_only_graph_derives_nodes() {
        let payload = json!([{"from": "A", "to": "B", "relationship": "INVOLVES"}]);
        let graph = normalize_graph(&payload).data().cloned().unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges[0].edge_type, "INVOLVES");
    }

    #[test]
    fn fields_put_identity_first_and_flatten_structure() {
        let payload =
            json!({
            "data": {
                "organism": "Homo sapiens",
                "id": "P04637",
                "name": "TP53",
                "structure": {"source": "pdb", "pdb_id": "1TUP"},
                "interactions": [{"protein_id": "Q00987"}],
                "sequence": "M".repeat(500),
                "function": null
            }
        });
        let fields = normalize_fields(&payload).data().cloned().unwrap();
        assert_eq!(fields[0], Field { name: "id".into(), value: "P04637".into() });
        assert_eq!(fields[1].name, "name");
        assert!(fields.iter().any(|f| f.name == "structure.pdb_id" && f.value == "1TUP"));
        assert!(fields.iter().any(|f| f.name == "interactions" && f.value == "1 items"));
        assert!(fields.iter().all(|f| f.name != "function"));
        let sequence = fields.iter().find(|f| f.name == "sequence").unwrap();
        assert!(sequence.value.ends_with("..."));
    }
}
