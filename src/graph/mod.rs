//! Neo4j access through the HTTP transactional Cypher endpoint (`/db/{db}/tx/commit`).

mod protein;
mod seed;

pub use self::seed::{ ensure_seeded, import_graph_data, split_statements };

use crate::cli::Args;
use crate::error::{ AppError, Result };
use crate::models::graph::{ GraphEdge, GraphNode, KnowledgeGraph };
use log::{ debug, info };
use reqwest::Client;
use serde::Deserialize;
use serde_json::{ json, Map, Value as JsonValue };
use std::collections::{ HashMap, HashSet };

pub type Row = Map<String, JsonValue>;

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxData>,
}

#[derive(Deserialize)]
struct TxData {
    #[serde(default)]
    row: Vec<JsonValue>,
    #[serde(default)]
    graph: Option<RawGraph>,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawNode {
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Map<String, JsonValue>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawRelationship {
    pub id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(rename = "startNode")]
    pub start_node: String,
    #[serde(rename = "endNode")]
    pub end_node: String,
    #[serde(default)]
    pub properties: Map<String, JsonValue>,
}

/// Nodes and relationships keyed by Neo4j's internal ids.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RawGraph {
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub relationships: Vec<RawRelationship>,
}

impl RawGraph {
    fn merge(&mut self, other: RawGraph) {
        self.nodes.extend(other.nodes);
        self.relationships.extend(other.relationships);
        dedup_by_id(&mut self.nodes, |n| &n.id);
        dedup_by_id(&mut self.relationships, |r| &r.id);
    }

    /// Converts to the public graph shape: nodes keyed by their `id` property, edges whose
    /// endpoints cannot be resolved are dropped.
    pub fn into_knowledge_graph(self) -> KnowledgeGraph {
        let mut public_ids: HashMap<String, String> = HashMap::new();
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();

        for (index, node) in self.nodes.into_iter().enumerate() {
            let public_id = node.properties
                .get("id")
                .and_then(JsonValue::as_str)
                .map(String::from)
                .unwrap_or_else(|| format!("node_{}", index));
            public_ids.insert(node.id.clone(), public_id.clone());
            if !seen.insert(public_id.clone()) {
                continue;
            }
            let label = node.properties
                .get("name")
                .and_then(JsonValue::as_str)
                .unwrap_or(&public_id)
                .to_string();
            let mut properties = node.properties;
            properties.remove("id");
            properties.remove("type");
            properties.remove("label");
            nodes.push(GraphNode {
                id: public_id,
                node_type: node.labels.into_iter().next().unwrap_or_else(|| "Entity".into()),
                label,
                properties,
            });
        }

        let edges = self.relationships
            .into_iter()
            .filter_map(|rel| {
                let source = public_ids.get(&rel.start_node)?.clone();
                let target = public_ids.get(&rel.end_node)?.clone();
                Some((source, target, rel))
            })
            .enumerate()
            .map(|(index, (source, target, rel))| {
                let mut properties = rel.properties;
                for reserved in ["id", "source", "target", "type"] {
                    properties.remove(reserved);
                }
                GraphEdge {
                    id: format!("edge_{}", index),
                    source,
                    target,
                    edge_type: rel.rel_type,
                    properties,
                }
            })
            .collect();

        KnowledgeGraph { nodes, edges }
    }
}

fn dedup_by_id<T, F: Fn(&T) -> &String>(items: &mut Vec<T>, key: F) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(key(item).clone()));
}

#[derive(Debug, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub graph: RawGraph,
}

#[derive(Clone)]
pub struct GraphDb {
    http: Client,
    endpoint: String,
    user: String,
    password: String,
}

impl GraphDb {
    pub fn new(http: Client, uri: &str, database: &str, user: &str, password: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/db/{}/tx/commit", uri.trim_end_matches('/'), database),
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    pub fn from_args(http: Client, args: &Args) -> Self {
        Self::new(http, &args.neo4j_uri, &args.neo4j_database, &args.neo4j_user, &args.neo4j_password)
    }

    /// Runs one statement and returns its rows keyed by column name.
    pub async fn execute(&self, statement: &str, params: JsonValue) -> Result<Vec<Row>> {
        Ok(self.run(statement, params, false).await?.rows)
    }

    /// Runs one statement and also collects the nodes and relationships it returned.
    pub async fn execute_graph(&self, statement: &str, params: JsonValue) -> Result<QueryResult> {
        self.run(statement, params, true).await
    }

    async fn run(&self, statement: &str, params: JsonValue, with_graph: bool) -> Result<QueryResult> {
        let contents = if with_graph { json!(["row", "graph"]) } else { json!(["row"]) };
        let body =
            json!({
            "statements": [{
                "statement": statement,
                "parameters": params,
                "resultDataContents": contents
            }]
        });
        debug!("Cypher: {}", statement.trim());

        let resp = self.http
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Graph(format!("Neo4j returned HTTP {}", status.as_u16())));
        }
        let tx: TxResponse = resp.json().await?;
        if let Some(err) = tx.errors.first() {
            return Err(AppError::Graph(format!("{}: {}", err.code, err.message)));
        }

        let mut out = QueryResult::default();
        for result in tx.results {
            for data in result.data {
                let row: Row = result.columns.iter().cloned().zip(data.row.into_iter()).collect();
                out.rows.push(row);
                if let Some(graph) = data.graph {
                    out.graph.merge(graph);
                }
            }
        }
        Ok(out)
    }

    pub async fn test_connection(&self) -> Result<()> {
        let rows = self.execute("RETURN 1 AS num", json!({})).await?;
        match rows.first().and_then(|r| r.get("num")).and_then(JsonValue::as_i64) {
            Some(1) => Ok(()),
            _ => Err(AppError::Graph("Unexpected reply to connectivity check".into())),
        }
    }

    pub async fn count_nodes(&self) -> Result<u64> {
        let rows = self.execute("MATCH (n) RETURN count(n) AS count", json!({})).await?;
        Ok(
            rows
                .first()
                .and_then(|r| r.get("count"))
                .and_then(JsonValue::as_u64)
                .unwrap_or(0)
        )
    }

    /// Subgraph within two hops of the entity, nodes deduplicated.
    pub async fn entity_subgraph(&self, label: &str, entity_id: &str) -> Result<KnowledgeGraph> {
        let statement = format!(
            "MATCH (e:{label} {{id: $entity_id}})
             OPTIONAL MATCH path = (e)-[*1..2]-(m)
             RETURN e, path",
            label = label
        );
        let result = self.execute_graph(&statement, json!({ "entity_id": entity_id })).await?;
        info!(
            "Subgraph for {}:{} has {} nodes and {} relationships",
            label,
            entity_id,
            result.graph.nodes.len(),
            result.graph.relationships.len()
        );
        Ok(result.graph.into_knowledge_graph())
    }

    /// Nodes and relationships on the shortest path, ordered from `source_id` to `target_id`.
    pub async fn shortest_path(&self, source_id: &str, target_id: &str) -> Result<Option<KnowledgeGraph>> {
        let result = self.execute_graph(
            "MATCH (source {id: $source_id}), (target {id: $target_id}),
                   path = shortestPath((source)-[*..6]-(target))
             RETURN path",
            json!({ "source_id": source_id, "target_id": target_id })
        ).await?;
        if result.rows.is_empty() {
            return Ok(None);
        }
        let graph = result.graph.into_knowledge_graph();
        Ok(Some(order_path(graph, source_id)))
    }

    /// Case-insensitive substring match on `id` or `name` within one label.
    pub async fn search_label(&self, label: &str, query: &str, limit: usize) -> Result<Vec<Row>> {
        let statement = format!(
            "MATCH (n:{label})
             WHERE toLower(n.id) CONTAINS toLower($query)
                OR toLower(coalesce(n.name, '')) CONTAINS toLower($query)
             RETURN n LIMIT $limit",
            label = label
        );
        let rows = self.execute(&statement, json!({ "query": query, "limit": limit })).await?;
        Ok(
            rows
                .into_iter()
                .filter_map(|mut row| match row.remove("n") {
                    Some(JsonValue::Object(props)) => Some(props),
                    _ => None,
                })
                .collect()
        )
    }
}

fn order_path(graph: KnowledgeGraph, source_id: &str) -> KnowledgeGraph {
    let KnowledgeGraph { nodes, edges } = graph;
    let mut by_id: HashMap<String, GraphNode> = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
    let mut remaining = edges;
    let mut ordered_nodes = Vec::new();
    let mut ordered_edges = Vec::new();
    let mut current = source_id.to_string();

    if let Some(node) = by_id.remove(&current) {
        ordered_nodes.push(node);
    }
    while let Some(pos) = remaining.iter().position(|e| e.source == current || e.target == current) {
        let edge = remaining.remove(pos);
        current = if edge.source == current { edge.target.clone() } else { edge.source.clone() };
        ordered_edges.push(edge);
        if let Some(node) = by_id.remove(&current) {
            ordered_nodes.push(node);
        }
    }
    ordered_nodes.extend(by_id.into_values());
    ordered_edges.extend(remaining);
    KnowledgeGraph { nodes: ordered_nodes, edges: ordered_edges }
}
