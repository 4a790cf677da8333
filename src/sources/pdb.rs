use super::{ json_or_none, str_field, trim_base };
use crate::error::Result;
use crate::models::protein::{ PolymerEntity, StructureInfo };
use log::{ info, warn };
use reqwest::Client;
use serde_json::{ json, Value as JsonValue };

const ENTRY_QUERY: &str =
    r#"query StructureQuery($id: String!) {
  entry(entry_id: $id) {
    rcsb_id
    struct { title pdbx_descriptor }
    rcsb_entry_info { resolution_combined experimental_method }
    polymer_entities {
      rcsb_id
      entity_poly { pdbx_seq_one_letter_code }
      rcsb_polymer_entity { pdbx_description }
    }
  }
}"#;

/// RCSB search (best-resolution entry for an accession) plus GraphQL entry details.
#[derive(Clone)]
pub struct PdbClient {
    http: Client,
    search_url: String,
    graphql_url: String,
}

impl PdbClient {
    pub fn new(http: Client, search_url: &str, graphql_url: &str) -> Self {
        Self {
            http,
            search_url: trim_base(search_url),
            graphql_url: trim_base(graphql_url),
        }
    }

    pub async fn find_structure(&self, accession: &str) -> Result<Option<StructureInfo>> {
        let Some(entry_id) = self.search_best_entry(accession).await? else {
            warn!("No PDB structures found for {}", accession);
            return Ok(None);
        };
        self.entry_details(&entry_id).await
    }

    /// Entry id of the best-resolution polymer entity mapped to `accession`.
    pub async fn search_best_entry(&self, accession: &str) -> Result<Option<String>> {
        info!("Querying PDB for protein: {}", accession);
        let payload =
            json!({
            "query": {
                "type": "terminal",
                "service": "text",
                "parameters": {
                    "attribute": "rcsb_polymer_entity_container_identifiers.reference_sequence_identifiers.database_accession",
                    "operator": "exact_match",
                    "value": accession
                }
            },
            "return_type": "polymer_entity",
            "request_options": {
                "paginate": { "start": 0, "rows": 100 },
                "sort": [{ "sort_by": "rcsb_entry_info.resolution_combined", "direction": "asc" }]
            }
        });
        let resp = self.http.post(&self.search_url).json(&payload).send().await?;
        let Some(body) = json_or_none("PDB search", resp).await? else {
            return Ok(None);
        };
        Ok(
            body["result_set"][0]["identifier"]
                .as_str()
                .and_then(|id| id.split('_').next())
                .filter(|id| !id.is_empty())
                .map(String::from)
        )
    }

    pub async fn entry_details(&self, entry_id: &str) -> Result<Option<StructureInfo>> {
        let payload = json!({ "query": ENTRY_QUERY, "variables": { "id": entry_id } });
        let resp = self.http.post(&self.graphql_url).json(&payload).send().await?;
        let Some(body) = json_or_none("PDB GraphQL", resp).await? else {
            return Ok(None);
        };
        let entry = &body["data"]["entry"];
        if entry.is_null() {
            warn!("PDB returned no details for entry {}", entry_id);
            return Ok(None);
        }
        Ok(Some(parse_entry(entry_id, entry)))
    }

    pub async fn probe(&self) -> Result<u16> {
        let resp = self.http
            .post(&self.graphql_url)
            .json(&json!({ "query": "{ entry(entry_id: \"4HHB\") { rcsb_id } }" }))
            .send().await?;
        Ok(resp.status().as_u16())
    }
}

fn parse_entry(entry_id: &str, entry: &JsonValue) -> StructureInfo {
    let info = &entry["rcsb_entry_info"];
    let resolution = info["resolution_combined"]
        .as_array()
        .and_then(|values| values.first())
        .and_then(JsonValue::as_f64)
        .or_else(|| info["resolution_combined"].as_f64());
    let polymer_entities = entry["polymer_entities"]
        .as_array()
        .map(|entities| {
            entities
                .iter()
                .map(|e| PolymerEntity {
                    entity_id: str_field(e, "rcsb_id").unwrap_or_default(),
                    description: e["rcsb_polymer_entity"]["pdbx_description"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    sequence: e["entity_poly"]["pdbx_seq_one_letter_code"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    StructureInfo::Pdb {
        pdb_id: entry_id.to_string(),
        title: entry["struct"]["title"].as_str().unwrap_or_default().to_string(),
        description: entry["struct"]["pdbx_descriptor"].as_str().unwrap_or_default().to_string(),
        resolution,
        method: info["experimental_method"].as_str().unwrap_or_default().to_string(),
        polymer_entities,
        viewer_url: format!("https://www.rcsb.org/3d-view/{}", entry_id),
        download_url: format!("https://files.rcsb.org/download/{}.pdb", entry_id),
    }
}
