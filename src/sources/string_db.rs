use super::{ json_or_none, str_field, trim_base };
use crate::error::Result;
use crate::models::protein::Interaction;
use log::info;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::collections::HashSet;

const HUMAN_TAXON: &str = "9606";
const REQUIRED_SCORE: &str = "700";

#[derive(Clone)]
pub struct StringDbClient {
    http: Client,
    base_url: String,
}

impl StringDbClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self { http, base_url: trim_base(base_url) }
    }

    /// High-confidence physical partners of `gene_symbol` in human.
    pub async fn fetch_interactions(&self, gene_symbol: &str, accession: &str) -> Result<Vec<Interaction>> {
        info!("Querying STRING DB for interactions with {}", gene_symbol);
        let resp = self.http
            .get(format!("{}/json/network", self.base_url))
            .query(
                &[
                    ("identifiers", gene_symbol),
                    ("species", HUMAN_TAXON),
                    ("limit", "50"),
                    ("network_type", "physical"),
                    ("required_score", REQUIRED_SCORE),
                ]
            )
            .send().await?;
        let Some(body) = json_or_none("STRING", resp).await? else {
            return Ok(Vec::new());
        };
        Ok(parse_network(&body, gene_symbol, accession))
    }

    pub async fn probe(&self) -> Result<u16> {
        let resp = self.http.get(format!("{}/json/version", self.base_url)).send().await?;
        Ok(resp.status().as_u16())
    }
}

/// STRING reports scores either in [0,1] or in [0,1000] depending on endpoint.
fn normalize_score(raw: f64) -> f64 {
    if raw > 1.0 { (raw / 1000.0).min(1.0) } else { raw.max(0.0) }
}

fn parse_network(body: &JsonValue, gene_symbol: &str, accession: &str) -> Vec<Interaction> {
    let Some(edges) = body.as_array() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for edge in edges {
        let name_a = edge["preferredName_A"].as_str().unwrap_or_default();
        let name_b = edge["preferredName_B"].as_str().unwrap_or_default();
        let (partner_name, partner_id) = if name_a.eq_ignore_ascii_case(gene_symbol) {
            (name_b, str_field(edge, "stringId_B"))
        } else if name_b.eq_ignore_ascii_case(gene_symbol) {
            (name_a, str_field(edge, "stringId_A"))
        } else {
            continue;
        };
        let partner_id = partner_id.unwrap_or_else(|| partner_name.to_string());
        if partner_name.is_empty() || partner_name.eq_ignore_ascii_case(gene_symbol) || partner_id == accession {
            continue;
        }
        if !seen.insert(partner_name.to_string()) {
            continue;
        }
        let score = edge["score"]
            .as_f64()
            .or_else(|| edge["score"].as_str().and_then(|s| s.parse().ok()))
            .unwrap_or(0.0);
        out.push(Interaction {
            protein_id: partner_id,
            protein_name: partner_name.to_string(),
            score: normalize_score(score),
            evidence: str_field(edge, "evidence"),
            source: Some("STRING-db".into()),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn keeps_partners_of_query_protein_only() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET)
                .path("/api/json/network")
                .query_param("identifiers", "TP53")
                .query_param("species", "9606")
                .query_param("required_score", "700");
            then.status(200).json_body(
                json!([
                {"stringId_A": "9606.ENSP00000269305", "stringId_B": "9606.ENSP00000258149",
                 "preferredName_A": "TP53", "preferredName_B": "MDM2", "score": 0.999},
                {"stringId_A": "9606.ENSP00000258149", "stringId_B": "9606.ENSP00000269305",
                 "preferredName_A": "MDM2", "preferredName_B": "TP53", "score": 0.999},
                {"stringId_A": "9606.ENSP00000340989", "stringId_B": "9606.ENSP00000269305",
                 "preferredName_A": "SIRT1", "preferredName_B": "TP53", "score": 870},
                {"preferredName_A": "MDM2", "preferredName_B": "MDM4", "score": 0.99},
                {"preferredName_A": "TP53", "preferredName_B": "TP53", "score": 0.9}
            ])
            );
        }).await;

        let client = StringDbClient::new(Client::new(), &server.url("/api"));
        let interactions = client.fetch_interactions("TP53", "P04637").await.unwrap();
        let names: Vec<_> = interactions.iter().map(|i| i.protein_name.as_str()).collect();
        assert_eq!(names, vec!["MDM2", "SIRT1"]);
        assert!((interactions[1].score - 0.87).abs() < 1e-9);
        assert!(interactions.iter().all(|i| i.score <= 1.0));
    }

    #[test]
    fn non_array_body_yields_nothing() {
        assert!(parse_network(&json!({"error": "x"}), "TP53", "P04637").is_empty());
    }
}
