use super::{ json_or_none, str_field, trim_base };
use crate::error::Result;
use crate::models::protein::Drug;
use log::info;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::collections::HashSet;

#[derive(Clone)]
pub struct ChemblClient {
    http: Client,
    base_url: String,
}

impl ChemblClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self { http, base_url: trim_base(base_url) }
    }

    /// Compounds with recorded activity against the first ChEMBL target matching `gene_symbol`.
    pub async fn fetch_drugs(&self, gene_symbol: &str) -> Result<Vec<Drug>> {
        info!("Querying ChEMBL for drug targets of gene {}", gene_symbol);
        let Some(target_id) = self.find_target(gene_symbol).await? else {
            return Ok(Vec::new());
        };
        let resp = self.http
            .get(format!("{}/activity.json", self.base_url))
            .query(&[("target_chembl_id", target_id.as_str()), ("limit", "20")])
            .send().await?;
        let Some(body) = json_or_none("ChEMBL", resp).await? else {
            return Ok(Vec::new());
        };
        Ok(parse_activities(&body))
    }

    pub async fn find_target(&self, gene_symbol: &str) -> Result<Option<String>> {
        let resp = self.http
            .get(format!("{}/target.json", self.base_url))
            .query(
                &[
                    ("target_components__target_component_synonyms__component_synonym__iexact", gene_symbol),
                    ("organism", "Homo sapiens"),
                ]
            )
            .send().await?;
        let Some(body) = json_or_none("ChEMBL", resp).await? else {
            return Ok(None);
        };
        Ok(str_field(&body["targets"][0], "target_chembl_id"))
    }
}

fn parse_activities(body: &JsonValue) -> Vec<Drug> {
    let mut seen = HashSet::new();
    body["activities"]
        .as_array()
        .map(|activities| {
            activities
                .iter()
                .filter_map(|activity| {
                    let drug_id = str_field(activity, "molecule_chembl_id")?;
                    if !seen.insert(drug_id.clone()) {
                        return None;
                    }
                    let value = activity["standard_value"].as_str().unwrap_or("Unknown");
                    let units = activity["standard_units"].as_str().unwrap_or_default();
                    Some(Drug {
                        name: str_field(activity, "molecule_pref_name").unwrap_or_else(|| drug_id.clone()),
                        description: Some(format!("Activity: {} {}", value, units).trim_end().to_string()),
                        mechanism: str_field(activity, "standard_type"),
                        source: Some("ChEMBL".into()),
                        drug_id,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn deduplicates_molecules() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/chembl/target.json");
            then.status(200).json_body(json!({"targets": [{"target_chembl_id": "CHEMBL203"}]}));
        }).await;
        server.mock_async(|when, then| {
            when.method(GET).path("/chembl/activity.json").query_param("target_chembl_id", "CHEMBL203");
            then.status(200).json_body(
                json!({"activities": [
                {"molecule_chembl_id": "CHEMBL939", "molecule_pref_name": "GEFITINIB",
                 "standard_value": "3.0", "standard_units": "nM", "standard_type": "IC50"},
                {"molecule_chembl_id": "CHEMBL939", "molecule_pref_name": "GEFITINIB",
                 "standard_value": "5.0", "standard_units": "nM", "standard_type": "IC50"},
                {"molecule_chembl_id": "CHEMBL553", "standard_value": "1.0", "standard_units": "nM"}
            ]})
            );
        }).await;

        let client = ChemblClient::new(Client::new(), &server.url("/chembl"));
        let drugs = client.fetch_drugs("EGFR").await.unwrap();
        assert_eq!(drugs.len(), 2);
        assert_eq!(drugs[0].name, "GEFITINIB");
        assert_eq!(drugs[0].description.as_deref(), Some("Activity: 3.0 nM"));
        assert_eq!(drugs[1].name, "CHEMBL553");
    }

    #[tokio::test]
    async fn no_target_means_no_drugs() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/chembl/target.json");
            then.status(200).json_body(json!({"targets": []}));
        }).await;

        let client = ChemblClient::new(Client::new(), &server.url("/chembl"));
        assert!(client.fetch_drugs("NOPE").await.unwrap().is_empty());
    }
}
