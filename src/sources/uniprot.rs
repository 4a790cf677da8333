use super::{ json_or_none, trim_base };
use crate::error::Result;
use crate::models::protein::ProteinRecord;
use log::info;
use reqwest::Client;
use serde_json::Value as JsonValue;

#[derive(Clone)]
pub struct UniProtClient {
    http: Client,
    base_url: String,
}

impl UniProtClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self { http, base_url: trim_base(base_url) }
    }

    pub async fn fetch_protein(&self, accession: &str) -> Result<Option<ProteinRecord>> {
        info!("Fetching data from UniProt API for {}", accession);
        let resp = self.http
            .get(format!("{}/{}", self.base_url, accession))
            .query(&[("format", "json")])
            .send().await?;
        let Some(json) = json_or_none("UniProt", resp).await? else {
            return Ok(None);
        };
        Ok(Some(parse_entry(accession, &json)))
    }

    /// Status-code probe against a well-known entry.
    pub async fn probe(&self) -> Result<u16> {
        let resp = self.http
            .get(format!("{}/P04637", self.base_url))
            .query(&[("format", "json"), ("fields", "accession")])
            .send().await?;
        Ok(resp.status().as_u16())
    }
}

fn parse_entry(accession: &str, json: &JsonValue) -> ProteinRecord {
    let name = json["genes"][0]["geneName"]["value"]
        .as_str()
        .unwrap_or(accession)
        .to_string();
    let full_name = json["proteinDescription"]["recommendedName"]["fullName"]["value"]
        .as_str()
        .map(String::from);
    let function = json["comments"]
        .as_array()
        .and_then(|comments| {
            comments
                .iter()
                .find(|c| c["commentType"].as_str() == Some("FUNCTION"))
                .and_then(|c| c["texts"][0]["value"].as_str())
        })
        .map(String::from);

    ProteinRecord {
        id: accession.to_string(),
        name,
        description: full_name.clone(),
        full_name,
        function,
        sequence: json["sequence"]["value"].as_str().map(String::from),
        organism: json["organism"]["scientificName"].as_str().map(String::from),
        length: json["sequence"]["length"].as_u64().map(|n| n as u32),
        ..Default::default()
    }
}
