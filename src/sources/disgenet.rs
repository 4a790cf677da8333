use super::{ json_or_none, str_field, trim_base };
use crate::error::Result;
use crate::models::protein::Disease;
use log::{ debug, info };
use reqwest::Client;

#[derive(Clone)]
pub struct DisGeNetClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl DisGeNetClient {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: trim_base(base_url),
            api_key: api_key.trim().to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Gene-disease associations. Returns nothing when no API key is configured.
    pub async fn fetch_diseases(&self, gene_symbol: &str) -> Result<Vec<Disease>> {
        if !self.is_configured() {
            debug!("DisGeNET API key not configured, skipping lookup for {}", gene_symbol);
            return Ok(Vec::new());
        }
        info!("Querying DisGeNET for disease associations with gene {}", gene_symbol);
        let resp = self.http
            .get(format!("{}/gda/gene", self.base_url))
            .query(&[("gene_symbol", gene_symbol)])
            .bearer_auth(&self.api_key)
            .send().await?;
        let Some(body) = json_or_none("DisGeNET", resp).await? else {
            return Ok(Vec::new());
        };
        let results = body["results"].as_array().or_else(|| body.as_array());
        Ok(
            results
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| {
                            Some(Disease {
                                disease_id: str_field(row, "diseaseId")?,
                                name: str_field(row, "diseaseName")?,
                                description: None,
                                evidence: row["nofPmids"].as_u64().map(|n| format!("{} PMIDs", n)),
                                score: row["score"].as_f64(),
                                source: Some("DisGeNET".into()),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        )
    }
}
