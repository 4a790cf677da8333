use super::{ json_or_none, str_field, trim_base };
use crate::error::Result;
use crate::models::protein::StructureInfo;
use log::info;
use reqwest::Client;

#[derive(Clone)]
pub struct AlphaFoldClient {
    http: Client,
    base_url: String,
}

impl AlphaFoldClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self { http, base_url: trim_base(base_url) }
    }

    /// Predicted-model metadata. Isoform suffixes (`P04637-2`) are stripped.
    pub async fn fetch_prediction(&self, accession: &str) -> Result<Option<StructureInfo>> {
        let accession = accession.split('-').next().unwrap_or(accession);
        info!("Querying AlphaFold DB for {} structure", accession);
        let resp = self.http.get(format!("{}/prediction/{}", self.base_url, accession)).send().await?;
        let Some(body) = json_or_none("AlphaFold", resp).await? else {
            return Ok(None);
        };
        // The API answers with a list of models; older deployments return a single object.
        let model = match body.as_array() {
            Some(models) => match models.first() {
                Some(m) => m.clone(),
                None => return Ok(None),
            },
            None => body,
        };
        let confidence = model["globalMetricValue"]
            .as_f64()
            .or_else(|| model["confidenceAvgLocalScore"].as_f64());
        let length = model["uniprotEnd"]
            .as_u64()
            .or_else(|| model["uniprotLength"].as_u64())
            .map(|n| n as u32);

        Ok(
            Some(StructureInfo::Alphafold {
                alphafold_id: str_field(&model, "uniprotAccession").unwrap_or_else(||
                    accession.to_string()
                ),
                confidence,
                length,
                model_url: str_field(&model, "pdbUrl"),
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn parses_prediction_list() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/api/prediction/Q99999");
            then.status(200).json_body(
                json!([{
                "uniprotAccession": "Q99999",
                "globalMetricValue": 81.5,
                "uniprotEnd": 220,
                "pdbUrl": "https://alphafold.ebi.ac.uk/files/AF-Q99999-F1-model_v4.pdb"
            }])
            );
        }).await;

        let client = AlphaFoldClient::new(Client::new(), &server.url("/api"));
        match client.fetch_prediction("Q99999-2").await.unwrap() {
            Some(StructureInfo::Alphafold { alphafold_id, confidence, length, model_url }) => {
                assert_eq!(alphafold_id, "Q99999");
                assert_eq!(confidence, Some(81.5));
                assert_eq!(length, Some(220));
                assert!(model_url.unwrap().ends_with(".pdb"));
            }
            other => panic!("unexpected structure {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_prediction_is_none() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/api/prediction/NOPE");
            then.status(404);
        }).await;

        let client = AlphaFoldClient::new(Client::new(), &server.url("/api"));
        assert!(client.fetch_prediction("NOPE").await.unwrap().is_none());
    }
}
