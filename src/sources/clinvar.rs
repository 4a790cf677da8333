use super::{ json_or_none, str_field, trim_base };
use crate::error::Result;
use crate::models::protein::Variant;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::Value as JsonValue;

const MAX_VARIANTS: usize = 50;

static HGVS_PROTEIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"p\.([A-Za-z]{3}|[A-Z])(\d+)([A-Za-z]{3}|[A-Z*=]|Ter)").expect("valid HGVS regex")
});

/// ClinVar through NCBI E-utilities (esearch then esummary).
#[derive(Clone)]
pub struct ClinVarClient {
    http: Client,
    base_url: String,
}

impl ClinVarClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self { http, base_url: trim_base(base_url) }
    }

    pub async fn fetch_variants(&self, gene_symbol: &str) -> Result<Vec<Variant>> {
        info!("Querying ClinVar for variants of gene {}", gene_symbol);
        let term = format!("{}[gene]", gene_symbol);
        let resp = self.http
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&[("db", "clinvar"), ("term", term.as_str()), ("retmode", "json"), ("retmax", "100")])
            .send().await?;
        let Some(search) = json_or_none("ClinVar", resp).await? else {
            return Ok(Vec::new());
        };
        let ids: Vec<String> = search["esearchresult"]["idlist"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(String::from))
                    .take(MAX_VARIANTS)
                    .collect()
            })
            .unwrap_or_default();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let joined = ids.join(",");
        let resp = self.http
            .get(format!("{}/esummary.fcgi", self.base_url))
            .query(&[("db", "clinvar"), ("id", joined.as_str()), ("retmode", "json")])
            .send().await?;
        let Some(summary) = json_or_none("ClinVar", resp).await? else {
            return Ok(Vec::new());
        };
        Ok(
            ids
                .iter()
                .filter_map(|id| {
                    let doc = &summary["result"][id.as_str()];
                    if doc.is_null() { None } else { Some(parse_summary(id, doc)) }
                })
                .collect()
        )
    }
}

fn parse_summary(id: &str, doc: &JsonValue) -> Variant {
    let title = doc["title"].as_str().unwrap_or_default();
    let (original, position, variant) = match parse_protein_change(title) {
        Some((o, p, v)) => (Some(o), Some(p), Some(v)),
        None => (None, None, None),
    };
    let significance = doc["clinical_significance"]["description"]
        .as_str()
        .or_else(|| doc["germline_classification"]["description"].as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);
    Variant {
        id: format!("ClinVar:{}", id),
        name: (!title.is_empty()).then(|| title.to_string()),
        position,
        original,
        variant,
        effect: str_field(doc, "obj_type").or_else(|| str_field(doc, "variation_type")),
        clinical_significance: significance,
        source: Some("ClinVar".into()),
    }
}

/// Parses a protein-level HGVS change such as `p.Arg175His` into (original, position, variant).
pub fn parse_protein_change(hgvs: &str) -> Option<(String, u32, String)> {
    let caps = HGVS_PROTEIN.captures(hgvs)?;
    let position = caps.get(2)?.as_str().parse().ok()?;
    Some((caps.get(1)?.as_str().to_string(), position, caps.get(3)?.as_str().to_string()))
}
