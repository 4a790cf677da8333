//! Clients for the public bioinformatics REST APIs.
//!
//! Every client returns `Ok(None)` / an empty `Vec` when the upstream service has no data
//! for the identifier, and an error only for transport or decoding failures. Callers decide
//! whether to fall through to the next source.

pub mod alphafold;
pub mod chembl;
pub mod clinvar;
pub mod disgenet;
pub mod pdb;
pub mod string_db;
pub mod uniprot;

use crate::cli::Args;
use crate::error::{ AppError, Result };
use reqwest::{ Client, Response };
use serde_json::Value as JsonValue;
use std::time::Duration;

pub use self::alphafold::AlphaFoldClient;
pub use self::chembl::ChemblClient;
pub use self::clinvar::ClinVarClient;
pub use self::disgenet::DisGeNetClient;
pub use self::pdb::PdbClient;
pub use self::string_db::StringDbClient;
pub use self::uniprot::UniProtClient;

pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .user_agent(concat!("aminoverse/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(AppError::from)
}

/// Every external source, sharing one HTTP client.
#[derive(Clone)]
pub struct Sources {
    pub uniprot: UniProtClient,
    pub pdb: PdbClient,
    pub alphafold: AlphaFoldClient,
    pub string_db: StringDbClient,
    pub chembl: ChemblClient,
    pub disgenet: DisGeNetClient,
    pub clinvar: ClinVarClient,
}

impl Sources {
    pub fn from_args(http: Client, args: &Args) -> Self {
        Self {
            uniprot: UniProtClient::new(http.clone(), &args.uniprot_api_url),
            pdb: PdbClient::new(http.clone(), &args.pdb_search_url, &args.pdb_graphql_url),
            alphafold: AlphaFoldClient::new(http.clone(), &args.alphafold_api_url),
            string_db: StringDbClient::new(http.clone(), &args.string_db_api_url),
            chembl: ChemblClient::new(http.clone(), &args.chembl_api_url),
            disgenet: DisGeNetClient::new(
                http.clone(),
                &args.disgenet_api_url,
                &args.disgenet_api_key
            ),
            clinvar: ClinVarClient::new(http, &args.eutils_api_url),
        }
    }
}

/// Reads a JSON body, mapping "no data" statuses to `None` and other failures to `Upstream`.
pub(crate) async fn json_or_none(service: &str, resp: Response) -> Result<Option<JsonValue>> {
    let status = resp.status();
    if status.as_u16() == 404 || status.as_u16() == 204 {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(AppError::Upstream {
            service: service.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(Some(resp.json().await?))
}

pub(crate) fn str_field(value: &JsonValue, key: &str) -> Option<String> {
    value[key].as_str().filter(|s| !s.is_empty()).map(String::from)
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
