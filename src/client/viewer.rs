//! Viewer links for the structure pane and fallback sites for failed panes.

use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;

const RCSB_VIEWER: &str = "https://www.rcsb.org/3d-view";
const ALPHAFOLD_ENTRY: &str = "https://alphafold.ebi.ac.uk/entry";
const UNIPROT_SEARCH: &str = "https://www.uniprot.org/uniprotkb";
const STRING_NETWORK: &str = "https://string-db.org/cgi/network";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ViewerSource {
    Pdb(String),
    Alphafold(String),
    Fallback(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerTarget {
    pub source: ViewerSource,
    pub url: String,
}

fn id_field(value: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        value[*k]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    })
}

fn structure_ids(value: &JsonValue) -> (Option<String>, Option<String>) {
    let pdb = id_field(value, &["pdb_id", "pdbId", "pdb"]);
    let alphafold = id_field(value, &["alphafold_id", "alphafoldId", "alphafold"]);
    (pdb, alphafold)
}

/// Viewer for `accession`: experimental entry, then predicted model, then a search page.
///
/// `structure` may be a bare structure record or a protein record with a nested `structure`.
pub fn structure_viewer(accession: &str, structure: Option<&JsonValue>) -> ViewerTarget {
    let (mut pdb, mut alphafold) = (None, None);
    if let Some(value) = structure {
        (pdb, alphafold) = structure_ids(value);
        if pdb.is_none() && alphafold.is_none() {
            (pdb, alphafold) = structure_ids(&value["structure"]);
        }
    }

    if let Some(id) = pdb {
        return ViewerTarget {
            url: format!("{}/{}", RCSB_VIEWER, id.to_uppercase()),
            source: ViewerSource::Pdb(id),
        };
    }
    if let Some(id) = alphafold {
        return ViewerTarget {
            url: format!("{}/{}", ALPHAFOLD_ENTRY, id),
            source: ViewerSource::Alphafold(id),
        };
    }
    ViewerTarget {
        url: format!("{}?query={}", UNIPROT_SEARCH, urlencode(accession)),
        source: ViewerSource::Fallback(accession.to_string()),
    }
}

/// External site shown when a pane cannot render.
pub fn fallback_link(tab: super::tabs::Tab, protein_id: &str) -> String {
    use super::tabs::Tab;
    match tab {
        Tab::Structure => structure_viewer(protein_id, None).url,
        Tab::Network => format!("{}?identifiers={}&species=9606", STRING_NETWORK, urlencode(protein_id)),
        Tab::KnowledgeGraph => format!("{}/{}/entry", UNIPROT_SEARCH, urlencode(protein_id)),
    }
}

fn urlencode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}
