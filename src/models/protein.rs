use serde::{ Deserialize, Serialize };

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct ProteinRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organism: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<StructureInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interactions: Vec<Interaction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diseases: Vec<Disease>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drugs: Vec<Drug>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Variant>,
}

impl ProteinRecord {
    /// Record returned when no source knows the accession.
    pub fn minimal(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: Some(format!("No information available for protein {}.", id)),
            ..Default::default()
        }
    }

    /// Gene symbol used to query symbol-keyed sources (STRING, ChEMBL, ClinVar).
    pub fn gene_symbol(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PolymerEntity {
    pub entity_id: String,
    pub description: String,
    pub sequence: String,
}

/// A protein's 3D structure, experimental or predicted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum StructureInfo {
    Pdb {
        pdb_id: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        resolution: Option<f64>,
        #[serde(default)]
        method: String,
        #[serde(default)]
        polymer_entities: Vec<PolymerEntity>,
        viewer_url: String,
        download_url: String,
    },
    Alphafold {
        alphafold_id: String,
        #[serde(default)]
        confidence: Option<f64>,
        #[serde(default)]
        length: Option<u32>,
        #[serde(default)]
        model_url: Option<String>,
    },
    Unavailable {
        message: String,
    },
}

impl StructureInfo {
    pub fn unavailable(protein_id: &str) -> Self {
        StructureInfo::Unavailable {
            message: format!("No structure data found for {}", protein_id),
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, StructureInfo::Unavailable { .. })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub protein_id: String,
    pub protein_name: String,
    pub score: f64,
    #[serde(default, alias = "description")]
    pub evidence: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Disease {
    pub disease_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Drug {
    pub drug_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mechanism: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub original: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub effect: Option<String>,
    #[serde(default)]
    pub clinical_significance: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}
