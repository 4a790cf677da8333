use super::{ GraphDb, Row };
use crate::error::Result;
use crate::models::protein::{ Disease, Drug, Interaction, ProteinRecord, Variant };
use log::warn;
use serde::de::DeserializeOwned;
use serde_json::{ json, Value as JsonValue };

/// Decodes rows into records, skipping (and logging) rows that don't fit.
fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| {
            let cleaned: Row = row
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .collect();
            match serde_json::from_value(JsonValue::Object(cleaned)) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping graph row: {}", e);
                    None
                }
            }
        })
        .collect()
}

impl GraphDb {
    pub async fn get_protein(&self, protein_id: &str) -> Result<Option<ProteinRecord>> {
        let rows = self.execute(
            "MATCH (p:Protein {id: $protein_id}) RETURN p",
            json!({ "protein_id": protein_id })
        ).await?;
        let Some(props) = rows.into_iter().next().and_then(|mut r| r.remove("p")) else {
            return Ok(None);
        };
        let text = |key: &str| props[key].as_str().filter(|s| !s.is_empty()).map(String::from);
        Ok(
            Some(ProteinRecord {
                id: protein_id.to_string(),
                name: text("name").unwrap_or_else(|| protein_id.to_string()),
                full_name: text("full_name"),
                function: text("function"),
                description: text("description"),
                sequence: text("sequence"),
                organism: text("organism"),
                length: props["length"].as_u64().map(|n| n as u32),
                ..Default::default()
            })
        )
    }

    pub async fn get_protein_interactions(&self, protein_id: &str) -> Result<Vec<Interaction>> {
        let rows = self.execute(
            "MATCH (p:Protein {id: $protein_id})-[r:INTERACTS_WITH]-(t:Protein)
             RETURN DISTINCT t.id AS protein_id, coalesce(t.name, t.id) AS protein_name,
                    coalesce(r.score, 0.0) AS score, r.evidence AS evidence, r.source AS source
             ORDER BY score DESC",
            json!({ "protein_id": protein_id })
        ).await?;
        Ok(decode_rows(rows))
    }

    pub async fn get_protein_diseases(&self, protein_id: &str) -> Result<Vec<Disease>> {
        let rows = self.execute(
            "MATCH (p:Protein {id: $protein_id})-[r:ASSOCIATED_WITH]->(d:Disease)
             RETURN d.id AS disease_id, coalesce(d.name, d.id) AS name,
                    d.description AS description, r.evidence AS evidence,
                    r.score AS score, r.source AS source",
            json!({ "protein_id": protein_id })
        ).await?;
        Ok(decode_rows(rows))
    }

    pub async fn get_protein_drugs(&self, protein_id: &str) -> Result<Vec<Drug>> {
        let rows = self.execute(
            "MATCH (d:Drug)-[r:TARGETS]->(p:Protein {id: $protein_id})
             RETURN d.id AS drug_id, coalesce(d.name, d.id) AS name,
                    d.description AS description, r.mechanism AS mechanism, r.source AS source",
            json!({ "protein_id": protein_id })
        ).await?;
        Ok(decode_rows(rows))
    }

    pub async fn get_protein_variants(&self, protein_id: &str) -> Result<Vec<Variant>> {
        let rows = self.execute(
            "MATCH (v:Variant)-[:VARIANT_OF]->(p:Protein {id: $protein_id})
             RETURN v.id AS id, v.name AS name, v.position AS position, v.original AS original,
                    v.variant AS variant, v.effect AS effect,
                    v.clinical_significance AS clinical_significance, v.source AS source",
            json!({ "protein_id": protein_id })
        ).await?;
        Ok(decode_rows(rows))
    }

    pub async fn create_protein(&self, protein: &ProteinRecord) -> Result<()> {
        self.execute(
            "MERGE (p:Protein {id: $id})
             SET p.name = $name, p.full_name = $full_name, p.function = $function,
                 p.description = $description, p.sequence = $sequence,
                 p.organism = $organism, p.length = $length",
            json!({
                "id": protein.id,
                "name": protein.name,
                "full_name": protein.full_name.clone().unwrap_or_default(),
                "function": protein.function.clone().unwrap_or_default(),
                "description": protein.description.clone().unwrap_or_default(),
                "sequence": protein.sequence.clone().unwrap_or_default(),
                "organism": protein.organism,
                "length": protein.length,
            })
        ).await?;
        Ok(())
    }

    /// Upserts an interaction; an unknown partner is created as a bare Protein node.
    pub async fn create_protein_interaction(&self, protein_id: &str, partner: &Interaction) -> Result<()> {
        self.execute(
            "MATCH (source:Protein {id: $source_id})
             MERGE (target:Protein {id: $target_id})
             ON CREATE SET target.name = $target_name
             MERGE (source)-[r:INTERACTS_WITH]->(target)
             SET r.score = $score, r.evidence = $evidence, r.source = $source",
            json!({
                "source_id": protein_id,
                "target_id": partner.protein_id,
                "target_name": partner.protein_name,
                "score": partner.score,
                "evidence": partner.evidence,
                "source": partner.source,
            })
        ).await?;
        Ok(())
    }

    pub async fn create_disease_association(&self, protein_id: &str, disease: &Disease) -> Result<()> {
        self.execute(
            "MATCH (p:Protein {id: $protein_id})
             MERGE (d:Disease {id: $disease_id})
             ON CREATE SET d.name = $name, d.description = $description
             MERGE (p)-[r:ASSOCIATED_WITH]->(d)
             SET r.evidence = $evidence, r.score = $score, r.source = $source",
            json!({
                "protein_id": protein_id,
                "disease_id": disease.disease_id,
                "name": disease.name,
                "description": disease.description,
                "evidence": disease.evidence,
                "score": disease.score,
                "source": disease.source,
            })
        ).await?;
        Ok(())
    }

    pub async fn create_drug_target(
        &self,
        drug: &Drug,
        protein_id: &str,
        affinity: Option<f64>
    ) -> Result<()> {
        self.execute(
            "MERGE (d:Drug {id: $drug_id})
             ON CREATE SET d.name = $name, d.description = $description
             WITH d
             MATCH (p:Protein {id: $protein_id})
             MERGE (d)-[r:TARGETS]->(p)
             SET r.mechanism = $mechanism, r.affinity = $affinity, r.source = $source",
            json!({
                "drug_id": drug.drug_id,
                "name": drug.name,
                "description": drug.description,
                "protein_id": protein_id,
                "mechanism": drug.mechanism,
                "affinity": affinity,
                "source": drug.source,
            })
        ).await?;
        Ok(())
    }

    pub async fn store_variants(&self, protein_id: &str, variants: &[Variant]) -> Result<()> {
        let rows: Vec<JsonValue> = variants
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<_, _>>()?;
        self.execute(
            "MATCH (p:Protein {id: $protein_id})
             UNWIND $variants AS row
             MERGE (v:Variant {id: row.id})
             SET v.name = row.name, v.position = row.position, v.original = row.original,
                 v.variant = row.variant, v.effect = row.effect,
                 v.clinical_significance = row.clinical_significance, v.source = row.source
             MERGE (v)-[:VARIANT_OF]->(p)",
            json!({ "protein_id": protein_id, "variants": rows })
        ).await?;
        Ok(())
    }
}
