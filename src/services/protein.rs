use super::CacheTtl;
use crate::cache::{ self, Cache };
use crate::graph::GraphDb;
use crate::models::protein::{ Disease, Drug, Interaction, ProteinRecord, StructureInfo, Variant };
use crate::sources::Sources;
use log::{ error, info, warn };
use serde::{ de::DeserializeOwned, Serialize };
use std::future::Future;
use std::sync::Arc;

/// Where a list lookup was answered from.
#[derive(Debug, PartialEq, Eq)]
enum Origin {
    Cache,
    Graph,
    External,
    Empty,
}

/// Aggregates protein data: cache, then the knowledge graph, then external APIs.
pub struct ProteinService {
    cache: Arc<dyn Cache>,
    graph: GraphDb,
    sources: Sources,
    ttl: CacheTtl,
}

impl ProteinService {
    pub fn new(cache: Arc<dyn Cache>, graph: GraphDb, sources: Sources, ttl: CacheTtl) -> Self {
        Self { cache, graph, sources, ttl }
    }

    pub async fn get_protein_info(&self, protein_id: &str) -> ProteinRecord {
        let key = format!("protein:{}", protein_id);
        if let Some(cached) = cache::get_json::<ProteinRecord>(self.cache.as_ref(), &key).await {
            info!("Retrieved protein data for {} from cache", protein_id);
            return cached;
        }

        match self.graph.get_protein(protein_id).await {
            Ok(Some(mut record)) => {
                let symbol = record.gene_symbol().to_string();
                let (interactions, diseases, structure, drugs, variants) = tokio::join!(
                    self.interactions_for(protein_id, Some(&symbol)),
                    self.diseases_for(protein_id, Some(&symbol)),
                    self.get_structure(protein_id),
                    self.drugs_for(protein_id, Some(&symbol)),
                    self.variants_for(protein_id, Some(&symbol))
                );
                record.interactions = interactions;
                record.diseases = diseases;
                record.structure = structure.is_available().then_some(structure);
                record.drugs = drugs;
                record.variants = variants;
                cache::set_json(self.cache.as_ref(), &key, &record, self.ttl.data).await;
                info!("Retrieved protein data for {} from graph database", protein_id);
                return record;
            }
            Ok(None) => {}
            Err(e) => warn!("Graph lookup for protein {} failed: {}", protein_id, e),
        }

        match self.sources.uniprot.fetch_protein(protein_id).await {
            Ok(Some(record)) => {
                info!("Retrieved protein data for {} from UniProt", protein_id);
                cache::set_json(self.cache.as_ref(), &key, &record, self.ttl.data).await;
                if let Err(e) = self.graph.create_protein(&record).await {
                    error!("Error storing protein {} in graph: {}", protein_id, e);
                }
                return record;
            }
            Ok(None) => {}
            Err(e) => error!("Error fetching UniProt data for {}: {}", protein_id, e),
        }

        warn!("No data found for protein {}", protein_id);
        ProteinRecord::minimal(protein_id)
    }

    /// Experimental structure if one exists, otherwise the predicted model, otherwise `Unavailable`.
    pub async fn get_structure(&self, protein_id: &str) -> StructureInfo {
        let key = format!("structure:{}", protein_id);
        if let Some(cached) = cache::get_json::<StructureInfo>(self.cache.as_ref(), &key).await {
            info!("Retrieved structure data for {} from cache", protein_id);
            return cached;
        }

        match self.sources.pdb.find_structure(protein_id).await {
            Ok(Some(structure)) => {
                cache::set_json(self.cache.as_ref(), &key, &structure, self.ttl.data).await;
                return structure;
            }
            Ok(None) => {}
            Err(e) => warn!("Error querying PDB for {}: {}", protein_id, e),
        }

        match self.sources.alphafold.fetch_prediction(protein_id).await {
            Ok(Some(structure)) => {
                cache::set_json(self.cache.as_ref(), &key, &structure, self.ttl.data).await;
                return structure;
            }
            Ok(None) => info!("No AlphaFold structure found for {}", protein_id),
            Err(e) => warn!("Error querying AlphaFold for {}: {}", protein_id, e),
        }

        let unavailable = StructureInfo::unavailable(protein_id);
        cache::set_json(self.cache.as_ref(), &key, &unavailable, self.ttl.short).await;
        unavailable
    }

    pub async fn get_interactions(&self, protein_id: &str) -> Vec<Interaction> {
        self.interactions_for(protein_id, None).await
    }

    pub async fn get_disease_associations(&self, protein_id: &str) -> Vec<Disease> {
        self.diseases_for(protein_id, None).await
    }

    pub async fn get_drug_interactions(&self, protein_id: &str) -> Vec<Drug> {
        self.drugs_for(protein_id, None).await
    }

    pub async fn get_variants(&self, protein_id: &str) -> Vec<Variant> {
        self.variants_for(protein_id, None).await
    }

    async fn interactions_for(&self, protein_id: &str, symbol: Option<&str>) -> Vec<Interaction> {
        let (list, origin) = self.lookup_list(
            "interactions",
            protein_id,
            self.graph.get_protein_interactions(protein_id),
            || async move {
                let symbol = self.resolve_symbol(protein_id, symbol).await;
                self.sources.string_db.fetch_interactions(&symbol, protein_id).await
            }
        ).await;
        if origin == Origin::External {
            for interaction in &list {
                if let Err(e) = self.graph.create_protein_interaction(protein_id, interaction).await {
                    error!("Error storing interaction in graph: {}", e);
                    break;
                }
            }
        }
        list
    }

    async fn diseases_for(&self, protein_id: &str, symbol: Option<&str>) -> Vec<Disease> {
        let (list, origin) = self.lookup_list(
            "diseases",
            protein_id,
            self.graph.get_protein_diseases(protein_id),
            || async move {
                if !self.sources.disgenet.is_configured() {
                    return Ok(Vec::new());
                }
                let symbol = self.resolve_symbol(protein_id, symbol).await;
                self.sources.disgenet.fetch_diseases(&symbol).await
            }
        ).await;
        if origin == Origin::External {
            for disease in &list {
                if let Err(e) = self.graph.create_disease_association(protein_id, disease).await {
                    error!("Error storing disease association in graph: {}", e);
                    break;
                }
            }
        }
        list
    }

    async fn drugs_for(&self, protein_id: &str, symbol: Option<&str>) -> Vec<Drug> {
        let (list, origin) = self.lookup_list(
            "drugs",
            protein_id,
            self.graph.get_protein_drugs(protein_id),
            || async move {
                let symbol = self.resolve_symbol(protein_id, symbol).await;
                self.sources.chembl.fetch_drugs(&symbol).await
            }
        ).await;
        if origin == Origin::External {
            for drug in &list {
                if let Err(e) = self.graph.create_drug_target(drug, protein_id, None).await {
                    error!("Error storing drug in graph: {}", e);
                    break;
                }
            }
        }
        list
    }

    async fn variants_for(&self, protein_id: &str, symbol: Option<&str>) -> Vec<Variant> {
        let (list, origin) = self.lookup_list(
            "protein_variants",
            protein_id,
            self.graph.get_protein_variants(protein_id),
            || async move {
                let symbol = self.resolve_symbol(protein_id, symbol).await;
                self.sources.clinvar.fetch_variants(&symbol).await
            }
        ).await;
        if origin == Origin::External {
            if let Err(e) = self.graph.store_variants(protein_id, &list).await {
                error!("Error storing variants in graph: {}", e);
            }
        }
        list
    }

    /// Cache, then graph, then the external source. Non-empty results are cached.
    async fn lookup_list<T, G, E, EF>(
        &self,
        prefix: &str,
        protein_id: &str,
        from_graph: G,
        from_external: E
    ) -> (Vec<T>, Origin)
        where
            T: Serialize + DeserializeOwned,
            G: Future<Output = crate::error::Result<Vec<T>>>,
            E: FnOnce() -> EF,
            EF: Future<Output = crate::error::Result<Vec<T>>>
    {
        let key = format!("{}:{}", prefix, protein_id);
        if let Some(cached) = cache::get_json::<Vec<T>>(self.cache.as_ref(), &key).await {
            info!("Retrieved {} for {} from cache", prefix, protein_id);
            return (cached, Origin::Cache);
        }

        match from_graph.await {
            Ok(list) if !list.is_empty() => {
                info!("Retrieved {} for {} from knowledge graph", prefix, protein_id);
                cache::set_json(self.cache.as_ref(), &key, &list, self.ttl.data).await;
                return (list, Origin::Graph);
            }
            Ok(_) => {}
            Err(e) => warn!("Graph lookup of {} for {} failed: {}", prefix, protein_id, e),
        }

        match from_external().await {
            Ok(list) if !list.is_empty() => {
                cache::set_json(self.cache.as_ref(), &key, &list, self.ttl.data).await;
                (list, Origin::External)
            }
            Ok(_) => {
                info!("No {} found for {}", prefix, protein_id);
                (Vec::new(), Origin::Empty)
            }
            Err(e) => {
                error!("Error querying external source for {} of {}: {}", prefix, protein_id, e);
                (Vec::new(), Origin::Empty)
            }
        }
    }

    /// Gene symbol for symbol-keyed sources, without recursing into the full protein lookup.
    async fn resolve_symbol(&self, protein_id: &str, hint: Option<&str>) -> String {
        if let Some(symbol) = hint {
            return symbol.to_string();
        }
        let key = format!("protein:{}", protein_id);
        if let Some(cached) = cache::get_json::<ProteinRecord>(self.cache.as_ref(), &key).await {
            return cached.gene_symbol().to_string();
        }
        if let Ok(Some(record)) = self.graph.get_protein(protein_id).await {
            return record.gene_symbol().to_string();
        }
        match self.sources.uniprot.fetch_protein(protein_id).await {
            Ok(Some(record)) => record.gene_symbol().to_string(),
            _ => protein_id.to_string(),
        }
    }
}
