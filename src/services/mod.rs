pub mod knowledge_graph;
pub mod llm;
pub mod protein;
pub mod status;

pub use self::knowledge_graph::KnowledgeGraphService;
pub use self::llm::{ LlmService, ResponseData };
pub use self::protein::ProteinService;
pub use self::status::StatusService;

use crate::cli::Args;

/// Expiry applied to each kind of cache entry.
#[derive(Clone, Copy, Debug)]
pub struct CacheTtl {
    /// Protein, structure, interaction, disease, drug and variant lookups.
    pub data: u64,
    /// Negative structure results, query analyses and graph lookups.
    pub short: u64,
}

impl CacheTtl {
    pub fn from_args(args: &Args) -> Self {
        Self {
            data: args.cache_data_ttl,
            short: args.cache_short_ttl,
        }
    }
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self { data: 86_400, short: 3_600 }
    }
}
