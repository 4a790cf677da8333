use super::CacheTtl;
use crate::cache::{ self, Cache };
use crate::config::prompt::{ self, PromptConfig };
use crate::error::{ AppError, Result };
use crate::history::{ format_history_for_prompt, HistoryStore };
use crate::llm::ChatClient;
use crate::models::chat::{ Intent, QueryAnalysis };
use crate::models::protein::{ Disease, Drug, Interaction, ProteinRecord, StructureInfo, Variant };
use log::{ error, info, warn };
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{ json, Value as JsonValue };
use sha2::{ Digest, Sha256 };
use std::sync::Arc;

const FALLBACK_REPLY: &str = "I apologize, but I'm having trouble generating a response right now.";

const GENERAL_REPLY: &str =
    "I can provide information about proteins, their structures, interactions, disease associations, and more. Try asking about a specific protein like TP53 or BRCA1.";

/// Gene symbols resolved to UniProt accessions before any lookup.
const SYMBOL_ACCESSIONS: [(&str, &str); 7] = [
    ("P53", "P04637"),
    ("TP53", "P04637"),
    ("BRCA1", "P38398"),
    ("PTEN", "P60484"),
    ("MDM2", "Q00987"),
    ("EGFR", "P00533"),
    ("KRAS", "P01116"),
];

const ENTITY: &str =
    r"(?:the\s+)?(?:(?:function|role)\s+of\s+(?:the\s+)?)?(?:protein\s+|gene\s+)?([a-z0-9][a-z0-9-]*)";

/// Words an intent pattern may land on that never name an entity.
const NON_ENTITIES: [&str; 12] = [
    "function",
    "role",
    "structure",
    "protein",
    "proteins",
    "gene",
    "genes",
    "it",
    "its",
    "this",
    "that",
    "a",
];

fn intent_regex(prefix: &str) -> Regex {
    Regex::new(&format!(r"(?:{})\s+{}", prefix, ENTITY)).expect("valid intent pattern")
}

/// Checked in order; the first match wins.
static INTENT_PATTERNS: Lazy<Vec<(Intent, Regex)>> = Lazy::new(|| {
    vec![
        (
            Intent::StructureInfo,
            intent_regex(r"(?:3d\s+)?structures?\s+(?:of|for)|display\s+structure|fold\s+of"),
        ),
        (
            Intent::Interactions,
            intent_regex(
                r"interactions?\s+(?:of|for|with)|interacts?\s+with|binding\s+partners\s+(?:of|for)|interaction\s+partners\s+(?:of|for)"
            ),
        ),
        (
            Intent::DiseaseInfo,
            intent_regex(
                r"(?:diseases?|disorders?|conditions|pathologies)\s+(?:(?:are|is)\s+)?(?:associated|linked|related|connected)\s+(?:with|to)|(?:diseases?|disorders?)\s+(?:of|for|caused\s+by)"
            ),
        ),
        (
            Intent::DrugInfo,
            intent_regex(
                r"(?:drugs?|medications?|compounds|inhibitors|treatments|therapeutics)\s+(?:(?:that|which)\s+)?(?:(?:target|inhibit|for|against|bind)\w*|(?:can\s+)?treat\w*\s+.*?(?:associated\s+with|for))"
            ),
        ),
        (
            Intent::VariantInfo,
            intent_regex(r"(?:variants?|mutations?|alterations|polymorphisms|snps)\s+(?:of|in|for|on)"),
        ),
        (
            Intent::ProteinInfo,
            intent_regex(r"tell\s+me\s+(?:more\s+)?about|what\s+is|what's|info\s+on|information\s+(?:about|on)|describe"),
        ),
    ]
});

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid fenced json pattern")
});

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9-]+").expect("valid word pattern"));

/// Maps a gene symbol to its accession; anything else is returned upper-cased.
pub fn resolve_entity(entity: &str) -> String {
    let upper = entity.trim().to_uppercase();
    SYMBOL_ACCESSIONS.iter()
        .find(|(symbol, _)| *symbol == upper)
        .map(|(_, acc)| acc.to_string())
        .unwrap_or(upper)
}

/// Regex intent detection used when the LLM is unavailable or answers with garbage.
pub fn classify_with_patterns(query: &str) -> QueryAnalysis {
    let lowered = query.to_lowercase();
    for (intent, pattern) in INTENT_PATTERNS.iter() {
        let entity = pattern
            .captures_iter(&lowered)
            .filter_map(|c| c.get(1))
            .find(|m| !NON_ENTITIES.contains(&m.as_str()));
        if let Some(entity) = entity {
            return QueryAnalysis {
                intent: *intent,
                entities: vec![resolve_entity(entity.as_str())],
            };
        }
    }
    // A bare known symbol ("TP53?") is treated as a request for protein information.
    let known = WORD.find_iter(query).find_map(|w| {
        let upper = w.as_str().to_uppercase();
        SYMBOL_ACCESSIONS.iter().any(|(s, _)| *s == upper).then(|| resolve_entity(&upper))
    });
    match known {
        Some(accession) => QueryAnalysis { intent: Intent::ProteinInfo, entities: vec![accession] },
        None => QueryAnalysis { intent: Intent::General, entities: Vec::new() },
    }
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    entities: Vec<JsonValue>,
}

/// Extracts `{"intent", "entities"}` from a model reply, fenced or bare.
pub fn parse_analysis(reply: &str) -> Option<QueryAnalysis> {
    let candidate = match FENCED_JSON.captures(reply).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().to_string(),
        None => {
            let start = reply.find('{')?;
            let end = reply.rfind('}')?;
            if end <= start {
                return None;
            }
            reply[start..=end].to_string()
        }
    };
    let raw: RawAnalysis = serde_json::from_str(&candidate).ok()?;
    let intent = raw.intent.parse().unwrap_or(Intent::General);
    let entities = raw.entities
        .iter()
        .filter_map(|e| e.as_str())
        .filter(|e| !e.trim().is_empty())
        .map(resolve_entity)
        .collect();
    Some(QueryAnalysis { intent, entities })
}

/// Data a reply is generated from.
#[derive(Clone, Copy, Debug)]
pub enum ResponseData<'a> {
    Protein(&'a ProteinRecord),
    Structure(&'a StructureInfo),
    Interactions(&'a [Interaction]),
    Diseases(&'a [Disease]),
    Drugs(&'a [Drug]),
    Variants(&'a [Variant]),
    None,
}

impl ResponseData<'_> {
    pub fn intent(&self) -> Intent {
        match self {
            ResponseData::Protein(_) => Intent::ProteinInfo,
            ResponseData::Structure(_) => Intent::StructureInfo,
            ResponseData::Interactions(_) => Intent::Interactions,
            ResponseData::Diseases(_) => Intent::DiseaseInfo,
            ResponseData::Drugs(_) => Intent::DrugInfo,
            ResponseData::Variants(_) => Intent::VariantInfo,
            ResponseData::None => Intent::General,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        let value = match self {
            ResponseData::Protein(p) => serde_json::to_value(p),
            ResponseData::Structure(s) => serde_json::to_value(s),
            ResponseData::Interactions(i) => serde_json::to_value(i),
            ResponseData::Diseases(d) => serde_json::to_value(d),
            ResponseData::Drugs(d) => serde_json::to_value(d),
            ResponseData::Variants(v) => serde_json::to_value(v),
            ResponseData::None => Ok(json!({})),
        };
        value.unwrap_or_else(|_| json!({}))
    }
}

/// Reply used when no model is configured.
pub fn template_response(data: ResponseData<'_>) -> String {
    match data {
        ResponseData::Protein(p) => protein_template(p),
        ResponseData::Structure(s) => structure_template(s),
        ResponseData::Interactions(list) => interactions_template(list),
        ResponseData::Diseases(list) => diseases_template(list),
        ResponseData::Drugs(list) => drugs_template(list),
        ResponseData::Variants(list) => variants_template(list),
        ResponseData::None => GENERAL_REPLY.to_string(),
    }
}

fn protein_template(p: &ProteinRecord) -> String {
    let mut out = p.name.clone();
    if let Some(full) = p.full_name.as_deref().filter(|f| !f.is_empty()) {
        out.push_str(&format!(" ({})", full));
    }
    match p.function.as_deref().filter(|f| !f.is_empty()) {
        Some(function) => out.push_str(&format!(" is a protein that {}", function.trim_end_matches('.'))),
        None => out.push_str(" is a protein"),
    }
    out.push('.');
    if let Some(description) = p.description.as_deref().filter(|d| !d.is_empty()) {
        out.push(' ');
        out.push_str(description);
    }
    out
}

fn structure_template(s: &StructureInfo) -> String {
    match s {
        StructureInfo::Pdb { pdb_id, method, resolution, .. } => {
            let mut out = format!(
                "The protein has an experimentally determined structure in the Protein Data Bank (PDB ID: {}).",
                pdb_id
            );
            if !method.is_empty() {
                out.push_str(&format!(" The structure was determined using {}", method));
                if let Some(r) = resolution {
                    out.push_str(&format!(" at a resolution of {} Å", r));
                }
                out.push('.');
            }
            out
        }
        StructureInfo::Alphafold { alphafold_id, confidence, .. } => {
            let mut out = format!(
                "The protein structure has been computationally predicted by AlphaFold (ID: {}).",
                alphafold_id
            );
            if let Some(c) = confidence {
                out.push_str(&format!(" The average model confidence (pLDDT) is {:.1}.", c));
            }
            out
        }
        StructureInfo::Unavailable { .. } => "No structural information is currently available for this protein.".to_string(),
    }
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 { one.to_string() } else { many.to_string() }
}

fn interactions_template(list: &[Interaction]) -> String {
    if list.is_empty() {
        return "No protein interactions were found for this protein.".to_string();
    }
    let mut ranked: Vec<&Interaction> = list.iter().collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let top = ranked
        .iter()
        .take(3)
        .map(|i| format!("{} (confidence: {:.2})", i.protein_name, i.score))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "I found {} protein {}. The most significant interactions are with {}.",
        list.len(),
        plural(list.len(), "interaction", "interactions"),
        top
    )
}

fn diseases_template(list: &[Disease]) -> String {
    if list.is_empty() {
        return "No disease associations were found for this protein.".to_string();
    }
    let names = list
        .iter()
        .take(5)
        .map(|d| d.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "This protein is associated with {} {}. These include {}.",
        list.len(),
        plural(list.len(), "disease", "diseases"),
        names
    )
}

fn drugs_template(list: &[Drug]) -> String {
    if list.is_empty() {
        return "No drugs targeting this protein were found.".to_string();
    }
    let names = list
        .iter()
        .take(5)
        .map(|d| match d.mechanism.as_deref().filter(|m| !m.is_empty()) {
            Some(m) => format!("{} ({})", d.name, m),
            None => d.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    if list.len() == 1 {
        format!("There is 1 known drug that targets this protein: {}.", names)
    } else {
        format!("There are {} known drugs that target this protein. These include {}.", list.len(), names)
    }
}

fn variants_template(list: &[Variant]) -> String {
    if list.is_empty() {
        return "No documented variants were found for this protein.".to_string();
    }
    let pathogenic = list
        .iter()
        .filter(|v| {
            v.clinical_significance
                .as_deref()
                .map(|s| s.to_lowercase().contains("pathogenic") && !s.to_lowercase().contains("likely benign"))
                .unwrap_or(false)
        })
        .count();
    let mut out = format!(
        "This protein has {} documented {}.",
        list.len(),
        plural(list.len(), "variant", "variants")
    );
    if pathogenic > 0 {
        out.push_str(&format!(" {} of them are classified as pathogenic or likely pathogenic.", pathogenic));
    }
    out
}

/// Intent analysis and reply generation, backed by Gemini when a key is configured.
pub struct LlmService {
    client: Option<Arc<dyn ChatClient>>,
    prompts: Arc<PromptConfig>,
    cache: Arc<dyn Cache>,
    history: Arc<dyn HistoryStore>,
    history_limit: usize,
    ttl: CacheTtl,
}

impl LlmService {
    pub fn new(
        client: Option<Arc<dyn ChatClient>>,
        prompts: Arc<PromptConfig>,
        cache: Arc<dyn Cache>,
        history: Arc<dyn HistoryStore>,
        history_limit: usize,
        ttl: CacheTtl
    ) -> Self {
        Self { client, prompts, cache, history, history_limit, ttl }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn model(&self) -> Option<String> {
        self.client.as_ref().map(|c| c.get_model())
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub async fn analyze_query(&self, query: &str) -> QueryAnalysis {
        let key = format!("query_analysis:{}", hex::encode(Sha256::digest(query.as_bytes())));
        if let Some(cached) = cache::get_json::<QueryAnalysis>(self.cache.as_ref(), &key).await {
            return cached;
        }

        let analysis = match self.analyze_with_model(query).await {
            Some(analysis) => analysis,
            None => classify_with_patterns(query),
        };
        info!("Query analysis: intent={}, entities={:?}", analysis.intent, analysis.entities);
        cache::set_json(self.cache.as_ref(), &key, &analysis, self.ttl.short).await;
        analysis
    }

    async fn analyze_with_model(&self, query: &str) -> Option<QueryAnalysis> {
        let client = self.client.as_ref()?;
        let prompt = match prompt::get_intent_prompt(&self.prompts, query) {
            Ok(p) => p,
            Err(e) => {
                error!("Could not build intent prompt: {}", e);
                return None;
            }
        };
        match client.complete(&prompt).await {
            Ok(reply) => {
                let parsed = parse_analysis(&reply.response);
                if parsed.is_none() {
                    warn!("Could not parse intent analysis from model reply, using pattern matching");
                }
                parsed
            }
            Err(e) => {
                error!("Error analyzing query with Gemini: {}", e);
                None
            }
        }
    }

    /// Reply for `query` from `data`. The reply is appended to the session history.
    pub async fn generate_response(
        &self,
        query: &str,
        data: ResponseData<'_>,
        session_id: Option<&str>
    ) -> String {
        let reply = match &self.client {
            Some(client) => self.generate_with_model(client.as_ref(), query, data, session_id).await,
            None => template_response(data),
        };
        if let Some(session) = session_id {
            if let Err(e) = self.history.add_message(session, "assistant", &reply).await {
                warn!("Could not store assistant reply for session {}: {}", session, e);
            }
        }
        reply
    }

    async fn generate_with_model(
        &self,
        client: &dyn ChatClient,
        query: &str,
        data: ResponseData<'_>,
        session_id: Option<&str>
    ) -> String {
        let context = match session_id {
            Some(session) =>
                match self.history.get_conversation(session, self.history_limit).await {
                    Ok(conversation) => format_history_for_prompt(&conversation),
                    Err(e) => {
                        warn!("Could not load history for session {}: {}", session, e);
                        String::new()
                    }
                }
            None => String::new(),
        };
        let data_json = data.to_json().to_string();
        let prompt = match prompt::get_response_prompt(&self.prompts, data.intent(), query, &data_json, &context) {
            Ok(p) => p,
            Err(e) => {
                error!("Could not build response prompt: {}", e);
                return template_response(data);
            }
        };
        match client.complete(&prompt).await {
            Ok(reply) if !reply.response.trim().is_empty() => reply.response,
            Ok(_) => FALLBACK_REPLY.to_string(),
            Err(e) => {
                error!("Error generating response with Gemini: {}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }

    pub async fn test_connection(&self) -> Result<String> {
        let client = self.client
            .as_ref()
            .ok_or_else(|| AppError::Config("GEMINI_API_KEY not configured".into()))?;
        let prompt = prompt::get_connection_test_prompt(&self.prompts)?;
        let reply = client.complete(&prompt).await?;
        if reply.response.trim().is_empty() {
            return Err(AppError::Llm("Empty reply to connection test".into()));
        }
        Ok(reply.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::prompt::builtin_prompts;
    use crate::history::{ HistoryLimits, MemoryHistoryStore };
    use crate::llm::CompletionResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{ AtomicUsize, Ordering };

    struct CannedClient {
        reply: String,
        calls: AtomicUsize,
        prompts: std::sync::Mutex<Vec<String>>,
    }

    impl CannedClient {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
                prompts: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatClient for CannedClient {
        async fn complete(&self, prompt: &str) -> Result<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(CompletionResponse { response: self.reply.clone() })
        }

        fn get_model(&self) -> String {
            "canned".into()
        }
    }

    fn service(client: Option<Arc<dyn ChatClient>>) -> LlmService {
        LlmService::new(
            client,
            builtin_prompts().unwrap(),
            Arc::new(MemoryCache::new()),
            Arc::new(MemoryHistoryStore::new(HistoryLimits { max_messages: 50, ttl_secs: 60 })),
            10,
            CacheTtl::default()
        )
    }

    #[test]
    fn patterns_classify_common_questions() {
        let cases = [
            ("Tell me about TP53", Intent::ProteinInfo, "P04637"),
            ("Show me the structure of BRCA1", Intent::StructureInfo, "P38398"),
            ("What diseases are associated with PTEN?", Intent::DiseaseInfo, "P60484"),
            ("What drugs target EGFR?", Intent::DrugInfo, "P00533"),
            ("Which proteins interact with MDM2", Intent::Interactions, "Q00987"),
            ("List mutations in KRAS", Intent::VariantInfo, "P01116"),
        ];
        for (query, intent, entity) in cases {
            let analysis = classify_with_patterns(query);
            assert_eq!(analysis.intent, intent, "{}", query);
            assert_eq!(analysis.entities, vec![entity.to_string()], "{}", query);
        }
    }

    #[test]
    fn unmatched_query_is_general() {
        let analysis = classify_with_patterns("hello there");
        assert_eq!(analysis.intent, Intent::General);
        assert!(analysis.entities.is_empty());
        assert_eq!(classify_with_patterns("TP53?").entities, vec!["P04637".to_string()]);
    }

    #[test]
    fn unknown_symbols_are_upper_cased() {
        assert_eq!(resolve_entity("atm"), "ATM");
        assert_eq!(resolve_entity("p53"), "P04637");
    }

    #[test]
    fn parses_fenced_and_bare_replies() {
        let fenced = "Sure!\n```json\n{\"intent\": \"drug_info\", \"entities\": [\"EGFR\"]}\n```";
        let analysis = parse_analysis(fenced).unwrap();
        assert_eq!(analysis.intent, Intent::DrugInfo);
        assert_eq!(analysis.entities, vec!["P00533".to_string()]);

        let bare = "{\"intent\": \"weather\", \"entities\": []}";
        assert_eq!(parse_analysis(bare).unwrap().intent, Intent::General);
        assert!(parse_analysis("no json here").is_none());
    }

    #[tokio::test]
    async fn analysis_is_cached_per_query() {
        let client = CannedClient::new("{\"intent\": \"protein_info\", \"entities\": [\"TP53\"]}");
        let svc = service(Some(client.clone()));
        let first = svc.analyze_query("Tell me about TP53").await;
        let second = svc.analyze_query("Tell me about TP53").await;
        assert_eq!(first, second);
        assert_eq!(first.entities, vec!["P04637".to_string()]);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn garbage_model_reply_falls_back_to_patterns() {
        let svc = service(Some(CannedClient::new("I cannot help with that")));
        let analysis = svc.analyze_query("What drugs target EGFR?").await;
        assert_eq!(analysis.intent, Intent::DrugInfo);
    }

    #[tokio::test]
    async fn templates_answer_without_a_model() {
        let svc = service(None);
        let interactions = vec![
            Interaction { protein_id: "Q00987".into(), protein_name: "MDM2".into(), score: 0.999, evidence: None, source: None },
            Interaction { protein_id: "Q09472".into(), protein_name: "EP300".into(), score: 0.95, evidence: None, source: None },
        ];
        let reply = svc.generate_response("interactions", ResponseData::Interactions(&interactions), Some("s1")).await;
        assert!(reply.starts_with("I found 2 protein interactions."));
        assert!(reply.contains("MDM2 (confidence: 1.00)"));

        let history = svc.history().get_conversation("s1", 10).await.unwrap();
        assert_eq!(history.messages.len(), 1);
        assert_eq!(history.messages[0].role, "assistant");

        let general = svc.generate_response("hi", ResponseData::None, None).await;
        assert!(general.contains("TP53 or BRCA1"));
    }

    #[tokio::test]
    async fn model_prompt_includes_history_and_data() {
        let client = CannedClient::new("TP53 is a tumor suppressor.");
        let svc = service(Some(client.clone()));
        svc.history().add_message("s1", "user", "Tell me about TP53").await.unwrap();
        let protein = ProteinRecord { id: "P04637".into(), name: "TP53".into(), ..Default::default() };

        let reply = svc.generate_response("Tell me about TP53", ResponseData::Protein(&protein), Some("s1")).await;
        assert_eq!(reply, "TP53 is a tumor suppressor.");
        let prompt = client.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("User: Tell me about TP53"));
        assert!(prompt.contains("\"id\":\"P04637\""));
    }

    #[test]
    fn structure_template_names_the_source() {
        let pdb = StructureInfo::Pdb {
            pdb_id: "1TUP".into(),
            title: String::new(),
            description: String::new(),
            resolution: Some(2.2),
            method: "X-RAY DIFFRACTION".into(),
            polymer_entities: Vec::new(),
            viewer_url: String::new(),
            download_url: String::new(),
        };
        assert!(template_response(ResponseData::Structure(&pdb)).contains("PDB ID: 1TUP"));
        let none = StructureInfo::unavailable("Q99999");
        assert!(template_response(ResponseData::Structure(&none)).starts_with("No structural information"));
    }

    #[tokio::test]
    async fn connection_test_requires_a_key() {
        assert!(service(None).test_connection().await.is_err());
        let svc = service(Some(CannedClient::new("OK")));
        assert_eq!(svc.test_connection().await.unwrap(), "OK");
    }
}
