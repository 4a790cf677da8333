use crate::error::{ AppError, Result };
use crate::models::chat::Intent;
use log::info;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

const BUILTIN_PROMPTS: &str = include_str!("../../json/prompts.json");

#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    pub system_preamble: String,
    pub query_templates: HashMap<String, String>,
    pub response_templates: HashMap<String, String>,
}

impl PromptConfig {
    fn validate(&self) -> Result<()> {
        for key in ["intent_classification", "connection_test"] {
            if !self.query_templates.contains_key(key) {
                return Err(AppError::Config(format!("Prompt template 'query_templates:{}' not found", key)));
            }
        }
        for intent in Intent::ALL {
            if !self.response_templates.contains_key(intent.as_str()) {
                return Err(
                    AppError::Config(
                        format!("Prompt template 'response_templates:{}' not found", intent)
                    )
                );
            }
        }
        Ok(())
    }
}

pub fn builtin_prompts() -> Result<Arc<PromptConfig>> {
    parse_prompts(BUILTIN_PROMPTS, "built-in prompts")
}

/// Loads the prompt file at `path`, or the built-in prompts when no path is given.
pub fn load_prompts(path: Option<&str>) -> Result<Arc<PromptConfig>> {
    match path {
        Some(path) => {
            let content = fs
                ::read_to_string(path)
                .map_err(|e| AppError::Config(format!("Failed to read prompts file '{}': {}", path, e)))?;
            info!("Loaded prompt templates from {}", path);
            parse_prompts(&content, path)
        }
        None => builtin_prompts(),
    }
}

fn parse_prompts(content: &str, origin: &str) -> Result<Arc<PromptConfig>> {
    let config: PromptConfig = serde_json
        ::from_str(content)
        .map_err(|e| AppError::Config(format!("Failed to parse prompts file '{}': {}", origin, e)))?;
    config.validate()?;
    Ok(Arc::new(config))
}

fn get_query_template<'a>(config: &'a PromptConfig, key: &str) -> Result<&'a str> {
    config.query_templates
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| AppError::Config(format!("Prompt template 'query_templates:{}' not found", key)))
}

pub fn get_intent_prompt(config: &PromptConfig, query: &str) -> Result<String> {
    let template = get_query_template(config, "intent_classification")?;
    let intents = Intent::ALL.iter()
        .map(|i| i.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Ok(template.replace("{intents}", &intents).replace("{query}", query))
}

pub fn get_connection_test_prompt(config: &PromptConfig) -> Result<String> {
    get_query_template(config, "connection_test").map(str::to_string)
}

/// Full prompt for answering `query` with `data`, preceded by the system preamble.
pub fn get_response_prompt(
    config: &PromptConfig,
    intent: Intent,
    query: &str,
    data: &str,
    context: &str
) -> Result<String> {
    let template = config.response_templates
        .get(intent.as_str())
        .ok_or_else(|| AppError::Config(format!("Prompt template 'response_templates:{}' not found", intent)))?;
    let body = template.replace("{query}", query).replace("{data}", data).replace("{context}", context);
    Ok(format!("{}\n\n{}", config.system_preamble, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_prompts_cover_every_intent() {
        let config = builtin_prompts().unwrap();
        for intent in Intent::ALL {
            assert!(config.response_templates.contains_key(intent.as_str()));
        }
    }

    #[test]
    fn intent_prompt_lists_intents_and_query() {
        let config = builtin_prompts().unwrap();
        let prompt = get_intent_prompt(&config, "Tell me about TP53").unwrap();
        assert!(prompt.contains("Query: Tell me about TP53"));
        assert!(prompt.contains("structure_info"));
        assert!(prompt.contains("{\"intent\": \"intent_type\""));
    }

    #[test]
    fn response_prompt_fills_placeholders() {
        let config = builtin_prompts().unwrap();
        let prompt = get_response_prompt(
            &config,
            Intent::DrugInfo,
            "What drugs target EGFR?",
            "[{\"name\":\"Gefitinib\"}]",
            "Previous conversation:\nUser: hi\n"
        ).unwrap();
        assert!(prompt.starts_with("You are AminoVerse"));
        assert!(prompt.contains("Gefitinib"));
        assert!(prompt.contains("User: hi"));
        assert!(!prompt.contains("{data}"));
    }

    #[test]
    fn override_file_missing_template_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"system_preamble":"x","query_templates":{{"intent_classification":"q","connection_test":"t"}},"response_templates":{{}}}}"#
        ).unwrap();
        let err = load_prompts(file.path().to_str()).unwrap_err();
        assert!(err.to_string().contains("response_templates:protein_info"));
    }
}
