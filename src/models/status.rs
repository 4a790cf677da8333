use serde::{ Deserialize, Serialize };
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Ok,
    Error,
    Partial,
    Checking,
    /// Any state this build does not know about.
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiProbe {
    pub status: ServiceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate payload of `GET /status/`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServiceStatus {
    pub server: ServiceState,
    pub neo4j: ServiceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neo4j_error: Option<String>,
    pub redis: ServiceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_error: Option<String>,
    pub llm: ServiceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_error: Option<String>,
    pub api_integrations: ServiceState,
    #[serde(default)]
    pub api_details: BTreeMap<String, ApiProbe>,
}

impl ServiceStatus {
    pub fn checking() -> Self {
        Self {
            server: ServiceState::Ok,
            neo4j: ServiceState::Checking,
            neo4j_error: None,
            redis: ServiceState::Checking,
            redis_error: None,
            llm: ServiceState::Checking,
            llm_error: None,
            api_integrations: ServiceState::Checking,
            api_details: BTreeMap::new(),
        }
    }

    pub fn all_ok(&self) -> bool {
        [self.neo4j, self.redis, self.llm, self.api_integrations]
            .iter()
            .all(|s| *s == ServiceState::Ok)
    }
}

/// Payload of `GET /status/apis`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiIntegrations {
    pub status: ServiceState,
    pub services: BTreeMap<String, ApiProbe>,
}

/// Payload of the single-dependency status endpoints.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SingleCheck {
    pub status: ServiceState,
    pub message: String,
}
