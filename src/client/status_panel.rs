use super::api::Backend;
use crate::models::status::{ ServiceState, ServiceStatus };
use log::warn;
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Green,
    Amber,
    Red,
    Grey,
}

impl From<ServiceState> for Indicator {
    fn from(state: ServiceState) -> Self {
        match state {
            ServiceState::Ok => Indicator::Green,
            ServiceState::Partial => Indicator::Amber,
            ServiceState::Error => Indicator::Red,
            ServiceState::Checking | ServiceState::Unknown => Indicator::Grey,
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Indicator::Green => "● ok",
            Indicator::Amber => "◐ partial",
            Indicator::Red => "✖ error",
            Indicator::Grey => "○ unknown",
        };
        f.write_str(symbol)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusRow {
    pub name: String,
    pub indicator: Indicator,
    pub error: Option<String>,
}

impl StatusRow {
    fn new(name: &str, state: ServiceState, error: Option<&String>) -> Self {
        Self {
            name: name.to_string(),
            indicator: state.into(),
            error: error.cloned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusPanel {
    pub rows: Vec<StatusRow>,
    /// Per-API rows, shown nested under the API integrations row.
    pub api_rows: Vec<StatusRow>,
}

impl StatusPanel {
    /// Each dependency maps on its own; one red row never changes another.
    pub fn from_status(status: &ServiceStatus) -> Self {
        let rows = vec![
            StatusRow::new("server", status.server, None),
            StatusRow::new("neo4j", status.neo4j, status.neo4j_error.as_ref()),
            StatusRow::new("redis", status.redis, status.redis_error.as_ref()),
            StatusRow::new("llm", status.llm, status.llm_error.as_ref()),
            StatusRow::new("api_integrations", status.api_integrations, None)
        ];
        let api_rows = status.api_details
            .iter()
            .map(|(name, probe)| StatusRow::new(name, probe.status, probe.error.as_ref()))
            .collect();
        Self { rows, api_rows }
    }

    /// Backend unreachable: the server row is red, the rest unknown.
    pub fn unreachable(error: &str) -> Self {
        let mut panel = Self::from_status(&ServiceStatus::checking());
        panel.rows[0] = StatusRow {
            name: "server".into(),
            indicator: Indicator::Red,
            error: Some(error.to_string()),
        };
        panel
    }

    pub fn row(&self, name: &str) -> Option<&StatusRow> {
        self.rows
            .iter()
            .chain(self.api_rows.iter())
            .find(|r| r.name == name)
    }

    pub async fn poll(backend: &dyn Backend) -> Self {
        match backend.status().await {
            Ok(status) => Self::from_status(&status),
            Err(e) => {
                warn!("Status poll failed: {}", e);
                Self::unreachable(&e.to_string())
            }
        }
    }
}

impl fmt::Display for StatusPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            write!(f, "{:<18} {}", row.name, row.indicator)?;
            if let Some(error) = &row.error {
                write!(f, "  ({})", error)?;
            }
            writeln!(f)?;
        }
        for row in &self.api_rows {
            write!(f, "  {:<16} {}", row.name, row.indicator)?;
            if let Some(error) = &row.error {
                write!(f, "  ({})", error)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::status::ApiProbe;

    #[test]
    fn one_errored_dependency_is_red_and_others_keep_their_state() {
        let mut status = ServiceStatus::checking();
        status.neo4j = ServiceState::Error;
        status.neo4j_error = Some("connection refused".into());
        status.redis = ServiceState::Ok;
        status.llm = ServiceState::Ok;
        status.api_integrations = ServiceState::Partial;
        status.api_details.insert("uniprot".into(), ApiProbe {
            status: ServiceState::Ok,
            status_code: Some(200),
            error: None,
        });
        status.api_details.insert("pdb".into(), ApiProbe {
            status: ServiceState::Error,
            status_code: Some(503),
            error: Some("Service Unavailable".into()),
        });

        let panel = StatusPanel::from_status(&status);
        let neo4j = panel.row("neo4j").unwrap();
        assert_eq!(neo4j.indicator, Indicator::Red);
        assert_eq!(neo4j.error.as_deref(), Some("connection refused"));
        assert_eq!(panel.row("server").unwrap().indicator, Indicator::Green);
        assert_eq!(panel.row("redis").unwrap().indicator, Indicator::Green);
        assert_eq!(panel.row("api_integrations").unwrap().indicator, Indicator::Amber);
        assert_eq!(panel.row("pdb").unwrap().indicator, Indicator::Red);
        assert_eq!(panel.row("uniprot").unwrap().indicator, Indicator::Green);
    }

    #[test]
    fn unreachable_backend_marks_only_server_red() {
        let panel = StatusPanel::unreachable("connection refused");
        assert_eq!(panel.row("server").unwrap().indicator, Indicator::Red);
        for name in ["neo4j", "redis", "llm", "api_integrations"] {
            assert_eq!(panel.row(name).unwrap().indicator, Indicator::Grey);
        }
        assert!(panel.to_string().contains("connection refused"));
    }

    #[test]
    fn unrecognised_state_is_grey() {
        let status: ServiceStatus = serde_json::from_str(
            r#"{"server":"ok","neo4j":"degraded","redis":"ok","llm":"error","api_integrations":"ok"}"#
        ).unwrap();
        let panel = StatusPanel::from_status(&status);
        assert_eq!(panel.row("neo4j").unwrap().indicator, Indicator::Grey);
        assert_eq!(panel.row("llm").unwrap().indicator, Indicator::Red);
        assert!(panel.api_rows.is_empty());
    }
}
