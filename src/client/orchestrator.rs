//! Chat submission and the follow-up fetches that fill the visualization panes.
//!
//! A submission is split into `start_follow_ups` (allocates sequence numbers), `run`
//! (network, no shared state) and `apply` (feeds results to the panes), so a slow batch
//! that finishes after a newer one cannot overwrite it. Every entry point that can leave a
//! pane waiting for a usable viewport ends by driving its layout retries.

use super::api::Backend;
use super::layout::Viewport;
use super::normalize::{ normalize_fields, normalize_graph, normalize_interactions, Normalized };
use super::pane::{ Effect, PaneContent, PaneEvent };
use super::tabs::{ Tab, TabHost };
use super::viewer::{ fallback_link, structure_viewer };
use crate::error::{ AppError, Result };
use crate::models::chat::{ ChatMessage, ChatRequest, ChatResponse, VisualizationType };
use log::{ info, warn };
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

pub const CHAT_ERROR_REPLY: &str = "Sorry, I encountered an error while processing your request. Please try again.";

#[derive(Clone, Copy, Debug)]
pub struct FollowUpPolicy {
    pub timeout: Duration,
    /// Delay before the single knowledge-graph re-attempt.
    pub retry_delay: Duration,
}

impl Default for FollowUpPolicy {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(15), retry_delay: Duration::from_secs(2) }
    }
}

/// Follow-up fetches allocated on the panes but not yet sent.
#[derive(Clone, Debug)]
pub struct PendingFollowUps {
    pub protein_id: String,
    pub fetches: Vec<(Tab, u64)>,
}

#[derive(Debug)]
pub struct FollowUpResult {
    pub tab: Tab,
    pub seq: u64,
    pub outcome: std::result::Result<JsonValue, String>,
}

pub struct Orchestrator {
    backend: Arc<dyn Backend>,
    session_id: String,
    history: Vec<ChatMessage>,
    tabs: TabHost,
    policy: FollowUpPolicy,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn Backend>, viewport: Viewport, policy: FollowUpPolicy) -> Self {
        Self {
            backend,
            session_id: uuid::Uuid::new_v4().to_string(),
            history: Vec::new(),
            tabs: TabHost::new(viewport),
            policy,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn tabs(&self) -> &TabHost {
        &self.tabs
    }

    fn record(&mut self, role: &str, content: &str) {
        self.history.push(ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        });
    }

    /// Sends `text` and fills the panes from the reply. Blank text never reaches the network.
    pub async fn submit(&mut self, text: &str) -> Result<ChatResponse> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("Message must not be empty".into()));
        }
        self.record("user", text);

        let request = ChatRequest {
            message: text.to_string(),
            session_id: Some(self.session_id.clone()),
            user_id: None,
        };
        let reply = match self.backend.chat(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Chat request failed: {}", e);
                let reply = ChatResponse { message: CHAT_ERROR_REPLY.to_string(), ..Default::default() };
                self.record("assistant", &reply.message);
                return Ok(reply);
            }
        };
        self.record("assistant", &reply.message);

        let pending = self.start_follow_ups(&reply);
        let results = pending.run(self.backend.as_ref(), self.policy).await;
        self.apply(&pending, results).await;
        Ok(reply)
    }

    pub async fn switch_to(&mut self, tab: Tab) {
        let effects = self.tabs.switch_to(tab);
        log_effects(tab, &effects);
        self.tabs.drive_layout_retries().await;
    }

    pub async fn resize(&mut self, viewport: Viewport) {
        for (tab, effect) in self.tabs.resize(viewport) {
            log_effects(tab, &[effect]);
        }
        self.tabs.drive_layout_retries().await;
    }

    /// Applies inline visualization data and starts fetches for the remaining panes.
    pub fn start_follow_ups(&mut self, reply: &ChatResponse) -> PendingFollowUps {
        let protein_id = reply.data
            .as_ref()
            .and_then(|d| d["id"].as_str())
            .map(str::to_string)
            .unwrap_or_default();

        let inline = match (&reply.visualization_type, &reply.visualization_data) {
            (Some(kind), Some(data)) => Some((tab_for(kind), data)),
            _ => None,
        };
        if let Some((tab, data)) = inline {
            let fallback = (!protein_id.is_empty()).then(|| fallback_link(tab, &protein_id));
            let seq = self.tabs.begin_fetch(tab, fallback);
            let effects = self.tabs.dispatch(tab, PaneEvent::FetchSucceeded {
                seq,
                content: pane_content(tab, &protein_id, data),
            });
            log_effects(tab, &effects);
            self.tabs.switch_to(tab);
        }

        let mut fetches = Vec::new();
        if !protein_id.is_empty() {
            for tab in Tab::ALL {
                if inline.is_some_and(|(t, _)| t == tab) {
                    continue;
                }
                let seq = self.tabs.begin_fetch(tab, Some(fallback_link(tab, &protein_id)));
                fetches.push((tab, seq));
            }
        }
        PendingFollowUps { protein_id, fetches }
    }

    /// Feeds fetch results to the panes, including inline data applied by `start_follow_ups`,
    /// then waits out any layout retries they asked for.
    pub async fn apply(&mut self, pending: &PendingFollowUps, results: Vec<FollowUpResult>) {
        for result in results {
            let event = match result.outcome {
                Ok(payload) =>
                    PaneEvent::FetchSucceeded {
                        seq: result.seq,
                        content: pane_content(result.tab, &pending.protein_id, &payload),
                    },
                Err(error) => PaneEvent::FetchFailed { seq: result.seq, error },
            };
            let effects = self.tabs.dispatch(result.tab, event);
            log_effects(result.tab, &effects);
        }
        self.tabs.drive_layout_retries().await;
    }
}

impl PendingFollowUps {
    /// Runs every fetch concurrently; each one races its own timeout.
    pub async fn run(&self, backend: &dyn Backend, policy: FollowUpPolicy) -> Vec<FollowUpResult> {
        let id = self.protein_id.as_str();
        let fetch = move |tab: Tab| {
            let seq = self.fetches.iter().find(|(t, _)| *t == tab).map(|(_, s)| *s);
            async move {
                let Some(seq) = seq else {
                    return None;
                };
                let retries = if tab == Tab::KnowledgeGraph { 1 } else { 0 };
                let outcome = fetch_with_timeout(backend, tab, id, policy, retries).await;
                Some(FollowUpResult { tab, seq, outcome })
            }
        };
        let (structure, network, graph) = tokio::join!(
            fetch(Tab::Structure),
            fetch(Tab::Network),
            fetch(Tab::KnowledgeGraph)
        );
        [structure, network, graph].into_iter().flatten().collect()
    }
}

async fn fetch_with_timeout(
    backend: &dyn Backend,
    tab: Tab,
    protein_id: &str,
    policy: FollowUpPolicy,
    retries: u32
) -> std::result::Result<JsonValue, String> {
    let mut attempt = 0;
    loop {
        let error = match tokio::time::timeout(policy.timeout, backend.follow_up(tab, protein_id)).await {
            Ok(Ok(payload)) => {
                return Ok(payload);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("{} request timed out after {}s", tab, policy.timeout.as_secs_f64()),
        };
        if attempt >= retries {
            return Err(error);
        }
        attempt += 1;
        warn!("{} follow-up for {} failed ({}), retrying in {:?}", tab, protein_id, error, policy.retry_delay);
        tokio::time::sleep(policy.retry_delay).await;
    }
}

fn tab_for(kind: &VisualizationType) -> Tab {
    match kind {
        VisualizationType::Structure => Tab::Structure,
        VisualizationType::Interactions => Tab::Network,
        VisualizationType::KnowledgeGraph => Tab::KnowledgeGraph,
    }
}

fn pane_content(tab: Tab, protein_id: &str, payload: &JsonValue) -> Normalized<PaneContent> {
    match tab {
        Tab::Structure => {
            if payload["source"] == "unavailable" {
                let reason = payload["message"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("No structure data found for {}", protein_id));
                return Normalized::no_data(reason);
            }
            let fields = match normalize_fields(payload) {
                Normalized::Data(fields) => fields,
                Normalized::NoData { .. } => Vec::new(),
            };
            Normalized::Data(PaneContent::Structure {
                viewer: structure_viewer(protein_id, Some(payload)),
                fields,
            })
        }
        Tab::Network => normalize_interactions(protein_id, payload).map(PaneContent::Graph),
        Tab::KnowledgeGraph => normalize_graph(payload).map(PaneContent::Graph),
    }
}

fn log_effects(tab: Tab, effects: &[Effect]) {
    for effect in effects {
        match effect {
            Effect::Draw => info!("{} pane ready", tab),
            Effect::ScheduleRetry { delay } => info!("{} pane waiting for layout, retry in {:?}", tab, delay),
        }
    }
}
