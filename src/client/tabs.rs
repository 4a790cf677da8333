use super::layout::Viewport;
use super::pane::{ reduce, Effect, PaneEvent, PaneState, Phase, LAYOUT_RETRY_DELAY };
use log::{ debug, warn };
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    Structure,
    Network,
    KnowledgeGraph,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::Structure, Tab::Network, Tab::KnowledgeGraph];

    fn index(self) -> usize {
        match self {
            Tab::Structure => 0,
            Tab::Network => 1,
            Tab::KnowledgeGraph => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Structure => "structure",
            Tab::Network => "network",
            Tab::KnowledgeGraph => "knowledge_graph",
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "structure" | "3d" => Ok(Tab::Structure),
            "network" | "interactions" => Ok(Tab::Network),
            "knowledge_graph" | "kg" | "graph" => Ok(Tab::KnowledgeGraph),
            other => Err(format!("Unknown tab: '{}'", other)),
        }
    }
}

/// One pane per tab; only the active pane is visible.
#[derive(Clone, Debug)]
pub struct TabHost {
    active: Tab,
    panes: [PaneState; 3],
    seqs: [u64; 3],
}

impl TabHost {
    pub fn new(viewport: Viewport) -> Self {
        let panes = Tab::ALL.map(|tab| PaneState::new(tab == Tab::Structure, viewport));
        Self { active: Tab::Structure, panes, seqs: [0; 3] }
    }

    pub fn active(&self) -> Tab {
        self.active
    }

    pub fn pane(&self, tab: Tab) -> &PaneState {
        &self.panes[tab.index()]
    }

    pub fn dispatch(&mut self, tab: Tab, event: PaneEvent) -> Vec<Effect> {
        let slot = &mut self.panes[tab.index()];
        let (next, effects) = reduce(std::mem::take(slot), event);
        *slot = next;
        effects
    }

    pub fn switch_to(&mut self, tab: Tab) -> Vec<Effect> {
        if tab == self.active {
            return vec![];
        }
        let previous = self.active;
        self.active = tab;
        self.dispatch(previous, PaneEvent::Hidden);
        self.dispatch(tab, PaneEvent::Shown)
    }

    /// Resize applies to every pane so hidden ones have the right size once shown.
    pub fn resize(&mut self, viewport: Viewport) -> Vec<(Tab, Effect)> {
        let mut effects = Vec::new();
        for tab in Tab::ALL {
            effects.extend(
                self.dispatch(tab, PaneEvent::Resized(viewport))
                    .into_iter()
                    .map(|e| (tab, e))
            );
        }
        effects
    }

    /// Host side of `Effect::ScheduleRetry`: sleeps out each requested delay and ticks the
    /// waiting panes until they render or give up. The reducer bounds the attempts.
    pub async fn drive_layout_retries(&mut self) {
        let mut due: Vec<(Tab, Duration)> = Tab::ALL
            .into_iter()
            .filter(|tab| matches!(self.pane(*tab).phase, Phase::AwaitingLayout { .. }))
            .map(|tab| (tab, LAYOUT_RETRY_DELAY))
            .collect();
        while let Some(delay) = due.iter().map(|(_, d)| *d).max() {
            tokio::time::sleep(delay).await;
            let mut next = Vec::new();
            for (tab, _) in due {
                debug!("Retrying layout of {} pane", tab);
                for effect in self.dispatch(tab, PaneEvent::LayoutTick) {
                    if let Effect::ScheduleRetry { delay } = effect {
                        next.push((tab, delay));
                    }
                }
                if let Phase::Failed { error, .. } = &self.pane(tab).phase {
                    warn!("{} pane gave up: {}", tab, error);
                }
            }
            due = next;
        }
    }

    /// Starts a new fetch on `tab` and returns its sequence number.
    pub fn begin_fetch(&mut self, tab: Tab, fallback_url: Option<String>) -> u64 {
        let seq = {
            let counter = &mut self.seqs[tab.index()];
            *counter += 1;
            *counter
        };
        self.dispatch(tab, PaneEvent::FetchStarted { seq, fallback_url });
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::normalize::{ Field, Normalized };
    use crate::client::pane::{ PaneContent, Phase };
    use crate::client::viewer::structure_viewer;

    fn structure_content() -> Normalized<PaneContent> {
        Normalized::Data(PaneContent::Structure {
            viewer: structure_viewer("P04637", None),
            fields: vec![Field { name: "id".into(), value: "P04637".into() }],
        })
    }

    #[test]
    fn switching_tabs_keeps_other_pane_data() {
        let mut host = TabHost::new(Viewport::new(800, 600));
        let seq = host.begin_fetch(Tab::Structure, None);
        host.dispatch(Tab::Structure, PaneEvent::FetchSucceeded { seq, content: structure_content() });
        assert_eq!(host.pane(Tab::Structure).phase, Phase::Rendered);

        host.switch_to(Tab::Network);
        host.switch_to(Tab::KnowledgeGraph);
        let effects = host.switch_to(Tab::Structure);

        assert_eq!(effects, vec![Effect::Draw]);
        assert!(host.pane(Tab::Structure).content.is_some());
        assert!(!host.pane(Tab::KnowledgeGraph).visible);
    }

    #[test]
    fn sequence_numbers_are_per_tab() {
        let mut host = TabHost::new(Viewport::new(800, 600));
        assert_eq!(host.begin_fetch(Tab::Network, None), 1);
        assert_eq!(host.begin_fetch(Tab::Network, None), 2);
        assert_eq!(host.begin_fetch(Tab::KnowledgeGraph, None), 1);
        assert_eq!(host.pane(Tab::Network).phase, Phase::Loading);
    }

    #[tokio::test]
    async fn zero_viewport_pane_fails_after_bounded_retries() {
        let mut host = TabHost::new(Viewport::new(0, 0));
        let seq = host.begin_fetch(Tab::Structure, Some("https://alphafold.ebi.ac.uk/entry/P04637".into()));
        let effects = host.dispatch(Tab::Structure, PaneEvent::FetchSucceeded { seq, content: structure_content() });
        assert_eq!(effects, vec![Effect::ScheduleRetry { delay: LAYOUT_RETRY_DELAY }]);

        host.drive_layout_retries().await;
        match &host.pane(Tab::Structure).phase {
            Phase::Failed { fallback_url, .. } => {
                assert_eq!(fallback_url.as_deref(), Some("https://alphafold.ebi.ac.uk/entry/P04637"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn retry_driver_is_a_no_op_when_nothing_waits() {
        let mut host = TabHost::new(Viewport::new(800, 600));
        let seq = host.begin_fetch(Tab::Structure, None);
        host.dispatch(Tab::Structure, PaneEvent::FetchSucceeded { seq, content: structure_content() });
        let started = std::time::Instant::now();
        host.drive_layout_retries().await;
        assert!(started.elapsed() < LAYOUT_RETRY_DELAY);
        assert_eq!(host.pane(Tab::Structure).phase, Phase::Rendered);
    }

    #[test]
    fn resize_renders_a_waiting_pane() {
        let mut host = TabHost::new(Viewport::new(0, 0));
        let seq = host.begin_fetch(Tab::Structure, None);
        host.dispatch(Tab::Structure, PaneEvent::FetchSucceeded { seq, content: structure_content() });
        let effects = host.resize(Viewport::new(800, 600));
        assert_eq!(effects, vec![(Tab::Structure, Effect::Draw)]);
        assert_eq!(host.pane(Tab::Structure).phase, Phase::Rendered);
    }

    #[test]
    fn parses_tab_names() {
        assert_eq!("knowledge-graph".parse::<Tab>().unwrap(), Tab::KnowledgeGraph);
        assert_eq!("Network".parse::<Tab>().unwrap(), Tab::Network);
        assert!("sequence".parse::<Tab>().is_err());
    }
}
