//! Per-pane state machine. `reduce` is pure: the host applies the returned effects.

use super::layout::{ default_engines, run_chain, Layout, Viewport };
use super::normalize::{ Field, NetworkGraph, Normalized };
use super::viewer::ViewerTarget;
use std::time::Duration;

/// Zero-size retries before a pane gives up on layout.
pub const MAX_LAYOUT_ATTEMPTS: u32 = 5;
pub const LAYOUT_RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, PartialEq)]
pub enum PaneContent {
    Structure {
        viewer: ViewerTarget,
        fields: Vec<Field>,
    },
    Graph(NetworkGraph),
}

#[derive(Clone, Debug, PartialEq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Loaded,
    Rendered,
    AwaitingLayout {
        attempts: u32,
    },
    NoData {
        reason: String,
    },
    Failed {
        error: String,
        fallback_url: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum PaneEvent {
    FetchStarted {
        seq: u64,
        fallback_url: Option<String>,
    },
    FetchSucceeded {
        seq: u64,
        content: Normalized<PaneContent>,
    },
    FetchFailed {
        seq: u64,
        error: String,
    },
    Shown,
    Hidden,
    Resized(Viewport),
    LayoutTick,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    ScheduleRetry {
        delay: Duration,
    },
    Draw,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct PaneState {
    pub phase: Phase,
    pub content: Option<PaneContent>,
    pub visible: bool,
    pub viewport: Viewport,
    pub latest_seq: u64,
    pub layout: Option<Layout>,
    pub fallback_url: Option<String>,
}

impl PaneState {
    pub fn new(visible: bool, viewport: Viewport) -> Self {
        Self { visible, viewport, ..Default::default() }
    }
}

pub fn reduce(mut state: PaneState, event: PaneEvent) -> (PaneState, Vec<Effect>) {
    match event {
        PaneEvent::FetchStarted { seq, fallback_url } => {
            if seq < state.latest_seq {
                return (state, vec![]);
            }
            state.latest_seq = seq;
            state.fallback_url = fallback_url;
            state.phase = Phase::Loading;
            (state, vec![])
        }
        PaneEvent::FetchSucceeded { seq, content } => {
            if seq != state.latest_seq {
                log::debug!("Dropping stale pane response #{} (latest #{})", seq, state.latest_seq);
                return (state, vec![]);
            }
            state.layout = None;
            match content {
                Normalized::Data(content) => {
                    state.content = Some(content);
                    render(state, 0)
                }
                Normalized::NoData { reason } => {
                    state.content = None;
                    state.phase = Phase::NoData { reason };
                    (state, vec![])
                }
            }
        }
        PaneEvent::FetchFailed { seq, error } => {
            if seq != state.latest_seq {
                return (state, vec![]);
            }
            state.phase = Phase::Failed { error, fallback_url: state.fallback_url.clone() };
            (state, vec![])
        }
        PaneEvent::Shown => {
            state.visible = true;
            match state.phase {
                Phase::Loaded | Phase::AwaitingLayout { .. } => render(state, 0),
                // Redraw what was laid out while visible before.
                Phase::Rendered => (state, vec![Effect::Draw]),
                _ => (state, vec![]),
            }
        }
        PaneEvent::Hidden => {
            state.visible = false;
            if let Phase::AwaitingLayout { .. } = state.phase {
                state.phase = Phase::Loaded;
            }
            (state, vec![])
        }
        PaneEvent::Resized(viewport) => {
            state.viewport = viewport;
            match state.phase {
                Phase::Loaded | Phase::Rendered => render(state, 0),
                Phase::AwaitingLayout { attempts } => render(state, attempts),
                _ => (state, vec![]),
            }
        }
        PaneEvent::LayoutTick => {
            match state.phase {
                Phase::AwaitingLayout { attempts } => render(state, attempts),
                _ => (state, vec![]),
            }
        }
    }
}

fn render(mut state: PaneState, attempts: u32) -> (PaneState, Vec<Effect>) {
    if !state.visible {
        state.phase = Phase::Loaded;
        return (state, vec![]);
    }
    if state.viewport.is_zero() {
        if attempts >= MAX_LAYOUT_ATTEMPTS {
            state.phase = Phase::Failed {
                error: format!("Pane still has no size after {} attempts", attempts),
                fallback_url: state.fallback_url.clone(),
            };
            return (state, vec![]);
        }
        state.phase = Phase::AwaitingLayout { attempts: attempts + 1 };
        return (state, vec![Effect::ScheduleRetry { delay: LAYOUT_RETRY_DELAY }]);
    }

    let layout = match &state.content {
        None => {
            state.phase = Phase::Idle;
            return (state, vec![]);
        }
        Some(PaneContent::Structure { .. }) => None,
        Some(PaneContent::Graph(graph)) =>
            match run_chain(&default_engines(), graph, state.viewport) {
                Ok(layout) => Some(layout),
                Err(e) => {
                    state.phase = Phase::Failed {
                        error: e.to_string(),
                        fallback_url: state.fallback_url.clone(),
                    };
                    return (state, vec![]);
                }
            }
    };
    state.layout = layout;
    state.phase = Phase::Rendered;
    (state, vec![Effect::Draw])
}
