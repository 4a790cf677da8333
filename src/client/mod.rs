//! Typed client for the chat backend: response normalization, per-pane state, layout,
//! follow-up orchestration and the service-status panel.

pub mod api;
pub mod layout;
pub mod normalize;
pub mod orchestrator;
pub mod pane;
pub mod status_panel;
pub mod tabs;
pub mod viewer;
