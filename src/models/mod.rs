pub mod chat;
pub mod graph;
pub mod protein;
pub mod status;
