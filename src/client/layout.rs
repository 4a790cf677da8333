//! Graph layout engines and the fallback chain that picks the first one that works.

use super::normalize::NetworkGraph;
use serde::{ Deserialize, Serialize };
use std::collections::HashMap;
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum LayoutError {
    #[error("graph has no nodes")]
    EmptyGraph,
    #[error("{engine} cannot lay out this graph: {reason}")]
    Degenerate {
        engine: &'static str,
        reason: String,
    },
    #[error("{engine} produced non-finite positions")]
    NonFinite {
        engine: &'static str,
    },
    #[error("viewport has zero area")]
    ZeroViewport,
    #[error("every layout engine failed: {0}")]
    Exhausted(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub engine: String,
    pub positions: HashMap<String, (f64, f64)>,
}

pub trait LayoutEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn layout(&self, graph: &NetworkGraph, viewport: Viewport) -> Result<HashMap<String, (f64, f64)>, LayoutError>;
}

/// Fruchterman-Reingold spring layout seeded from a circle, so results are deterministic.
pub struct ForceDirected {
    pub iterations: usize,
}

impl Default for ForceDirected {
    fn default() -> Self {
        Self { iterations: 200 }
    }
}

impl LayoutEngine for ForceDirected {
    fn name(&self) -> &'static str {
        "force_directed"
    }

    fn layout(&self, graph: &NetworkGraph, viewport: Viewport) -> Result<HashMap<String, (f64, f64)>, LayoutError> {
        if graph.nodes.is_empty() {
            return Err(LayoutError::EmptyGraph);
        }
        if graph.edges.is_empty() {
            return Err(LayoutError::Degenerate {
                engine: self.name(),
                reason: "no edges to attract nodes".into(),
            });
        }

        let (w, h) = (viewport.width as f64, viewport.height as f64);
        let index: HashMap<&str, usize> = graph.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        let n = graph.nodes.len();
        let k = ((w * h) / n as f64).sqrt();
        let mut pos = circle_positions(n, w, h);
        let mut temperature = w.min(h) / 10.0;
        let cooling = temperature / (self.iterations.max(1) as f64);

        for _ in 0..self.iterations {
            let mut disp = vec![(0.0_f64, 0.0_f64); n];
            for i in 0..n {
                for j in (i + 1)..n {
                    let (dx, dy) = (pos[i].0 - pos[j].0, pos[i].1 - pos[j].1);
                    let dist = (dx * dx + dy * dy).sqrt().max(0.01);
                    let force = (k * k) / dist;
                    let (fx, fy) = ((dx / dist) * force, (dy / dist) * force);
                    disp[i].0 += fx;
                    disp[i].1 += fy;
                    disp[j].0 -= fx;
                    disp[j].1 -= fy;
                }
            }
            for edge in &graph.edges {
                let (Some(&a), Some(&b)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) else {
                    continue;
                };
                let (dx, dy) = (pos[a].0 - pos[b].0, pos[a].1 - pos[b].1);
                let dist = (dx * dx + dy * dy).sqrt().max(0.01);
                let force = (dist * dist) / k;
                let (fx, fy) = ((dx / dist) * force, (dy / dist) * force);
                disp[a].0 -= fx;
                disp[a].1 -= fy;
                disp[b].0 += fx;
                disp[b].1 += fy;
            }
            for (p, d) in pos.iter_mut().zip(&disp) {
                let len = (d.0 * d.0 + d.1 * d.1).sqrt().max(0.01);
                p.0 = (p.0 + (d.0 / len) * len.min(temperature)).clamp(0.0, w);
                p.1 = (p.1 + (d.1 / len) * len.min(temperature)).clamp(0.0, h);
            }
            temperature = (temperature - cooling).max(0.0);
        }

        if pos.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(LayoutError::NonFinite { engine: self.name() });
        }
        Ok(graph.nodes.iter().map(|n| n.id.clone()).zip(pos).collect())
    }
}

/// Nodes evenly spaced on a circle. Handles any non-empty graph.
pub struct Circular;

impl LayoutEngine for Circular {
    fn name(&self) -> &'static str {
        "circular"
    }

    fn layout(&self, graph: &NetworkGraph, viewport: Viewport) -> Result<HashMap<String, (f64, f64)>, LayoutError> {
        if graph.nodes.is_empty() {
            return Err(LayoutError::EmptyGraph);
        }
        let pos = circle_positions(graph.nodes.len(), viewport.width as f64, viewport.height as f64);
        Ok(graph.nodes.iter().map(|n| n.id.clone()).zip(pos).collect())
    }
}

fn circle_positions(n: usize, w: f64, h: f64) -> Vec<(f64, f64)> {
    let (cx, cy) = (w / 2.0, h / 2.0);
    if n == 1 {
        return vec![(cx, cy)];
    }
    let radius = w.min(h) * 0.4;
    (0..n)
        .map(|i| {
            let angle = (2.0 * PI * i as f64) / n as f64;
            (cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}

/// Primary engine first, then the fallback.
pub fn default_engines() -> Vec<Box<dyn LayoutEngine>> {
    vec![Box::new(ForceDirected::default()), Box::new(Circular)]
}

pub fn run_chain(
    engines: &[Box<dyn LayoutEngine>],
    graph: &NetworkGraph,
    viewport: Viewport
) -> Result<Layout, LayoutError> {
    if viewport.is_zero() {
        return Err(LayoutError::ZeroViewport);
    }
    let mut failures = Vec::new();
    for engine in engines {
        match engine.layout(graph, viewport) {
            Ok(positions) if positions.values().all(|(x, y)| x.is_finite() && y.is_finite()) => {
                return Ok(Layout { engine: engine.name().to_string(), positions });
            }
            Ok(_) => failures.push(LayoutError::NonFinite { engine: engine.name() }.to_string()),
            Err(e) => {
                log::debug!("Layout engine {} failed: {}", engine.name(), e);
                failures.push(e.to_string());
            }
        }
    }
    Err(LayoutError::Exhausted(failures.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::normalize::{ NetworkEdge, NetworkNode };
    use serde_json::Map;

    fn graph(ids: &[&str], edges: &[(&str, &str)]) -> NetworkGraph {
        NetworkGraph {
            nodes: ids
                .iter()
                .map(|id| NetworkNode {
                    id: id.to_string(),
                    label: id.to_string(),
                    node_type: "protein".into(),
                    properties: Map::new(),
                })
                .collect(),
            edges: edges
                .iter()
                .map(|(s, t)| NetworkEdge {
                    source: s.to_string(),
                    target: t.to_string(),
                    edge_type: "interacts_with".into(),
                    score: Some(0.9),
                })
                .collect(),
        }
    }

    struct Broken;

    impl LayoutEngine for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn layout(&self, graph: &NetworkGraph, _: Viewport) -> Result<HashMap<String, (f64, f64)>, LayoutError> {
            Ok(graph.nodes.iter().map(|n| (n.id.clone(), (f64::NAN, 0.0))).collect())
        }
    }

    #[test]
    fn force_directed_keeps_nodes_inside_viewport() {
        let g = graph(&["A", "B", "C", "D"], &[("A", "B"), ("A", "C"), ("A", "D")]);
        let layout = run_chain(&default_engines(), &g, Viewport::new(800, 600)).unwrap();
        assert_eq!(layout.engine, "force_directed");
        assert_eq!(layout.positions.len(), 4);
        for (x, y) in layout.positions.values() {
            assert!((0.0..=800.0).contains(x) && (0.0..=600.0).contains(y));
        }
    }

    #[test]
    fn edgeless_graph_falls_back_to_circular() {
        let g = graph(&["A", "B"], &[]);
        let layout = run_chain(&default_engines(), &g, Viewport::new(400, 400)).unwrap();
        assert_eq!(layout.engine, "circular");
    }

    #[test]
    fn non_finite_positions_trigger_fallback() {
        let engines: Vec<Box<dyn LayoutEngine>> = vec![Box::new(Broken), Box::new(Circular)];
        let layout = run_chain(&engines, &graph(&["A"], &[]), Viewport::new(100, 100)).unwrap();
        assert_eq!(layout.engine, "circular");
        assert_eq!(layout.positions["A"], (50.0, 50.0));
    }

    #[test]
    fn every_engine_failing_is_an_error() {
        let err = run_chain(&default_engines(), &graph(&[], &[]), Viewport::new(100, 100)).unwrap_err();
        assert!(matches!(err, LayoutError::Exhausted(_)));
        let err = run_chain(&default_engines(), &graph(&["A"], &[]), Viewport::new(0, 100)).unwrap_err();
        assert_eq!(err, LayoutError::ZeroViewport);
    }
}
