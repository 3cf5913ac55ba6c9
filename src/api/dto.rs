use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::graph::Edge;
use crate::domain::vertex::{HeapGraph, VertexRef};

/// Which edge facets to include in rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EdgeSelection {
    #[default]
    Pointer,
    Ownership,
    Both,
}

impl EdgeSelection {
    pub fn includes(&self, edge: &Edge<VertexRef, String>) -> bool {
        match self {
            EdgeSelection::Pointer => edge.pointer,
            EdgeSelection::Ownership => edge.ownership,
            EdgeSelection::Both => edge.pointer || edge.ownership,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDto {
    pub nodes: Vec<NodeDto>,
    pub edges: Vec<EdgeDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDto {
    pub id: u64,
    #[serde(rename = "type")]
    pub rep_type: String,
    pub types: Vec<String>,
    pub count: usize,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alloc_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
}

impl NodeDto {
    pub fn is_collapsed(&self) -> bool {
        self.count > 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDto {
    pub source: u64,
    pub target: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub pointer: bool,
    pub ownership: bool,
}

impl GraphDto {
    pub fn from_graph(graph: &HeapGraph, selection: EdgeSelection) -> Self {
        let nodes = graph
            .vertices()
            .map(|v| NodeDto {
                id: v.id(),
                rep_type: v.rep_type().to_string(),
                types: v.types().to_vec(),
                count: v.count(),
                size: v.size(),
                alloc_context: v.alloc_context().map(str::to_string),
                fields: v.fields().cloned(),
            })
            .collect();

        let edges = graph
            .all_edges()
            .map(|(_, e)| e)
            .filter(|e| selection.includes(e))
            .map(|e| EdgeDto {
                source: e.from.id(),
                target: e.to.id(),
                label: e.label.clone(),
                pointer: e.pointer,
                ownership: e.ownership,
            })
            .collect();

        GraphDto { nodes, edges }
    }
}

impl From<&HeapGraph> for GraphDto {
    fn from(graph: &HeapGraph) -> Self {
        GraphDto::from_graph(graph, EdgeSelection::Both)
    }
}
