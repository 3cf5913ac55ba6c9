//! DOT Exporter
//!
//! Renders a summary graph as Graphviz DOT. Summary vertices are drawn
//! filled; ownership-only edges are dashed.

use anyhow::Result;

use crate::api::dto::{EdgeDto, GraphDto, NodeDto};
use crate::ports::GraphExporter;

pub struct DotExporter;

impl DotExporter {
    pub fn to_dot(graph: &GraphDto) -> String {
        let mut lines = Vec::new();

        lines.push("digraph HeapSummary {".to_string());
        lines.push("    rankdir=TB;".to_string());
        lines.push("    node [shape=box, fontname=\"Helvetica\", fontsize=11];".to_string());
        lines.push("    edge [fontname=\"Helvetica\", fontsize=9];".to_string());
        lines.push("".to_string());

        for node in &graph.nodes {
            let style = if node.is_collapsed() {
                ", style=filled, fillcolor=\"#89b4fa\""
            } else {
                ""
            };
            lines.push(format!(
                "    \"{}\" [label=\"{}\"{}];",
                node.id,
                Self::node_label(node),
                style
            ));
        }

        lines.push("".to_string());

        for edge in &graph.edges {
            lines.push(format!(
                "    \"{}\" -> \"{}\"{};",
                edge.source,
                edge.target,
                Self::edge_attrs(edge)
            ));
        }

        lines.push("}".to_string());
        lines.join("\n")
    }

    fn node_label(node: &NodeDto) -> String {
        let mut label = Self::escape_label(&node.rep_type);
        if node.is_collapsed() {
            label.push_str(&format!("\\n{} objects, {} bytes", node.count, node.size));
        } else {
            label.push_str(&format!("\\n{} bytes", node.size));
        }
        label
    }

    fn edge_attrs(edge: &EdgeDto) -> String {
        let mut attrs = Vec::new();
        if let Some(label) = &edge.label {
            attrs.push(format!("label=\"{}\"", Self::escape_label(label)));
        }
        if edge.ownership && !edge.pointer {
            attrs.push("style=dashed".to_string());
        } else if edge.ownership {
            attrs.push("penwidth=2".to_string());
        }

        if attrs.is_empty() {
            String::new()
        } else {
            format!(" [{}]", attrs.join(", "))
        }
    }

    fn escape_label(s: &str) -> String {
        s.replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
    }
}

impl GraphExporter for DotExporter {
    fn extension(&self) -> &'static str {
        "dot"
    }

    fn render(&self, graph: &GraphDto) -> Result<String> {
        Ok(Self::to_dot(graph))
    }
}
