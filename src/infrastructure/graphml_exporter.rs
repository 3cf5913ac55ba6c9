//! GraphML Exporter
//!
//! Renders a summary graph as GraphML with typed node and edge attributes.

use std::fmt::Write;

use anyhow::Result;

use crate::api::dto::{EdgeDto, GraphDto, NodeDto};
use crate::ports::GraphExporter;

const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns"
xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
xsi:schemaLocation="http://graphml.graphdrawing.org/xmlns
http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd">

<key id="type" for="node" attr.name="type" attr.type="string"/>
<key id="members" for="node" attr.name="members" attr.type="string"/>
<key id="count" for="node" attr.name="count" attr.type="int"/>
<key id="size" for="node" attr.name="size" attr.type="long"/>
<key id="types" for="node" attr.name="types" attr.type="string"/>
<key id="allocContext" for="node" attr.name="allocContext" attr.type="string"/>
<key id="collapsed" for="node" attr.name="collapsed" attr.type="boolean">
  <default>false</default>
</key>
<key id="label" for="edge" attr.name="label" attr.type="string"/>
<key id="ownership" for="edge" attr.name="ownership" attr.type="boolean">
  <default>false</default>
</key>
<key id="pointer" for="edge" attr.name="pointer" attr.type="boolean">
  <default>true</default>
</key>

<graph edgedefault="directed">

"#;

const FOOTER: &str = "</graph>\n</graphml>\n";

pub struct GraphMlExporter;

impl GraphMlExporter {
    pub fn to_graphml(graph: &GraphDto) -> String {
        let mut out = String::from(HEADER);
        for node in &graph.nodes {
            Self::write_node(&mut out, node);
        }
        for edge in &graph.edges {
            Self::write_edge(&mut out, edge);
        }
        out.push_str(FOOTER);
        out
    }

    fn write_node(out: &mut String, node: &NodeDto) {
        let _ = writeln!(out, "<node id=\"{}\">", node.id);
        let _ = writeln!(out, "  <data key=\"type\">{}</data>", xml_text(&node.rep_type));
        let _ = writeln!(out, "  <data key=\"count\">{}</data>", node.count);
        let _ = writeln!(out, "  <data key=\"size\">{}</data>", node.size);
        let _ = writeln!(out, "  <data key=\"types\">{}</data>", xml_text(&node.types.join(":")));
        if node.is_collapsed() {
            out.push_str("  <data key=\"collapsed\">true</data>\n");
        }

        // Each field is `name:length:value`, so values may contain any character.
        if let Some(fields) = node.fields.as_ref().filter(|f| !f.is_empty()) {
            out.push_str("  <data key=\"members\">");
            for (name, value) in fields {
                let _ = write!(
                    out,
                    "{}:{}:{}",
                    xml_text(name),
                    value.chars().count(),
                    xml_text(value)
                );
            }
            out.push_str("</data>\n");
        }

        if let Some(ctx) = &node.alloc_context {
            let _ = writeln!(out, "  <data key=\"allocContext\">{}</data>", xml_text(ctx));
        }
        out.push_str("</node>\n");
    }

    fn write_edge(out: &mut String, edge: &EdgeDto) {
        let _ = writeln!(out, "<edge source=\"{}\" target=\"{}\">", edge.source, edge.target);
        if let Some(label) = &edge.label {
            let _ = writeln!(out, "  <data key=\"label\">{}</data>", xml_text(label));
        }
        let _ = writeln!(out, "  <data key=\"ownership\">{}</data>", edge.ownership);
        let _ = writeln!(out, "  <data key=\"pointer\">{}</data>", edge.pointer);
        out.push_str("</edge>\n");
    }
}

impl GraphExporter for GraphMlExporter {
    fn extension(&self) -> &'static str {
        "graphml"
    }

    fn render(&self, graph: &GraphDto) -> Result<String> {
        Ok(Self::to_graphml(graph))
    }
}

/// Characters allowed by the XML 1.0 `Char` production.
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Escape markup and replace characters XML cannot carry with U+FFFD.
pub fn xml_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if is_xml_char(c) => out.push(c),
            _ => out.push(char::REPLACEMENT_CHARACTER),
        }
    }
    out
}
