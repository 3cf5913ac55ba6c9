use anyhow::{Context, Result};

use crate::api::dto::GraphDto;
use crate::ports::GraphExporter;

/// Pretty-printed [`GraphDto`] JSON.
pub struct JsonExporter;

impl GraphExporter for JsonExporter {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn render(&self, graph: &GraphDto) -> Result<String> {
        serde_json::to_string_pretty(graph).context("Failed to serialize graph")
    }
}
