// Infrastructure implementations for heapsketch: input decoding, renderers,
// settings and logging.

pub mod dot_exporter;
pub mod graphml_exporter;
pub mod json_exporter;
pub mod logging;
pub mod record_stream;
pub mod settings;

use clap::ValueEnum;
use serde::Deserialize;

use crate::ports::GraphExporter;
use dot_exporter::DotExporter;
use graphml_exporter::GraphMlExporter;
use json_exporter::JsonExporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Graphml,
    Dot,
    Json,
}

impl OutputFormat {
    pub fn exporter(&self) -> Box<dyn GraphExporter> {
        match self {
            OutputFormat::Graphml => Box::new(GraphMlExporter),
            OutputFormat::Dot => Box::new(DotExporter),
            OutputFormat::Json => Box::new(JsonExporter),
        }
    }
}
