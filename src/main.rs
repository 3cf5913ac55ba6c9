// Command-line entry point for heapsketch.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use heapsketch::api::dto::EdgeSelection;
use heapsketch::application::{PipelineOptions, SnapshotPipeline};
use heapsketch::domain::heap_builder::HeapGraphBuilder;
use heapsketch::infrastructure::logging::init_logging;
use heapsketch::infrastructure::record_stream;
use heapsketch::infrastructure::settings::Settings;
use heapsketch::infrastructure::OutputFormat;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Decoded heap snapshot stream (one JSON record per line)
    input: PathBuf,

    /// Summarization strategy (Identity, AllocSite, TypeGraph, SoftVis2010)
    #[arg(short, long)]
    summarizer: Option<String>,

    /// Export the concrete object graph without summarizing
    #[arg(long)]
    no_summary: bool,

    /// Root blacklist file
    #[arg(long)]
    blacklist: Option<PathBuf>,

    /// Directory for heap_<n>.<ext> output files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Which edges to write
    #[arg(long, value_enum)]
    print_edges: Option<EdgeSelection>,

    /// Mark dominator-tree edges as ownership edges
    #[arg(long)]
    ownership_edges: bool,

    /// Seed for summary vertex ids
    #[arg(long)]
    seed: Option<u64>,

    /// TOML settings file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if self.summarizer.is_some() {
            settings.summarizer = self.summarizer.clone();
        }
        if self.blacklist.is_some() {
            settings.blacklist = self.blacklist.clone();
        }
        if self.output_dir.is_some() {
            settings.output_dir = self.output_dir.clone();
        }
        settings.format = self.format.or(settings.format);
        settings.print_edges = self.print_edges.or(settings.print_edges);
        settings.seed = self.seed.or(settings.seed);
        settings.no_summary |= self.no_summary;
        settings.ownership_edges |= self.ownership_edges;
        Ok(settings)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let settings = cli.settings()?;
    let strategy = settings.strategy()?;
    let blacklist = settings.load_blacklist()?;
    let exporter = settings.format.unwrap_or_default().exporter();

    let output_dir = settings.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    info!(
        "summarizer: {}, {} blacklist entries, input {}",
        if settings.no_summary { "none" } else { strategy.name() },
        blacklist.len(),
        cli.input.display()
    );

    let builder = HeapGraphBuilder::new(blacklist).with_seed(settings.seed);
    let options = PipelineOptions {
        summarize: !settings.no_summary,
        ownership_edges: settings.ownership_edges,
        edge_selection: settings.print_edges.unwrap_or_default(),
        output_dir,
    };
    let mut pipeline = SnapshotPipeline::new(builder, &strategy, exporter.as_ref(), options);

    let records = record_stream::replay_file(&cli.input, &mut pipeline)?;
    if pipeline.has_pending() {
        warn!("stream ended without an end-of-snapshot marker; last snapshot ignored");
    }

    info!("replayed {} records", records);
    for path in pipeline.outputs() {
        println!("Summary graph written to {}", path.display());
    }
    Ok(())
}
