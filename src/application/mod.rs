// Use cases: turn a snapshot record stream into rendered summary graphs.

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::api::dto::{EdgeSelection, GraphDto};
use crate::domain::heap_builder::{HeapGraphBuilder, Snapshot};
use crate::domain::records::{
    ClassDump, InstanceDump, LoadClass, ObjectArrayDump, PrimitiveArrayDump, StackFrame,
    StackTrace,
};
use crate::ports::{GraphExporter, RecordHandler, Summarizer};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Run the summarizer; otherwise the concrete graph is exported.
    pub summarize: bool,
    /// Mark dominator-tree edges as ownership edges before export.
    pub ownership_edges: bool,
    pub edge_selection: EdgeSelection,
    pub output_dir: PathBuf,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            summarize: true,
            ownership_edges: false,
            edge_selection: EdgeSelection::default(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Builds, summarizes and exports one graph per snapshot in the stream.
pub struct SnapshotPipeline<'a> {
    builder: HeapGraphBuilder,
    summarizer: &'a dyn Summarizer,
    exporter: &'a dyn GraphExporter,
    options: PipelineOptions,
    outputs: Vec<PathBuf>,
}

impl<'a> SnapshotPipeline<'a> {
    pub fn new(
        builder: HeapGraphBuilder,
        summarizer: &'a dyn Summarizer,
        exporter: &'a dyn GraphExporter,
        options: PipelineOptions,
    ) -> Self {
        Self {
            builder,
            summarizer,
            exporter,
            options,
            outputs: Vec::new(),
        }
    }

    /// Files written so far, in snapshot order.
    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    /// Whether records arrived after the last end-of-snapshot marker.
    pub fn has_pending(&self) -> bool {
        self.builder.has_pending()
    }

    fn process_snapshot(&mut self) -> Result<PathBuf> {
        let index = self.outputs.len();
        let Snapshot {
            graph,
            root,
            mut ids,
        } = self.builder.build()?;

        let mut graph = if self.options.summarize {
            self.summarizer.summarize(graph, &mut ids)?
        } else {
            graph
        };

        if self.options.ownership_edges {
            let marked = graph.annotate_ownership(&root)?;
            info!("marked {} ownership edges", marked);
        }

        let dto = GraphDto::from_graph(&graph, self.options.edge_selection);
        let path = self
            .options
            .output_dir
            .join(format!("heap_{}.{}", index, self.exporter.extension()));
        self.exporter.export(&dto, &path)?;

        info!(
            "snapshot {} ({}): {} vertices, {} edges -> {}",
            index,
            if self.options.summarize { self.summarizer.name() } else { "unsummarized" },
            dto.nodes.len(),
            dto.edges.len(),
            path.display()
        );
        self.outputs.push(path.clone());
        Ok(path)
    }
}

impl RecordHandler for SnapshotPipeline<'_> {
    fn string_in_utf8(&mut self, id: u64, text: String) -> Result<()> {
        self.builder.intern_string(id, text);
        Ok(())
    }

    fn load_class(&mut self, record: LoadClass) -> Result<()> {
        self.builder.load_class(record);
        Ok(())
    }

    fn stack_frame(&mut self, record: StackFrame) -> Result<()> {
        self.builder.stack_frame(record);
        Ok(())
    }

    fn stack_trace(&mut self, record: StackTrace) -> Result<()> {
        self.builder.stack_trace(record);
        Ok(())
    }

    fn root_java_frame(&mut self, obj_id: u64, thread_serial: u32, frame_num: u32) -> Result<()> {
        self.builder.add_java_frame_root(obj_id, thread_serial, frame_num);
        Ok(())
    }

    fn root_static(&mut self, obj_id: u64, class_id: u64, field_name_id: u64) -> Result<()> {
        self.builder.add_static_root(obj_id, class_id, field_name_id);
        Ok(())
    }

    fn class_dump(&mut self, record: ClassDump) -> Result<()> {
        self.builder.class_dump(record);
        Ok(())
    }

    fn instance_dump(&mut self, record: InstanceDump) -> Result<()> {
        self.builder.instance_dump(record);
        Ok(())
    }

    fn object_array_dump(&mut self, record: ObjectArrayDump) -> Result<()> {
        self.builder.object_array_dump(record);
        Ok(())
    }

    fn primitive_array_dump(&mut self, record: PrimitiveArrayDump) -> Result<()> {
        self.builder.primitive_array_dump(record);
        Ok(())
    }

    fn end_of_snapshot(&mut self) -> Result<()> {
        self.process_snapshot().map(|_| ())
    }
}
