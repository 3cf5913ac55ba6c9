//! Summarization strategies.
//!
//! Each strategy partitions vertices by some key and merges every partition
//! into one vertex. They differ in the key and in whether they work in place.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::info;

use crate::domain::ids::IdAllocator;
use crate::domain::merge::{merge_vertices, MergeError};
use crate::domain::vertex::{HeapGraph, VertexId, VertexRef};
use crate::ports::Summarizer;

/// Leaves the graph as it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentitySummarizer;

impl Summarizer for IdentitySummarizer {
    fn name(&self) -> &'static str {
        "Identity"
    }

    fn summarize(&self, graph: HeapGraph, _ids: &mut IdAllocator) -> Result<HeapGraph> {
        Ok(graph)
    }
}

/// Merges vertices allocated at the same site. Vertices without an
/// allocation context stay as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocSiteSummarizer;

impl AllocSiteSummarizer {
    pub fn run(&self, graph: &mut HeapGraph, ids: &mut IdAllocator) -> Result<usize, MergeError> {
        let mut sites: BTreeMap<String, Vec<VertexRef>> = BTreeMap::new();
        for v in graph.vertices() {
            if let Some(ctx) = v.alloc_context() {
                sites.entry(ctx.to_string()).or_default().push(v.clone());
            }
        }

        let mut merged = 0;
        for group in sites.into_values().filter(|g| g.len() > 1) {
            merge_vertices(graph, &group, ids)?;
            merged += 1;
        }
        Ok(merged)
    }
}

impl Summarizer for AllocSiteSummarizer {
    fn name(&self) -> &'static str {
        "AllocSite"
    }

    fn summarize(&self, mut graph: HeapGraph, ids: &mut IdAllocator) -> Result<HeapGraph> {
        let merged = self.run(&mut graph, ids)?;
        info!("allocation-site summary merged {} groups", merged);
        Ok(graph)
    }
}

/// Merges vertices whose type lists are identical. Works on a copy, so the
/// input graph is never touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeSetSummarizer;

impl TypeSetSummarizer {
    pub fn summarize_copy(&self, graph: &HeapGraph, ids: &mut IdAllocator) -> Result<HeapGraph, MergeError> {
        let mut buckets: BTreeMap<Vec<String>, Vec<VertexRef>> = BTreeMap::new();
        for v in graph.vertices() {
            buckets.entry(v.types().to_vec()).or_default().push(v.clone());
        }

        let mut summary = graph.deepish_copy();
        for group in buckets.into_values().filter(|g| g.len() > 1) {
            merge_vertices(&mut summary, &group, ids)?;
        }
        Ok(summary)
    }
}

impl Summarizer for TypeSetSummarizer {
    fn name(&self) -> &'static str {
        "TypeGraph"
    }

    fn summarize(&self, graph: HeapGraph, ids: &mut IdAllocator) -> Result<HeapGraph> {
        Ok(self.summarize_copy(&graph, ids)?)
    }
}

/// Collapses same-type pointer chains (linked-list and tree backbones), then
/// repeatedly merges same-type vertices that share exactly the same
/// predecessors.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackboneSummarizer;

impl BackboneSummarizer {
    /// Merge every `v -> w` pair with equal representative types until no
    /// such pair is left. Returns whether anything merged.
    pub fn collapse_backbones(&self, graph: &mut HeapGraph, ids: &mut IdAllocator) -> Result<bool, MergeError> {
        let mut worklist: Vec<VertexRef> = graph.vertices().cloned().collect();
        worklist.reverse();
        let mut changed = false;

        while let Some(v) = worklist.pop() {
            if !graph.contains_vertex(&v) {
                continue;
            }
            let partner = graph
                .outgoing_edges(&v)?
                .into_iter()
                .find(|e| e.to != v && e.to.rep_type() == v.rep_type())
                .map(|e| e.to.clone());
            let Some(w) = partner else {
                continue;
            };

            let merged = merge_vertices(graph, &[v, w], ids)?;
            changed = true;

            // Same-type predecessors of the summary now form new pairs with it.
            for p in graph.predecessors(&merged)? {
                if p != merged && p.rep_type() == merged.rep_type() {
                    worklist.push(p);
                }
            }
            worklist.push(merged);
        }
        Ok(changed)
    }

    /// One pass of merging vertices grouped by (predecessor set, type).
    /// Returns whether anything merged.
    pub fn merge_same_predecessors(&self, graph: &mut HeapGraph, ids: &mut IdAllocator) -> Result<bool, MergeError> {
        let mut groups: BTreeMap<(BTreeSet<VertexId>, String), Vec<VertexRef>> = BTreeMap::new();
        for v in graph.vertices() {
            let preds: BTreeSet<VertexId> = graph.predecessors(v)?.iter().map(|p| p.id()).collect();
            groups
                .entry((preds, v.rep_type().to_string()))
                .or_default()
                .push(v.clone());
        }

        let mut changed = false;
        for group in groups.into_values().filter(|g| g.len() > 1) {
            merge_vertices(graph, &group, ids)?;
            changed = true;
        }
        Ok(changed)
    }
}

impl Summarizer for BackboneSummarizer {
    fn name(&self) -> &'static str {
        "SoftVis2010"
    }

    fn summarize(&self, mut graph: HeapGraph, ids: &mut IdAllocator) -> Result<HeapGraph> {
        let before = graph.vertex_count();
        self.collapse_backbones(&mut graph, ids)?;
        let mut rounds = 0;
        while self.merge_same_predecessors(&mut graph, ids)? {
            rounds += 1;
        }
        info!(
            "backbone summary: {} -> {} vertices after {} predecessor rounds",
            before,
            graph.vertex_count(),
            rounds
        );
        Ok(graph)
    }
}
