//! Vertex merging inside a heap graph.

use std::collections::BTreeSet;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::domain::graph::GraphError;
use crate::domain::ids::IdAllocator;
use crate::domain::vertex::{HeapGraph, ModelError, Vertex, VertexId, VertexRef};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Add a pointer edge, treating an identical existing edge as success.
/// Returns whether a new edge was created.
pub fn connect(
    graph: &mut HeapGraph,
    from: &VertexRef,
    to: &VertexRef,
    label: Option<String>,
) -> Result<bool, GraphError> {
    match graph.add_edge(from, to, label) {
        Ok(_) => Ok(true),
        Err(err) if err.is_recoverable() => {
            debug!("skipping {}", err);
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Replace `group` with one summary vertex.
///
/// Every vertex outside the group that pointed at a member now points at the
/// summary, and the summary points at every outside vertex a member pointed
/// at. Edge labels are not carried over, and edges internal to the group
/// disappear.
pub fn merge_vertices(
    graph: &mut HeapGraph,
    group: &[VertexRef],
    ids: &mut IdAllocator,
) -> Result<VertexRef, MergeError> {
    let in_group: BTreeSet<VertexId> = group.iter().map(|v| v.id()).collect();

    let mut predecessors = BTreeSet::new();
    let mut successors = BTreeSet::new();
    for v in group {
        for edge in graph.edges_of(v)? {
            if edge.from == *v && !in_group.contains(&edge.to.id()) {
                successors.insert(edge.to.clone());
            } else if edge.to == *v && !in_group.contains(&edge.from.id()) {
                predecessors.insert(edge.from.clone());
            }
        }
    }

    let merged = Rc::new(Vertex::merge(ids, group)?);
    for v in group {
        graph.remove_vertex(v);
    }
    graph.add_vertex(merged.clone());

    for p in &predecessors {
        connect(graph, p, &merged, None)?;
    }
    for s in &successors {
        connect(graph, &merged, s, None)?;
    }

    debug!("merged {} vertices into {}", group.len(), merged);
    Ok(merged)
}
