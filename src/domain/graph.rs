//! Property Graph
//!
//! A directed multigraph stored as incidence lists: every vertex maps to the
//! ordered list of edges touching it. An edge is listed under both of its
//! endpoints, except a self-edge, which is listed once and stands for both
//! directions.
//!
//! Pointer edges are unique per `(from, to, label)` triple. Ownership edges
//! reuse a matching edge if one exists instead of adding another.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use thiserror::Error;

/// Handle of an edge inside one [`PropertyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(u64);

/// A directed, optionally labeled edge with two independent facets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge<V, L> {
    pub from: V,
    pub to: V,
    pub label: Option<L>,
    /// A structural reference from `from` to `to`.
    pub pointer: bool,
    /// `from` owns (dominates) `to`.
    pub ownership: bool,
}

impl<V: PartialEq, L: PartialEq> Edge<V, L> {
    /// Same endpoints and label; the facets are ignored.
    pub fn same_triple(&self, from: &V, to: &V, label: Option<&L>) -> bool {
        self.from == *from && self.to == *to && self.label.as_ref() == label
    }

    pub fn is_self_edge(&self) -> bool {
        self.from == self.to
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("vertex {0} is not in the graph")]
    MissingVertex(String),
    #[error("duplicate edge {from} -> {to} (label {label:?})")]
    DuplicateEdge {
        from: String,
        to: String,
        label: Option<String>,
    },
    #[error("only {reached} of {total} vertices are reachable from the root")]
    Unreachable { reached: usize, total: usize },
}

impl GraphError {
    /// Only duplicate edges may be skipped; everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GraphError::DuplicateEdge { .. })
    }
}

/// Generic directed graph over opaque vertex handles `V` and edge labels `L`.
#[derive(Debug, Clone)]
pub struct PropertyGraph<V, L> {
    incidence: BTreeMap<V, Vec<EdgeId>>,
    edges: BTreeMap<EdgeId, Edge<V, L>>,
    next_edge: u64,
}

impl<V, L> Default for PropertyGraph<V, L> {
    fn default() -> Self {
        Self {
            incidence: BTreeMap::new(),
            edges: BTreeMap::new(),
            next_edge: 0,
        }
    }
}

enum Visit<V> {
    Discover(V),
    Finish(V),
}

impl<V, L> PropertyGraph<V, L>
where
    V: Clone + Ord + Debug,
    L: Clone + PartialEq + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.incidence.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_vertex(&self, v: &V) -> bool {
        self.incidence.contains_key(v)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &V> {
        self.incidence.keys()
    }

    /// Every edge in the graph, each exactly once.
    pub fn all_edges(&self) -> impl Iterator<Item = (EdgeId, &Edge<V, L>)> {
        self.edges.iter().map(|(id, e)| (*id, e))
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge<V, L>> {
        self.edges.get(&id)
    }

    /// Length of `v`'s incidence list (a self-edge counts once).
    pub fn degree(&self, v: &V) -> Result<usize, GraphError> {
        self.incident_ids(v).map(<[EdgeId]>::len)
    }

    /// Insert `v` with an empty incidence list. Returns false if already present.
    pub fn add_vertex(&mut self, v: V) -> bool {
        if self.incidence.contains_key(&v) {
            return false;
        }
        self.incidence.insert(v, Vec::new());
        true
    }

    /// Remove `v` and every edge touching it. Returns false if `v` is absent.
    pub fn remove_vertex(&mut self, v: &V) -> bool {
        let Some(edge_ids) = self.incidence.remove(v) else {
            return false;
        };

        for id in edge_ids {
            let Some(edge) = self.edges.remove(&id) else {
                continue;
            };
            if edge.is_self_edge() {
                continue;
            }
            let other = if edge.from == *v { &edge.to } else { &edge.from };
            if let Some(list) = self.incidence.get_mut(other) {
                list.retain(|e| *e != id);
            }
        }

        true
    }

    /// Add a pointer edge.
    ///
    /// Both endpoints' lists are checked for an edge with the same
    /// `(from, to, label)` before anything is touched, so a rejected
    /// duplicate leaves the graph exactly as it was.
    pub fn add_edge(&mut self, from: &V, to: &V, label: Option<L>) -> Result<EdgeId, GraphError> {
        self.require(from)?;
        self.require(to)?;

        let duplicate = self.find_in(from, from, to, label.as_ref())?.is_some()
            || (from != to && self.find_in(to, from, to, label.as_ref())?.is_some());
        if duplicate {
            return Err(GraphError::DuplicateEdge {
                from: format!("{:?}", from),
                to: format!("{:?}", to),
                label: label.map(|l| format!("{:?}", l)),
            });
        }

        Ok(self.insert_edge(Edge {
            from: from.clone(),
            to: to.clone(),
            label,
            pointer: true,
            ownership: false,
        }))
    }

    /// Mark the `(from, to, label)` edge as an ownership edge, creating an
    /// ownership-only edge if none exists. Never reports a duplicate.
    pub fn add_ownership_edge(
        &mut self,
        from: &V,
        to: &V,
        label: Option<L>,
    ) -> Result<EdgeId, GraphError> {
        self.require(to)?;
        if let Some(id) = self.find_in(from, from, to, label.as_ref())? {
            if let Some(edge) = self.edges.get_mut(&id) {
                edge.ownership = true;
            }
            return Ok(id);
        }

        Ok(self.insert_edge(Edge {
            from: from.clone(),
            to: to.clone(),
            label,
            pointer: false,
            ownership: true,
        }))
    }

    /// All edges incident to `v`, in insertion order.
    pub fn edges_of(&self, v: &V) -> Result<Vec<&Edge<V, L>>, GraphError> {
        Ok(self
            .incident_ids(v)?
            .iter()
            .filter_map(|id| self.edges.get(id))
            .collect())
    }

    pub fn outgoing_edges(&self, v: &V) -> Result<Vec<&Edge<V, L>>, GraphError> {
        let mut edges = self.edges_of(v)?;
        edges.retain(|e| e.from == *v);
        Ok(edges)
    }

    pub fn incoming_edges(&self, v: &V) -> Result<Vec<&Edge<V, L>>, GraphError> {
        let mut edges = self.edges_of(v)?;
        edges.retain(|e| e.to == *v);
        Ok(edges)
    }

    /// Distinct targets of `v`'s outgoing edges.
    pub fn successors(&self, v: &V) -> Result<BTreeSet<V>, GraphError> {
        Ok(self
            .outgoing_edges(v)?
            .into_iter()
            .map(|e| e.to.clone())
            .collect())
    }

    /// Distinct sources of `v`'s incoming edges.
    pub fn predecessors(&self, v: &V) -> Result<BTreeSet<V>, GraphError> {
        Ok(self
            .incoming_edges(v)?
            .into_iter()
            .map(|e| e.from.clone())
            .collect())
    }

    /// A copy with fresh incidence lists over the same vertices and edges.
    /// Mutating the copy never affects `self`.
    pub fn deepish_copy(&self) -> Self {
        self.clone()
    }

    /// Postorder over the vertices reachable from `root`, computed with an
    /// explicit discover/finish stack so deep heaps cannot overflow.
    ///
    /// Every vertex in the graph must be reachable from `root`.
    pub fn postordering(&self, root: &V) -> Result<Vec<V>, GraphError> {
        self.require(root)?;

        let mut order = Vec::with_capacity(self.vertex_count());
        let mut visited = BTreeSet::new();
        let mut stack = vec![Visit::Discover(root.clone())];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Discover(v) => {
                    if !visited.insert(v.clone()) {
                        continue;
                    }
                    let successors = self.successors(&v)?;
                    stack.push(Visit::Finish(v));
                    for s in successors {
                        if !visited.contains(&s) {
                            stack.push(Visit::Discover(s));
                        }
                    }
                }
                Visit::Finish(v) => order.push(v),
            }
        }

        if order.len() != self.vertex_count() {
            return Err(GraphError::Unreachable {
                reached: order.len(),
                total: self.vertex_count(),
            });
        }
        Ok(order)
    }

    /// Immediate dominators (Cooper, Harvey & Kennedy). The root maps to itself.
    pub fn dominators(&self, root: &V) -> Result<BTreeMap<V, V>, GraphError> {
        let order = self.postordering(root)?;
        let n = order.len();
        let root_idx = n - 1;

        let index: BTreeMap<&V, usize> = order.iter().enumerate().map(|(i, v)| (v, i)).collect();
        let mut preds: Vec<Vec<usize>> = Vec::with_capacity(n);
        for v in &order {
            let mut ps: Vec<usize> = self
                .predecessors(v)?
                .iter()
                .filter_map(|p| index.get(p).copied())
                .collect();
            ps.sort_unstable_by(|a, b| b.cmp(a));
            preds.push(ps);
        }

        let mut doms: Vec<Option<usize>> = vec![None; n];
        doms[root_idx] = Some(root_idx);

        let mut changed = true;
        while changed {
            changed = false;
            for b in (0..root_idx).rev() {
                let mut new_idom: Option<usize> = None;
                for &p in &preds[b] {
                    if doms[p].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(current) => intersect(&doms, p, current, root_idx),
                    });
                }
                if new_idom.is_some() && doms[b] != new_idom {
                    doms[b] = new_idom;
                    changed = true;
                }
            }
        }

        Ok(order
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let d = doms[i].unwrap_or(root_idx);
                (v.clone(), order[d].clone())
            })
            .collect())
    }

    /// Add an ownership edge from each vertex's immediate dominator to it.
    /// Returns the number of edges marked.
    pub fn annotate_ownership(&mut self, root: &V) -> Result<usize, GraphError> {
        let dominators = self.dominators(root)?;
        let mut marked = 0;
        for (v, idom) in &dominators {
            if v != idom {
                self.add_ownership_edge(idom, v, None)?;
                marked += 1;
            }
        }
        Ok(marked)
    }

    /// Every listed edge exists, touches the vertex it is listed under, and
    /// has both endpoints in the graph.
    pub fn is_consistent(&self) -> bool {
        self.incidence.iter().all(|(v, ids)| {
            ids.iter().all(|id| match self.edges.get(id) {
                Some(e) => {
                    (e.from == *v || e.to == *v)
                        && self.incidence.contains_key(&e.from)
                        && self.incidence.contains_key(&e.to)
                }
                None => false,
            })
        })
    }

    fn require(&self, v: &V) -> Result<(), GraphError> {
        if self.incidence.contains_key(v) {
            Ok(())
        } else {
            Err(GraphError::MissingVertex(format!("{:?}", v)))
        }
    }

    fn incident_ids(&self, v: &V) -> Result<&[EdgeId], GraphError> {
        self.incidence
            .get(v)
            .map(Vec::as_slice)
            .ok_or_else(|| GraphError::MissingVertex(format!("{:?}", v)))
    }

    /// Search `owner`'s incidence list for a `(from, to, label)` edge.
    fn find_in(
        &self,
        owner: &V,
        from: &V,
        to: &V,
        label: Option<&L>,
    ) -> Result<Option<EdgeId>, GraphError> {
        Ok(self.incident_ids(owner)?.iter().copied().find(|id| {
            self.edges
                .get(id)
                .is_some_and(|e| e.same_triple(from, to, label))
        }))
    }

    fn insert_edge(&mut self, edge: Edge<V, L>) -> EdgeId {
        let id = EdgeId(self.next_edge);
        self.next_edge += 1;

        if let Some(list) = self.incidence.get_mut(&edge.from) {
            list.push(id);
        }
        if !edge.is_self_edge() {
            if let Some(list) = self.incidence.get_mut(&edge.to) {
                list.push(id);
            }
        }
        self.edges.insert(id, edge);
        id
    }
}

/// Walk two postorder indices up the dominator chain until they meet.
fn intersect(doms: &[Option<usize>], a: usize, b: usize, root: usize) -> usize {
    let mut finger1 = a;
    let mut finger2 = b;
    while finger1 != finger2 {
        while finger1 < finger2 {
            finger1 = doms[finger1].unwrap_or(root);
        }
        while finger2 < finger1 {
            finger2 = doms[finger2].unwrap_or(root);
        }
    }
    finger1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(vertices: &[char], edges: &[(char, char)]) -> PropertyGraph<char, String> {
        let mut g = PropertyGraph::new();
        for v in vertices {
            g.add_vertex(*v);
        }
        for (from, to) in edges {
            g.add_edge(from, to, None).unwrap();
        }
        g
    }

    #[test]
    fn test_add_vertex_twice() {
        let mut g: PropertyGraph<char, String> = PropertyGraph::new();
        assert!(g.add_vertex('a'));
        assert!(!g.add_vertex('a'));
        assert_eq!(g.vertex_count(), 1);
    }

    #[test]
    fn test_edge_to_missing_vertex_is_fatal() {
        let mut g = graph(&['a'], &[]);
        let err = g.add_edge(&'a', &'z', None).unwrap_err();
        assert!(matches!(err, GraphError::MissingVertex(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_duplicate_edge_leaves_lists_untouched() {
        let mut g = graph(&['a', 'b'], &[('a', 'b')]);
        let err = g.add_edge(&'a', &'b', None).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(g.degree(&'a').unwrap(), 1);
        assert_eq!(g.degree(&'b').unwrap(), 1);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_same_endpoints_different_labels() {
        let mut g = graph(&['a', 'b'], &[]);
        g.add_edge(&'a', &'b', Some("next".to_string())).unwrap();
        g.add_edge(&'a', &'b', Some("prev".to_string())).unwrap();
        assert_eq!(g.outgoing_edges(&'a').unwrap().len(), 2);
        assert_eq!(g.successors(&'a').unwrap().len(), 1);
    }

    #[test]
    fn test_first_self_edge_is_not_a_duplicate() {
        let mut g = graph(&['a'], &[]);
        g.add_edge(&'a', &'a', None).unwrap();
        assert_eq!(g.degree(&'a').unwrap(), 1);
        assert!(g.successors(&'a').unwrap().contains(&'a'));
        assert!(g.predecessors(&'a').unwrap().contains(&'a'));
        assert!(g.add_edge(&'a', &'a', None).is_err());
    }

    #[test]
    fn test_remove_vertex_cascades() {
        let mut g = graph(&['a', 'b', 'c'], &[('a', 'b'), ('b', 'c'), ('b', 'b')]);
        assert!(g.remove_vertex(&'b'));
        assert!(!g.remove_vertex(&'b'));
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.degree(&'a').unwrap(), 0);
        assert_eq!(g.degree(&'c').unwrap(), 0);
        assert!(g.is_consistent());
    }

    #[test]
    fn test_ownership_edge_reuses_pointer_edge() {
        let mut g = graph(&['a', 'b'], &[('a', 'b')]);
        g.add_ownership_edge(&'a', &'b', None).unwrap();
        assert_eq!(g.edge_count(), 1);
        let edge = g.outgoing_edges(&'a').unwrap()[0];
        assert!(edge.pointer && edge.ownership);

        g.add_ownership_edge(&'b', &'a', None).unwrap();
        g.add_ownership_edge(&'b', &'a', None).unwrap();
        assert_eq!(g.edge_count(), 2);
        let back = g.outgoing_edges(&'b').unwrap()[0];
        assert!(!back.pointer && back.ownership);
    }

    #[test]
    fn test_postordering_visits_children_first() {
        let g = graph(
            &['a', 'b', 'c', 'd', 'e', 'f'],
            &[
                ('a', 'b'),
                ('a', 'c'),
                ('b', 'd'),
                ('c', 'e'),
                ('c', 'f'),
                ('d', 'e'),
                ('e', 'd'),
                ('e', 'f'),
                ('f', 'e'),
            ],
        );
        let order = g.postordering(&'a').unwrap();
        assert_eq!(order.len(), 6);
        assert_eq!(*order.last().unwrap(), 'a');
    }

    #[test]
    fn test_postordering_rejects_unreachable() {
        let g = graph(&['a', 'b', 'x'], &[('a', 'b')]);
        assert_eq!(
            g.postordering(&'a').unwrap_err(),
            GraphError::Unreachable { reached: 2, total: 3 }
        );
    }

    #[test]
    fn test_dominators_tree() {
        let g = graph(
            &['F', 'B', 'G', 'A', 'D', 'C', 'E', 'I', 'H'],
            &[
                ('F', 'B'),
                ('F', 'G'),
                ('B', 'A'),
                ('B', 'D'),
                ('D', 'C'),
                ('D', 'E'),
                ('G', 'I'),
                ('I', 'H'),
            ],
        );
        let doms = g.dominators(&'F').unwrap();
        assert_eq!(doms[&'F'], 'F');
        assert_eq!(doms[&'B'], 'F');
        assert_eq!(doms[&'C'], 'D');
        assert_eq!(doms[&'E'], 'D');
        assert_eq!(doms[&'H'], 'I');
    }

    #[test]
    fn test_dominators_with_cycles() {
        let g = graph(
            &['a', 'b', 'c', 'd', 'e', 'f'],
            &[
                ('a', 'b'),
                ('a', 'c'),
                ('b', 'd'),
                ('c', 'e'),
                ('c', 'f'),
                ('d', 'e'),
                ('e', 'd'),
                ('e', 'f'),
                ('f', 'e'),
            ],
        );
        let doms = g.dominators(&'a').unwrap();
        assert_eq!(doms[&'b'], 'a');
        assert_eq!(doms[&'c'], 'a');
        assert_eq!(doms[&'d'], 'a');
        assert_eq!(doms[&'e'], 'a');
        // f is reachable through c and also through b -> d -> e.
        assert_eq!(doms[&'f'], 'a');
    }

    #[test]
    fn test_annotate_ownership() {
        let mut g = graph(&['r', 'x', 'y'], &[('r', 'x'), ('x', 'y'), ('r', 'y')]);
        let marked = g.annotate_ownership(&'r').unwrap();
        assert_eq!(marked, 2);
        // r dominates y directly, so the existing r -> y pointer edge is reused.
        assert_eq!(g.edge_count(), 3);
        let owned: Vec<_> = g.all_edges().filter(|(_, e)| e.ownership).collect();
        assert_eq!(owned.len(), 2);
    }

    #[test]
    fn test_deepish_copy_is_independent() {
        let g = graph(&['a', 'b'], &[('a', 'b')]);
        let mut copy = g.deepish_copy();
        copy.remove_vertex(&'b');
        assert_eq!(g.vertex_count(), 2);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(copy.vertex_count(), 1);
    }
}
