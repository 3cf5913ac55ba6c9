//! Heap Vertex
//!
//! A vertex is one heap object or a summary of several. Identity, equality
//! and ordering all go by `id`, so a vertex can key graph maps and sets.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use thiserror::Error;

use crate::domain::graph::PropertyGraph;
use crate::domain::ids::IdAllocator;

pub type VertexId = u64;

/// Shared handle; graph copies share vertices rather than cloning them.
pub type VertexRef = Rc<Vertex>;

/// The object graph: vertices are heap objects, labels are field names or
/// array indices.
pub type HeapGraph = PropertyGraph<VertexRef, String>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("vertex id {0} is already in use")]
    IdInUse(VertexId),
    #[error("cannot merge an empty group of vertices")]
    EmptyMerge,
    #[error("vertex {0} summarizes several objects and cannot carry field values")]
    FieldsOnSummary(VertexId),
}

#[derive(Debug, Clone)]
pub struct Vertex {
    id: VertexId,
    members: Vec<VertexId>,
    rep_type: String,
    types: Vec<String>,
    size: u64,
    alloc_context: Option<String>,
    fields: Option<BTreeMap<String, String>>,
}

impl Vertex {
    /// A vertex for a single heap object. Claims `id` in `ids`.
    pub fn concrete(
        ids: &mut IdAllocator,
        id: VertexId,
        rep_type: impl Into<String>,
        size: u64,
        alloc_context: Option<String>,
    ) -> Result<Self, ModelError> {
        ids.claim(id)?;
        let rep_type = rep_type.into();
        Ok(Self {
            id,
            members: vec![id],
            types: vec![rep_type.clone()],
            rep_type,
            size,
            alloc_context,
            fields: None,
        })
    }

    /// Combine `group` into one summary vertex with a fresh id.
    ///
    /// The representative type is the first vertex's. `types` is the ordered
    /// union of the inputs' types. The allocation context survives only when
    /// every input that has one agrees on it. Field values survive only when
    /// there is a single input.
    pub fn merge(ids: &mut IdAllocator, group: &[VertexRef]) -> Result<Self, ModelError> {
        let first = group.first().ok_or(ModelError::EmptyMerge)?;

        let mut members = Vec::new();
        let mut seen_members = HashSet::new();
        let mut types: Vec<String> = Vec::new();
        let mut size = 0u64;
        for v in group {
            for m in &v.members {
                if seen_members.insert(*m) {
                    members.push(*m);
                }
            }
            for t in &v.types {
                if !types.contains(t) {
                    types.push(t.clone());
                }
            }
            size = size.saturating_add(v.size);
        }

        let mut contexts = group.iter().filter_map(|v| v.alloc_context.as_deref());
        let alloc_context = match contexts.next() {
            Some(ctx) if contexts.all(|other| other == ctx) => Some(ctx.to_string()),
            _ => None,
        };

        let fields = if group.len() == 1 {
            first.fields.clone()
        } else {
            None
        };

        Ok(Self {
            id: ids.fresh(),
            members,
            rep_type: first.rep_type.clone(),
            types,
            size,
            alloc_context,
            fields,
        })
    }

    /// Record a primitive field value. Only single-object vertices carry fields.
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), ModelError> {
        if self.members.len() != 1 {
            return Err(ModelError::FieldsOnSummary(self.id));
        }
        self.fields
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        Ok(())
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    /// Ids of the concrete objects this vertex stands for.
    pub fn members(&self) -> &[VertexId] {
        &self.members
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn is_summary(&self) -> bool {
        self.members.len() > 1
    }

    pub fn rep_type(&self) -> &str {
        &self.rep_type
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    /// Total shallow size in bytes of all members.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn alloc_context(&self) -> Option<&str> {
        self.alloc_context.as_deref()
    }

    pub fn fields(&self) -> Option<&BTreeMap<String, String>> {
        self.fields.as_ref()
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Vertex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Vertex {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.id, self.rep_type)?;
        if self.is_summary() {
            write!(f, " x{}", self.count())?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concrete(ids: &mut IdAllocator, id: u64, ty: &str, size: u64, ctx: Option<&str>) -> VertexRef {
        Rc::new(Vertex::concrete(ids, id, ty, size, ctx.map(str::to_string)).unwrap())
    }

    #[test]
    fn test_concrete_vertex_claims_id() {
        let mut ids = IdAllocator::with_seed(1);
        let v = concrete(&mut ids, 10, "Node", 16, None);
        assert_eq!(v.members(), &[10]);
        assert_eq!(v.types(), &["Node".to_string()]);
        assert!(!v.is_summary());
        assert_eq!(
            Vertex::concrete(&mut ids, 10, "Node", 16, None).unwrap_err(),
            ModelError::IdInUse(10)
        );
    }

    #[test]
    fn test_merge_combines_members_types_and_size() {
        let mut ids = IdAllocator::with_seed(1);
        let a = concrete(&mut ids, 1, "A", 8, Some("here"));
        let b = concrete(&mut ids, 2, "B", 16, Some("here"));
        let c = concrete(&mut ids, 3, "A", 4, None);

        let merged = Vertex::merge(&mut ids, &[a, b, c]).unwrap();
        assert_eq!(merged.rep_type(), "A");
        assert_eq!(merged.types(), &["A".to_string(), "B".to_string()]);
        assert_eq!(merged.members(), &[1, 2, 3]);
        assert_eq!(merged.size(), 28);
        assert_eq!(merged.alloc_context(), Some("here"));
        assert!(![1, 2, 3].contains(&merged.id()));
    }

    #[test]
    fn test_merge_drops_conflicting_contexts() {
        let mut ids = IdAllocator::with_seed(1);
        let a = concrete(&mut ids, 1, "A", 1, Some("x"));
        let b = concrete(&mut ids, 2, "A", 1, Some("y"));
        let merged = Vertex::merge(&mut ids, &[a, b]).unwrap();
        assert_eq!(merged.alloc_context(), None);
    }

    #[test]
    fn test_merge_drops_fields_of_groups() {
        let mut ids = IdAllocator::with_seed(1);
        let mut a = Vertex::concrete(&mut ids, 1, "int[]", 8, None).unwrap();
        a.add_field("0", "7").unwrap();
        let a = Rc::new(a);
        let b = concrete(&mut ids, 2, "int[]", 8, None);

        let single = Vertex::merge(&mut ids, &[a.clone()]).unwrap();
        assert_eq!(single.fields().unwrap()["0"], "7");

        let mut pair = Vertex::merge(&mut ids, &[a, b]).unwrap();
        assert!(pair.fields().is_none());
        assert!(pair.add_field("0", "1").is_err());
    }

    #[test]
    fn test_merge_empty_group() {
        let mut ids = IdAllocator::with_seed(1);
        assert_eq!(Vertex::merge(&mut ids, &[]).unwrap_err(), ModelError::EmptyMerge);
    }

    #[test]
    fn test_equality_by_id_only() {
        let mut ids = IdAllocator::with_seed(1);
        let a = Vertex::concrete(&mut ids, 1, "A", 1, None).unwrap();
        let mut other = IdAllocator::with_seed(1);
        let b = Vertex::concrete(&mut other, 1, "B", 99, None).unwrap();
        assert_eq!(a, b);
    }
}
