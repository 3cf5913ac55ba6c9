//! Heap Graph Builder
//!
//! Accumulates the records of one snapshot and turns them into the live
//! object graph: a synthetic root pointing at every kept GC root, then every
//! object reachable from those roots through reference fields and object
//! array slots.
//!
//! Strings, classes, frames and traces describe the runtime rather than the
//! heap, so they outlive a snapshot. Instances and roots are dropped once the
//! snapshot is built.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::blacklist::Blacklist;
use crate::domain::ids::IdAllocator;
use crate::domain::merge::connect;
use crate::domain::records::{
    BasicType, ClassDump, InstanceDump, InstanceField, LoadClass, ObjectArrayDump,
    PrimitiveArrayDump, StackFrame, StackTrace, Value, REFERENCE_SIZE,
};
use crate::domain::vertex::{HeapGraph, ModelError, Vertex, VertexRef};

pub const SYNTHETIC_ROOT_ID: u64 = 0;
pub const SYNTHETIC_ROOT_TYPE: &str = "Fake root";
const CLASS_OBJECT_PREFIX: &str = "java.lang.Class - ";
const UNRESOLVED: &str = "<unresolved>";

/// A problem with one object or root. The builder skips it and moves on,
/// except for [`ResolveError::Model`], which means ids collided.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("object {0:#x} is not in the snapshot")]
    UnknownObject(u64),
    #[error("class {0:#x} is not in the snapshot")]
    UnknownClass(u64),
    #[error("object {obj_id:#x} has {actual} field values but its class declares {expected}")]
    FieldCountMismatch {
        obj_id: u64,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ResolveError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ResolveError::Model(_))
    }
}

/// A built snapshot: the graph, its synthetic root, and the id pool that
/// summarizers must draw fresh ids from.
#[derive(Debug)]
pub struct Snapshot {
    pub graph: HeapGraph,
    pub root: VertexRef,
    pub ids: IdAllocator,
}

#[derive(Debug, Clone)]
struct ClassInfo {
    name: String,
    super_class_id: u64,
    instance_size: u32,
    instance_fields: Vec<InstanceField>,
    stack_trace_serial: u32,
}

#[derive(Debug, Clone)]
struct FrameInfo {
    method_name_id: u64,
    source_file_id: u64,
    class_serial: u32,
    line: i32,
}

#[derive(Debug, Clone)]
enum Instance {
    Object {
        class_id: u64,
        stack_trace_serial: u32,
        values: Vec<Value>,
    },
    ObjectArray {
        elem_class_id: u64,
        stack_trace_serial: u32,
        elements: Vec<u64>,
    },
    PrimitiveArray {
        elem_type: BasicType,
        stack_trace_serial: u32,
        elements: Vec<Value>,
    },
}

impl Instance {
    fn stack_trace_serial(&self) -> u32 {
        match self {
            Instance::Object { stack_trace_serial, .. }
            | Instance::ObjectArray { stack_trace_serial, .. }
            | Instance::PrimitiveArray { stack_trace_serial, .. } => *stack_trace_serial,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Root {
    JavaFrame {
        target: u64,
        thread_serial: u32,
        frame_num: u32,
    },
    Static {
        target: u64,
        class_id: u64,
        field_name_id: u64,
    },
}

impl Root {
    fn target(&self) -> u64 {
        match self {
            Root::JavaFrame { target, .. } | Root::Static { target, .. } => *target,
        }
    }
}

#[derive(Debug, Default)]
pub struct HeapGraphBuilder {
    strings: HashMap<u64, String>,
    classes: HashMap<u64, ClassInfo>,
    class_by_serial: HashMap<u32, u64>,
    frames: HashMap<u64, FrameInfo>,
    traces: HashMap<u32, Vec<u64>>,
    instances: HashMap<u64, Instance>,
    roots: Vec<Root>,
    blacklist: Blacklist,
    seed: Option<u64>,
}

impl HeapGraphBuilder {
    pub fn new(blacklist: Blacklist) -> Self {
        Self {
            blacklist,
            ..Self::default()
        }
    }

    /// Seed the per-snapshot id pools so summary ids are reproducible.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Whether any instance or root is waiting for `build`.
    pub fn has_pending(&self) -> bool {
        !self.instances.is_empty() || !self.roots.is_empty()
    }

    pub fn intern_string(&mut self, id: u64, text: String) {
        self.strings.insert(id, text);
    }

    pub fn load_class(&mut self, record: LoadClass) {
        let name = self.string(record.name_id).to_string();
        self.class_by_serial.insert(record.class_serial, record.class_id);
        self.classes.insert(
            record.class_id,
            ClassInfo {
                name,
                super_class_id: 0,
                instance_size: 0,
                instance_fields: Vec::new(),
                stack_trace_serial: record.stack_trace_serial,
            },
        );
    }

    pub fn stack_frame(&mut self, record: StackFrame) {
        self.frames.insert(
            record.frame_id,
            FrameInfo {
                method_name_id: record.method_name_id,
                source_file_id: record.source_file_id,
                class_serial: record.class_serial,
                line: record.line,
            },
        );
    }

    pub fn stack_trace(&mut self, record: StackTrace) {
        self.traces.insert(record.trace_serial, record.frame_ids);
    }

    pub fn add_java_frame_root(&mut self, obj_id: u64, thread_serial: u32, frame_num: u32) {
        self.roots.push(Root::JavaFrame {
            target: obj_id,
            thread_serial,
            frame_num,
        });
    }

    pub fn add_static_root(&mut self, obj_id: u64, class_id: u64, field_name_id: u64) {
        self.roots.push(Root::Static {
            target: obj_id,
            class_id,
            field_name_id,
        });
    }

    /// Fill in a loaded class's layout. Non-null object statics become roots.
    pub fn class_dump(&mut self, record: ClassDump) {
        for field in &record.static_fields {
            if let Some(target) = field.value.as_reference() {
                self.add_static_root(target, record.class_id, field.name_id);
            }
        }

        match self.classes.get_mut(&record.class_id) {
            Some(class) => {
                class.super_class_id = record.super_class_id;
                class.instance_size = record.instance_size;
                class.instance_fields = record.instance_fields;
            }
            None => warn!("class dump for {:#x} without a prior class load", record.class_id),
        }
    }

    pub fn instance_dump(&mut self, record: InstanceDump) {
        self.instances.entry(record.obj_id).or_insert(Instance::Object {
            class_id: record.class_id,
            stack_trace_serial: record.stack_trace_serial,
            values: record.values,
        });
    }

    pub fn object_array_dump(&mut self, record: ObjectArrayDump) {
        self.instances.entry(record.obj_id).or_insert(Instance::ObjectArray {
            elem_class_id: record.elem_class_id,
            stack_trace_serial: record.stack_trace_serial,
            elements: record.elements,
        });
    }

    pub fn primitive_array_dump(&mut self, record: PrimitiveArrayDump) {
        self.instances.entry(record.obj_id).or_insert(Instance::PrimitiveArray {
            elem_type: record.elem_type,
            stack_trace_serial: record.stack_trace_serial,
            elements: record.elements,
        });
    }

    /// Build the object graph of the snapshot collected so far, then drop its
    /// instances and roots.
    pub fn build(&mut self) -> Result<Snapshot> {
        let mut ids = match self.seed {
            Some(seed) => IdAllocator::with_seed(seed),
            None => IdAllocator::new(),
        };
        let mut graph = HeapGraph::new();
        let mut vertices: HashMap<u64, VertexRef> = HashMap::with_capacity(self.instances.len());

        let root = Rc::new(Vertex::concrete(
            &mut ids,
            SYNTHETIC_ROOT_ID,
            SYNTHETIC_ROOT_TYPE,
            0,
            None,
        )?);
        graph.add_vertex(root.clone());

        let roots = std::mem::take(&mut self.roots);
        let mut worklist = Vec::new();
        let mut kept_roots = 0usize;

        for r in &roots {
            if !self.keep_root(r) {
                continue;
            }
            let target = match self.find_or_create(&mut vertices, &mut ids, r.target()) {
                Ok(v) => v,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!("skipping root: {}", e);
                    continue;
                }
            };
            graph.add_vertex(target.clone());
            connect(&mut graph, &root, &target, Some(self.root_label(r)))?;
            worklist.push(r.target());
            kept_roots += 1;
        }

        let mut visited: HashSet<u64> = HashSet::new();
        visited.insert(SYNTHETIC_ROOT_ID);

        while let Some(obj_id) = worklist.pop() {
            if !visited.insert(obj_id) {
                continue;
            }
            let references = match self.references_of(obj_id) {
                Ok(refs) => refs,
                Err(e) => {
                    warn!("skipping references of {:#x}: {}", obj_id, e);
                    continue;
                }
            };
            if references.is_empty() {
                continue;
            }
            let from = match self.find_or_create(&mut vertices, &mut ids, obj_id) {
                Ok(v) => v,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!("skipping object: {}", e);
                    continue;
                }
            };

            for (label, target_id) in references {
                let to = match self.find_or_create(&mut vertices, &mut ids, target_id) {
                    Ok(v) => v,
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => {
                        warn!("skipping edge {:#x}.{}: {}", obj_id, label, e);
                        continue;
                    }
                };
                graph.add_vertex(to.clone());
                connect(&mut graph, &from, &to, Some(label))?;
                worklist.push(target_id);
            }
        }

        info!(
            "built snapshot: {} roots kept of {}, {} vertices, {} edges",
            kept_roots,
            roots.len(),
            graph.vertex_count(),
            graph.edge_count()
        );

        self.instances.clear();
        Ok(Snapshot { graph, root, ids })
    }

    /// Allocation site of a stack trace, one `Class.method(File:line)` per
    /// frame, innermost first. `None` for a missing or empty trace.
    pub fn allocation_context(&self, trace_serial: u32) -> Option<String> {
        let frames = self.traces.get(&trace_serial)?;
        if frames.is_empty() {
            return None;
        }

        let lines: Vec<String> = frames
            .iter()
            .map(|frame_id| match self.frames.get(frame_id) {
                Some(frame) => self.describe_frame(frame),
                None => format!("{}(unknown frame {:#x})", UNRESOLVED, frame_id),
            })
            .collect();
        Some(lines.join("\n"))
    }

    fn describe_frame(&self, frame: &FrameInfo) -> String {
        let class = self
            .class_by_serial
            .get(&frame.class_serial)
            .and_then(|id| self.classes.get(id))
            .map_or(UNRESOLVED, |c| c.name.as_str());
        let line = match frame.line {
            n if n > 0 => n.to_string(),
            -2 => "compiled method".to_string(),
            -3 => "native method".to_string(),
            _ => "unknown line".to_string(),
        };
        format!(
            "{}.{}({}:{})",
            class,
            self.string(frame.method_name_id),
            self.string(frame.source_file_id),
            line
        )
    }

    fn string(&self, id: u64) -> &str {
        self.strings.get(&id).map_or(UNRESOLVED, String::as_str)
    }

    fn class_name(&self, class_id: u64) -> Option<&str> {
        self.classes.get(&class_id).map(|c| c.name.as_str())
    }

    fn keep_root(&self, root: &Root) -> bool {
        let Some(instance) = self.instances.get(&root.target()) else {
            debug!("dropping root {:#x}: not a dumped instance", root.target());
            return false;
        };

        match root {
            Root::JavaFrame { target, .. } => {
                let type_name = match instance {
                    Instance::Object { class_id, .. } => self.class_name(*class_id),
                    Instance::ObjectArray { elem_class_id, .. } => self.class_name(*elem_class_id),
                    Instance::PrimitiveArray { .. } => return true,
                };
                match type_name {
                    Some(name) if self.blacklist.blocks_stack_type(name) => {
                        debug!("dropping stack root {:#x} of blacklisted type {}", target, name);
                        false
                    }
                    _ => true,
                }
            }
            Root::Static {
                class_id,
                field_name_id,
                ..
            } => {
                let class = self.class_name(*class_id).unwrap_or(UNRESOLVED);
                let field = self.string(*field_name_id);
                if self.blacklist.blocks_static(class, field) {
                    debug!("dropping blacklisted static root {}.{}", class, field);
                    false
                } else {
                    true
                }
            }
        }
    }

    fn root_label(&self, root: &Root) -> String {
        match root {
            Root::JavaFrame {
                thread_serial,
                frame_num,
                ..
            } => format!("rootJavaFrame-{}-{}", thread_serial, frame_num),
            Root::Static {
                class_id,
                field_name_id,
                ..
            } => format!(
                "{}.{}",
                self.class_name(*class_id).unwrap_or(UNRESOLVED),
                self.string(*field_name_id)
            ),
        }
    }

    /// Instance fields of `class_id` and its superclasses, most-derived first.
    fn field_layout(&self, class_id: u64) -> Result<Vec<&InstanceField>, ResolveError> {
        let mut layout = Vec::new();
        let mut seen = HashSet::new();
        let mut current = class_id;
        while current != 0 && seen.insert(current) {
            let class = self
                .classes
                .get(&current)
                .ok_or(ResolveError::UnknownClass(current))?;
            layout.extend(class.instance_fields.iter());
            current = class.super_class_id;
        }
        Ok(layout)
    }

    /// Labeled outgoing references of `obj_id`. Class objects and objects
    /// without a dump have none.
    fn references_of(&self, obj_id: u64) -> Result<Vec<(String, u64)>, ResolveError> {
        let Some(instance) = self.instances.get(&obj_id) else {
            return Ok(Vec::new());
        };

        match instance {
            Instance::Object {
                class_id, values, ..
            } => {
                let layout = self.field_layout(*class_id)?;
                if layout.len() != values.len() {
                    return Err(ResolveError::FieldCountMismatch {
                        obj_id,
                        expected: layout.len(),
                        actual: values.len(),
                    });
                }
                Ok(layout
                    .iter()
                    .zip(values)
                    .filter(|(field, _)| field.field_type == BasicType::Object)
                    .filter_map(|(field, value)| {
                        value
                            .as_reference()
                            .map(|target| (self.string(field.name_id).to_string(), target))
                    })
                    .collect())
            }
            Instance::ObjectArray { elements, .. } => Ok(elements
                .iter()
                .enumerate()
                .filter(|(_, target)| **target != 0)
                .map(|(idx, target)| (idx.to_string(), *target))
                .collect()),
            Instance::PrimitiveArray { .. } => Ok(Vec::new()),
        }
    }

    fn find_or_create(
        &self,
        vertices: &mut HashMap<u64, VertexRef>,
        ids: &mut IdAllocator,
        obj_id: u64,
    ) -> Result<VertexRef, ResolveError> {
        if let Some(v) = vertices.get(&obj_id) {
            return Ok(v.clone());
        }

        let vertex = match self.instances.get(&obj_id) {
            Some(instance) => self.instance_vertex(ids, obj_id, instance)?,
            None => match self.classes.get(&obj_id) {
                Some(class) => Vertex::concrete(
                    ids,
                    obj_id,
                    format!("{}{}", CLASS_OBJECT_PREFIX, class.name),
                    0,
                    self.allocation_context(class.stack_trace_serial),
                )?,
                None => return Err(ResolveError::UnknownObject(obj_id)),
            },
        };

        let vertex = Rc::new(vertex);
        vertices.insert(obj_id, vertex.clone());
        Ok(vertex)
    }

    fn instance_vertex(
        &self,
        ids: &mut IdAllocator,
        obj_id: u64,
        instance: &Instance,
    ) -> Result<Vertex, ResolveError> {
        let context = self.allocation_context(instance.stack_trace_serial());

        match instance {
            Instance::Object {
                class_id, values, ..
            } => {
                let class = self
                    .classes
                    .get(class_id)
                    .ok_or(ResolveError::UnknownClass(*class_id))?;
                let layout = self.field_layout(*class_id)?;
                if layout.len() != values.len() {
                    return Err(ResolveError::FieldCountMismatch {
                        obj_id,
                        expected: layout.len(),
                        actual: values.len(),
                    });
                }

                let mut vertex = Vertex::concrete(
                    ids,
                    obj_id,
                    class.name.clone(),
                    u64::from(class.instance_size),
                    context,
                )?;
                for (field, value) in layout.iter().zip(values) {
                    if field.field_type != BasicType::Object {
                        vertex.add_field(self.string(field.name_id), value.to_string())?;
                    }
                }
                Ok(vertex)
            }
            Instance::ObjectArray {
                elem_class_id,
                elements,
                ..
            } => {
                let name = self
                    .class_name(*elem_class_id)
                    .ok_or(ResolveError::UnknownClass(*elem_class_id))?;
                Ok(Vertex::concrete(
                    ids,
                    obj_id,
                    name,
                    elements.len() as u64 * REFERENCE_SIZE,
                    context,
                )?)
            }
            Instance::PrimitiveArray {
                elem_type,
                elements,
                ..
            } => {
                let mut vertex = Vertex::concrete(
                    ids,
                    obj_id,
                    format!("{}[]", elem_type.name()),
                    elements.len() as u64 * elem_type.size_in_bytes(),
                    context,
                )?;
                for (idx, value) in elements.iter().enumerate() {
                    vertex.add_field(idx.to_string(), value.to_string())?;
                }
                Ok(vertex)
            }
        }
    }
}
