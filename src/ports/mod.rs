use std::path::Path;

use anyhow::{Context, Result};

use crate::api::dto::GraphDto;
use crate::domain::ids::IdAllocator;
use crate::domain::records::{
    ClassDump, InstanceDump, LoadClass, ObjectArrayDump, PrimitiveArrayDump, StackFrame,
    StackTrace,
};
use crate::domain::vertex::HeapGraph;

/// Receives the records of a snapshot stream in order.
///
/// Every callback defaults to ignoring its record, so a handler only
/// implements what it consumes.
pub trait RecordHandler {
    fn string_in_utf8(&mut self, _id: u64, _text: String) -> Result<()> {
        Ok(())
    }

    fn load_class(&mut self, _record: LoadClass) -> Result<()> {
        Ok(())
    }

    fn stack_frame(&mut self, _record: StackFrame) -> Result<()> {
        Ok(())
    }

    fn stack_trace(&mut self, _record: StackTrace) -> Result<()> {
        Ok(())
    }

    fn root_unknown(&mut self, _obj_id: u64) -> Result<()> {
        Ok(())
    }

    fn root_jni_global(&mut self, _obj_id: u64, _jni_global_ref_id: u64) -> Result<()> {
        Ok(())
    }

    fn root_jni_local(&mut self, _obj_id: u64, _thread_serial: u32, _frame_num: u32) -> Result<()> {
        Ok(())
    }

    fn root_java_frame(&mut self, _obj_id: u64, _thread_serial: u32, _frame_num: u32) -> Result<()> {
        Ok(())
    }

    fn root_native_stack(&mut self, _obj_id: u64, _thread_serial: u32) -> Result<()> {
        Ok(())
    }

    fn root_sticky_class(&mut self, _obj_id: u64) -> Result<()> {
        Ok(())
    }

    fn root_thread_block(&mut self, _obj_id: u64, _thread_serial: u32) -> Result<()> {
        Ok(())
    }

    fn root_monitor_used(&mut self, _obj_id: u64) -> Result<()> {
        Ok(())
    }

    fn root_thread_object(
        &mut self,
        _obj_id: u64,
        _thread_serial: u32,
        _stack_trace_serial: u32,
    ) -> Result<()> {
        Ok(())
    }

    fn root_static(&mut self, _obj_id: u64, _class_id: u64, _field_name_id: u64) -> Result<()> {
        Ok(())
    }

    fn class_dump(&mut self, _record: ClassDump) -> Result<()> {
        Ok(())
    }

    fn instance_dump(&mut self, _record: InstanceDump) -> Result<()> {
        Ok(())
    }

    fn object_array_dump(&mut self, _record: ObjectArrayDump) -> Result<()> {
        Ok(())
    }

    fn primitive_array_dump(&mut self, _record: PrimitiveArrayDump) -> Result<()> {
        Ok(())
    }

    fn end_of_snapshot(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A graph coarsening strategy. Consumes the graph and returns the summary;
/// fresh vertex ids come from `ids`.
pub trait Summarizer {
    fn name(&self) -> &'static str;
    fn summarize(&self, graph: HeapGraph, ids: &mut IdAllocator) -> Result<HeapGraph>;
}

pub trait GraphExporter {
    /// File extension of the rendered output, without the dot.
    fn extension(&self) -> &'static str;

    fn render(&self, graph: &GraphDto) -> Result<String>;

    fn export(&self, graph: &GraphDto, path: &Path) -> Result<()> {
        let content = self.render(graph)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write graph to {}", path.display()))
    }
}
