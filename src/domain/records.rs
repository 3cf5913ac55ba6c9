//! Snapshot Records
//!
//! The decoded record stream of a heap dump. A record stream is a sequence of
//! [`Record`]s, one snapshot ending at each [`Record::EndOfSnapshot`].
//! Records serialize with an internal `"record"` tag, one JSON object per line.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ports::RecordHandler;

/// Size in bytes of an object reference in the dumped heap.
pub const REFERENCE_SIZE: u64 = 4;

/// Primitive and reference field types, with their hprof type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BasicType {
    Object,
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl BasicType {
    pub fn from_hprof_code(code: u8) -> Option<BasicType> {
        match code {
            2 => Some(BasicType::Object),
            4 => Some(BasicType::Boolean),
            5 => Some(BasicType::Char),
            6 => Some(BasicType::Float),
            7 => Some(BasicType::Double),
            8 => Some(BasicType::Byte),
            9 => Some(BasicType::Short),
            10 => Some(BasicType::Int),
            11 => Some(BasicType::Long),
            _ => None,
        }
    }

    pub fn hprof_code(&self) -> u8 {
        match self {
            BasicType::Object => 2,
            BasicType::Boolean => 4,
            BasicType::Char => 5,
            BasicType::Float => 6,
            BasicType::Double => 7,
            BasicType::Byte => 8,
            BasicType::Short => 9,
            BasicType::Int => 10,
            BasicType::Long => 11,
        }
    }

    pub fn size_in_bytes(&self) -> u64 {
        match self {
            BasicType::Object => REFERENCE_SIZE,
            BasicType::Boolean | BasicType::Byte => 1,
            BasicType::Char | BasicType::Short => 2,
            BasicType::Float | BasicType::Int => 4,
            BasicType::Double | BasicType::Long => 8,
        }
    }

    /// Name as it appears in array type names, e.g. `int` in `int[]`.
    pub fn name(&self) -> &'static str {
        match self {
            BasicType::Object => "Object",
            BasicType::Boolean => "boolean",
            BasicType::Char => "char",
            BasicType::Float => "float",
            BasicType::Double => "double",
            BasicType::Byte => "byte",
            BasicType::Short => "short",
            BasicType::Int => "int",
            BasicType::Long => "long",
        }
    }
}

/// A typed field or array element value. `Object(0)` is the null reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Object(u64),
    Boolean(bool),
    Char(u16),
    Float(f32),
    Double(f64),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
}

impl Value {
    pub fn basic_type(&self) -> BasicType {
        match self {
            Value::Object(_) => BasicType::Object,
            Value::Boolean(_) => BasicType::Boolean,
            Value::Char(_) => BasicType::Char,
            Value::Float(_) => BasicType::Float,
            Value::Double(_) => BasicType::Double,
            Value::Byte(_) => BasicType::Byte,
            Value::Short(_) => BasicType::Short,
            Value::Int(_) => BasicType::Int,
            Value::Long(_) => BasicType::Long,
        }
    }

    /// The referenced object id, if this is a non-null reference.
    pub fn as_reference(&self) -> Option<u64> {
        match self {
            Value::Object(id) if *id != 0 => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Object(id) => write!(f, "{}", id),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Char(c) => {
                let ch = char::from_u32(u32::from(*c)).unwrap_or(char::REPLACEMENT_CHARACTER);
                write!(f, "{}", ch)
            }
            Value::Float(x) => write!(f, "{}", x),
            Value::Double(x) => write!(f, "{}", x),
            Value::Byte(x) => write!(f, "{}", x),
            Value::Short(x) => write!(f, "{}", x),
            Value::Int(x) => write!(f, "{}", x),
            Value::Long(x) => write!(f, "{}", x),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceField {
    pub name_id: u64,
    pub field_type: BasicType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticField {
    pub name_id: u64,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadClass {
    pub class_serial: u32,
    pub class_id: u64,
    pub stack_trace_serial: u32,
    pub name_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub frame_id: u64,
    pub method_name_id: u64,
    pub method_sig_id: u64,
    pub source_file_id: u64,
    pub class_serial: u32,
    /// Positive line number, or -1 unknown, -2 compiled, -3 native.
    pub line: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTrace {
    pub trace_serial: u32,
    pub thread_serial: u32,
    pub frame_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDump {
    pub class_id: u64,
    pub stack_trace_serial: u32,
    pub super_class_id: u64,
    pub instance_size: u32,
    #[serde(default)]
    pub static_fields: Vec<StaticField>,
    /// Declared instance fields of this class only, in dump order.
    #[serde(default)]
    pub instance_fields: Vec<InstanceField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDump {
    pub obj_id: u64,
    pub stack_trace_serial: u32,
    pub class_id: u64,
    /// Field values, most-derived class first, each class in dump order.
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectArrayDump {
    pub obj_id: u64,
    pub stack_trace_serial: u32,
    pub elem_class_id: u64,
    #[serde(default)]
    pub elements: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveArrayDump {
    pub obj_id: u64,
    pub stack_trace_serial: u32,
    pub elem_type: BasicType,
    #[serde(default)]
    pub elements: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    #[serde(rename = "string")]
    Utf8 { id: u64, text: String },
    LoadClass(LoadClass),
    StackFrame(StackFrame),
    StackTrace(StackTrace),
    RootUnknown { obj_id: u64 },
    RootJniGlobal { obj_id: u64, jni_global_ref_id: u64 },
    RootJniLocal { obj_id: u64, thread_serial: u32, frame_num: u32 },
    RootJavaFrame { obj_id: u64, thread_serial: u32, frame_num: u32 },
    RootNativeStack { obj_id: u64, thread_serial: u32 },
    RootStickyClass { obj_id: u64 },
    RootThreadBlock { obj_id: u64, thread_serial: u32 },
    RootMonitorUsed { obj_id: u64 },
    RootThreadObject { obj_id: u64, thread_serial: u32, stack_trace_serial: u32 },
    RootStatic { obj_id: u64, class_id: u64, field_name_id: u64 },
    ClassDump(ClassDump),
    InstanceDump(InstanceDump),
    ObjectArrayDump(ObjectArrayDump),
    PrimitiveArrayDump(PrimitiveArrayDump),
    EndOfSnapshot,
}

impl Record {
    /// Hand this record to the matching handler callback.
    pub fn dispatch(self, handler: &mut dyn RecordHandler) -> anyhow::Result<()> {
        match self {
            Record::Utf8 { id, text } => handler.string_in_utf8(id, text),
            Record::LoadClass(r) => handler.load_class(r),
            Record::StackFrame(r) => handler.stack_frame(r),
            Record::StackTrace(r) => handler.stack_trace(r),
            Record::RootUnknown { obj_id } => handler.root_unknown(obj_id),
            Record::RootJniGlobal { obj_id, jni_global_ref_id } => {
                handler.root_jni_global(obj_id, jni_global_ref_id)
            }
            Record::RootJniLocal { obj_id, thread_serial, frame_num } => {
                handler.root_jni_local(obj_id, thread_serial, frame_num)
            }
            Record::RootJavaFrame { obj_id, thread_serial, frame_num } => {
                handler.root_java_frame(obj_id, thread_serial, frame_num)
            }
            Record::RootNativeStack { obj_id, thread_serial } => {
                handler.root_native_stack(obj_id, thread_serial)
            }
            Record::RootStickyClass { obj_id } => handler.root_sticky_class(obj_id),
            Record::RootThreadBlock { obj_id, thread_serial } => {
                handler.root_thread_block(obj_id, thread_serial)
            }
            Record::RootMonitorUsed { obj_id } => handler.root_monitor_used(obj_id),
            Record::RootThreadObject { obj_id, thread_serial, stack_trace_serial } => {
                handler.root_thread_object(obj_id, thread_serial, stack_trace_serial)
            }
            Record::RootStatic { obj_id, class_id, field_name_id } => {
                handler.root_static(obj_id, class_id, field_name_id)
            }
            Record::ClassDump(r) => handler.class_dump(r),
            Record::InstanceDump(r) => handler.instance_dump(r),
            Record::ObjectArrayDump(r) => handler.object_array_dump(r),
            Record::PrimitiveArrayDump(r) => handler.primitive_array_dump(r),
            Record::EndOfSnapshot => handler.end_of_snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hprof_codes() {
        for code in [2u8, 4, 5, 6, 7, 8, 9, 10, 11] {
            let ty = BasicType::from_hprof_code(code).unwrap();
            assert_eq!(ty.hprof_code(), code);
        }
        assert_eq!(BasicType::from_hprof_code(3), None);
        assert_eq!(BasicType::Long.size_in_bytes(), 8);
        assert_eq!(BasicType::Char.size_in_bytes(), 2);
    }

    #[test]
    fn test_null_is_not_a_reference() {
        assert_eq!(Value::Object(0).as_reference(), None);
        assert_eq!(Value::Object(9).as_reference(), Some(9));
        assert_eq!(Value::Int(9).as_reference(), None);
    }

    #[test]
    fn test_char_display() {
        assert_eq!(Value::Char(u16::from(b'x')).to_string(), "x");
        assert_eq!(Value::Char(0xD800).to_string(), "\u{FFFD}");
    }

    #[test]
    fn test_parse_tagged_records() {
        let line = r#"{"record":"instance_dump","obj_id":5,"stack_trace_serial":1,"class_id":2,
            "values":[{"type":"object","value":7},{"type":"int","value":-3}]}"#;
        let record: Record = serde_json::from_str(line).unwrap();
        match record {
            Record::InstanceDump(dump) => {
                assert_eq!(dump.obj_id, 5);
                assert_eq!(dump.values, vec![Value::Object(7), Value::Int(-3)]);
            }
            other => panic!("unexpected record {:?}", other),
        }

        let end: Record = serde_json::from_str(r#"{"record":"end_of_snapshot"}"#).unwrap();
        assert_eq!(end, Record::EndOfSnapshot);

        let s: Record = serde_json::from_str(r#"{"record":"string","id":1,"text":"next"}"#).unwrap();
        assert_eq!(s, Record::Utf8 { id: 1, text: "next".into() });
    }
}
