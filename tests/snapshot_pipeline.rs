/// End-to-end Pipeline Tests
/// Writes a record stream to disk, replays it through the snapshot pipeline
/// and inspects the exported graphs.

use heapsketch::api::dto::{EdgeSelection, GraphDto};
use heapsketch::application::{PipelineOptions, SnapshotPipeline};
use heapsketch::domain::blacklist::Blacklist;
use heapsketch::domain::heap_builder::HeapGraphBuilder;
use heapsketch::domain::records::{
    BasicType, ClassDump, InstanceDump, InstanceField, LoadClass, ObjectArrayDump,
    PrimitiveArrayDump, Record, StackFrame, StackTrace, StaticField, Value,
};
use heapsketch::domain::strategy::Strategy;
use heapsketch::infrastructure::graphml_exporter::GraphMlExporter;
use heapsketch::infrastructure::json_exporter::JsonExporter;
use heapsketch::infrastructure::record_stream::replay_file;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const ENTRY_CLASS: u64 = 0x100;
const LIST_CLASS: u64 = 0x101;
const STRING_CLASS: u64 = 0x102;

fn runtime_records() -> Vec<Record> {
    let strings = [
        (1, "Entry"),
        (2, "next"),
        (3, "value"),
        (4, "hash"),
        (5, "LinkedList"),
        (6, "head"),
        (7, "java.lang.String"),
        (8, "add"),
        (9, "LinkedList.java"),
        (10, "EMPTY"),
    ];
    let mut records: Vec<Record> = strings
        .iter()
        .map(|(id, text)| Record::Utf8 { id: *id, text: text.to_string() })
        .collect();

    for (serial, class_id, name_id) in [(1, ENTRY_CLASS, 1), (2, LIST_CLASS, 5), (3, STRING_CLASS, 7)] {
        records.push(Record::LoadClass(LoadClass {
            class_serial: serial,
            class_id,
            stack_trace_serial: 0,
            name_id,
        }));
    }
    records.push(Record::StackFrame(StackFrame {
        frame_id: 50,
        method_name_id: 8,
        method_sig_id: 0,
        source_file_id: 9,
        class_serial: 2,
        line: 120,
    }));
    records.push(Record::StackTrace(StackTrace {
        trace_serial: 9,
        thread_serial: 1,
        frame_ids: vec![50],
    }));
    records
}

fn class_dumps(empty_static: u64) -> Vec<Record> {
    vec![
        Record::ClassDump(ClassDump {
            class_id: ENTRY_CLASS,
            stack_trace_serial: 0,
            super_class_id: 0,
            instance_size: 16,
            static_fields: vec![],
            instance_fields: vec![
                InstanceField { name_id: 2, field_type: BasicType::Object },
                InstanceField { name_id: 3, field_type: BasicType::Object },
                InstanceField { name_id: 4, field_type: BasicType::Int },
            ],
        }),
        Record::ClassDump(ClassDump {
            class_id: LIST_CLASS,
            stack_trace_serial: 0,
            super_class_id: 0,
            instance_size: 8,
            static_fields: vec![StaticField { name_id: 10, value: Value::Object(empty_static) }],
            instance_fields: vec![InstanceField { name_id: 6, field_type: BasicType::Object }],
        }),
        Record::ClassDump(ClassDump {
            class_id: STRING_CLASS,
            stack_trace_serial: 0,
            super_class_id: 0,
            instance_size: 12,
            static_fields: vec![],
            instance_fields: vec![InstanceField { name_id: 3, field_type: BasicType::Object }],
        }),
    ]
}

/// A list object holding `len` entries, each pointing at its own string.
/// Ids: list 1000, entries 2000+i, strings 3000+i, char arrays 4000+i.
fn list_heap(len: u64) -> Vec<Record> {
    let mut records = vec![Record::InstanceDump(InstanceDump {
        obj_id: 1000,
        stack_trace_serial: 0,
        class_id: LIST_CLASS,
        values: vec![Value::Object(if len > 0 { 2000 } else { 0 })],
    })];
    for i in 0..len {
        let next = if i + 1 < len { 2000 + i + 1 } else { 0 };
        records.push(Record::InstanceDump(InstanceDump {
            obj_id: 2000 + i,
            stack_trace_serial: 9,
            class_id: ENTRY_CLASS,
            values: vec![Value::Object(next), Value::Object(3000 + i), Value::Int(i as i32)],
        }));
        records.push(Record::InstanceDump(InstanceDump {
            obj_id: 3000 + i,
            stack_trace_serial: 0,
            class_id: STRING_CLASS,
            values: vec![Value::Object(4000 + i)],
        }));
        records.push(Record::PrimitiveArrayDump(PrimitiveArrayDump {
            obj_id: 4000 + i,
            stack_trace_serial: 0,
            elem_type: BasicType::Char,
            elements: vec![Value::Char(u16::from(b'a')), Value::Char(u16::from(b'<'))],
        }));
    }
    records.push(Record::RootJavaFrame { obj_id: 1000, thread_serial: 1, frame_num: 0 });
    records
}

fn write_stream(path: &Path, records: &[Record]) {
    let lines: Vec<String> = records
        .iter()
        .map(|r| serde_json::to_string(r).unwrap())
        .collect();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn read_graph(path: &Path) -> GraphDto {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn options(dir: &Path, summarize: bool) -> PipelineOptions {
    PipelineOptions {
        summarize,
        ownership_edges: false,
        edge_selection: EdgeSelection::Pointer,
        output_dir: dir.to_path_buf(),
    }
}

#[test]
fn test_two_snapshots_are_exported_separately() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("heap.jsonl");

    let mut records = runtime_records();
    records.extend(class_dumps(0));
    records.extend(list_heap(4));
    records.push(Record::EndOfSnapshot);
    records.extend(list_heap(2));
    records.push(Record::EndOfSnapshot);
    write_stream(&input, &records);

    let strategy = Strategy::Identity;
    let builder = HeapGraphBuilder::new(Blacklist::new()).with_seed(Some(4));
    let mut pipeline = SnapshotPipeline::new(builder, &strategy, &JsonExporter, options(dir.path(), true));
    let handled = replay_file(&input, &mut pipeline).unwrap();
    assert_eq!(handled, records.len());
    assert!(!pipeline.has_pending());

    let outputs = pipeline.outputs().to_vec();
    assert_eq!(outputs.len(), 2);
    assert!(outputs[0].ends_with("heap_0.json"));
    assert!(outputs[1].ends_with("heap_1.json"));

    // root + list + 4 * (entry, string, char[])
    let first = read_graph(&outputs[0]);
    assert_eq!(first.nodes.len(), 14);
    let second = read_graph(&outputs[1]);
    assert_eq!(second.nodes.len(), 8);

    let entry = first.nodes.iter().find(|n| n.id == 2000).unwrap();
    assert_eq!(entry.rep_type, "Entry");
    assert_eq!(entry.alloc_context.as_deref(), Some("LinkedList.add(LinkedList.java:120)"));
    assert_eq!(entry.fields.as_ref().unwrap()["hash"], "0");

    let chars = first.nodes.iter().find(|n| n.id == 4000).unwrap();
    assert_eq!(chars.rep_type, "char[]");
    assert_eq!(chars.size, 4);

    let root_edge = first.edges.iter().find(|e| e.source == 0).unwrap();
    assert_eq!(root_edge.target, 1000);
    assert_eq!(root_edge.label.as_deref(), Some("rootJavaFrame-1-0"));
}

#[test]
fn test_backbone_summary_of_linked_list() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("heap.jsonl");

    let mut records = runtime_records();
    records.extend(class_dumps(0));
    records.extend(list_heap(6));
    records.push(Record::EndOfSnapshot);
    write_stream(&input, &records);

    let strategy = Strategy::BackbonePredecessorType;
    let builder = HeapGraphBuilder::new(Blacklist::new()).with_seed(Some(4));
    let mut pipeline = SnapshotPipeline::new(builder, &strategy, &JsonExporter, options(dir.path(), true));
    replay_file(&input, &mut pipeline).unwrap();

    let graph = read_graph(&pipeline.outputs()[0]);
    // root, list, Entry backbone, Strings, char[]s
    assert_eq!(graph.nodes.len(), 5);
    let entries = graph.nodes.iter().find(|n| n.rep_type == "Entry").unwrap();
    assert_eq!(entries.count, 6);
    assert_eq!(entries.size, 6 * 16);
    assert!(entries.fields.is_none());
    assert!(graph.edges.iter().all(|e| e.label.is_none() || e.source == 0));
}

#[test]
fn test_blacklisted_roots_and_static_roots() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("heap.jsonl");

    let mut records = runtime_records();
    // LinkedList.EMPTY points at entry 2001.
    records.extend(class_dumps(2001));
    records.extend(list_heap(3));
    records.push(Record::EndOfSnapshot);
    write_stream(&input, &records);

    let blacklist: Blacklist = "Java_stack, LinkedList\n".parse().unwrap();
    let strategy = Strategy::Identity;
    let builder = HeapGraphBuilder::new(blacklist).with_seed(Some(4));
    let mut pipeline = SnapshotPipeline::new(builder, &strategy, &JsonExporter, options(dir.path(), false));
    replay_file(&input, &mut pipeline).unwrap();

    let graph = read_graph(&pipeline.outputs()[0]);
    let root_edges: Vec<_> = graph.edges.iter().filter(|e| e.source == 0).collect();
    assert_eq!(root_edges.len(), 1);
    assert_eq!(root_edges[0].target, 2001);
    assert_eq!(root_edges[0].label.as_deref(), Some("LinkedList.EMPTY"));
    // The list object and entry 2000 are only reachable from the dropped stack root.
    assert!(graph.nodes.iter().all(|n| n.id != 1000 && n.id != 2000));
    assert_eq!(graph.nodes.len(), 1 + 2 * 3);
}

#[test]
fn test_graphml_with_ownership_edges() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("heap.jsonl");

    let mut records = runtime_records();
    records.extend(class_dumps(0));
    records.extend(list_heap(2));
    records.push(Record::ObjectArrayDump(ObjectArrayDump {
        obj_id: 5000,
        stack_trace_serial: 0,
        elem_class_id: STRING_CLASS,
        elements: vec![3000, 3001],
    }));
    records.push(Record::RootJavaFrame { obj_id: 5000, thread_serial: 2, frame_num: 1 });
    records.push(Record::EndOfSnapshot);
    write_stream(&input, &records);

    let strategy = Strategy::Identity;
    let builder = HeapGraphBuilder::new(Blacklist::new()).with_seed(Some(4));
    let opts = PipelineOptions {
        summarize: false,
        ownership_edges: true,
        edge_selection: EdgeSelection::Both,
        output_dir: dir.path().to_path_buf(),
    };
    let mut pipeline = SnapshotPipeline::new(builder, &strategy, &GraphMlExporter, opts);
    replay_file(&input, &mut pipeline).unwrap();

    let path = &pipeline.outputs()[0];
    assert!(path.ends_with("heap_0.graphml"));
    let xml = fs::read_to_string(path).unwrap();
    assert!(xml.contains("<node id=\"5000\">"));
    assert!(xml.contains("<data key=\"members\">0:1:a1:1:&lt;</data>"));
    // Strings are reachable from both the array and the entries, so the root owns them.
    assert!(xml.contains("<edge source=\"0\" target=\"3000\">"));
    assert!(xml.contains("<data key=\"ownership\">true</data>"));
}

#[test]
fn test_unfinished_snapshot_is_pending() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("heap.jsonl");

    let mut records = runtime_records();
    records.extend(class_dumps(0));
    records.extend(list_heap(1));
    write_stream(&input, &records);

    let strategy = Strategy::default();
    let builder = HeapGraphBuilder::new(Blacklist::new());
    let mut pipeline = SnapshotPipeline::new(builder, &strategy, &JsonExporter, options(dir.path(), true));
    replay_file(&input, &mut pipeline).unwrap();
    assert!(pipeline.outputs().is_empty());
    assert!(pipeline.has_pending());
}

#[test]
fn test_malformed_stream_fails() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("heap.jsonl");
    fs::write(&input, "{\"record\":\"end_of_snapshot\"}\nnot json\n").unwrap();

    let strategy = Strategy::Identity;
    let builder = HeapGraphBuilder::new(Blacklist::new());
    let mut pipeline = SnapshotPipeline::new(builder, &strategy, &JsonExporter, options(dir.path(), true));
    let err = replay_file(&input, &mut pipeline).unwrap_err();
    assert!(format!("{:#}", err).contains("line 2"));
}
