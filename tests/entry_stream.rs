//! Интеграционные тесты потока записей: кадрирование, чередование секций,
//! подавление имени типа и перекодирование.

use std::{collections::HashMap, sync::Arc};

use trackwire::{
    entry::{read_all, replay, EntryData, EntryDataReader},
    BinaryEntryReader, BinaryEntryWriter, EntityType, EntryReader, EntryWriter, FieldSpec, Model,
    RecordSnapshot, RecordState, SerializationMode, StatusCode, Value, ValueContext, ValueType,
};

/// Тип с ключом, одним обычным полем и тремя связями.
fn type_name_entity() -> Arc<EntityType> {
    Arc::new(
        EntityType::builder("TypeName")
            .key("Id", ValueType::I32)
            .field("Count", ValueType::I32)
            .relation("A")
            .relation("B")
            .relation("C")
            .build(),
    )
}

fn schema() -> HashMap<String, Arc<EntityType>> {
    let other = EntityType::builder("Other")
        .key("Key", ValueType::String)
        .field("Flag", ValueType::Bool)
        .build();
    HashMap::from([
        ("TypeName".to_owned(), type_name_entity()),
        ("Other".to_owned(), Arc::new(other)),
    ])
}

fn writer(buf: &mut Vec<u8>) -> BinaryEntryWriter<&mut Vec<u8>> {
    BinaryEntryWriter::new(buf, ValueContext::default())
}

#[test]
fn reference_entry_bytes() {
    let entity = type_name_entity();
    let mut buf = Vec::new();
    let mut w = writer(&mut buf);
    w.start_entry().unwrap();
    w.set_type(&entity).unwrap();
    w.set_state(RecordState::Added).unwrap();
    w.write_field(entity.field(0).unwrap(), &Value::I32(42)).unwrap();
    w.write_field(entity.field(1).unwrap(), &Value::I32(0)).unwrap();
    w.write_relation_loaded(entity.relation(2).unwrap()).unwrap();
    w.end_entry().unwrap();
    w.finish().unwrap();

    let mut expected = vec![0x84, 8];
    expected.extend_from_slice(b"TypeName");
    expected.extend_from_slice(&[4, 42, 9, 1, 2, 0b0000_0100, 0xFF]);
    assert_eq!(buf, expected);

    let schema = schema();
    let mut r = BinaryEntryReader::new(buf.as_slice(), ValueContext::default());
    let entries = read_all(&mut r, &schema).unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.state, RecordState::Added);
    assert_eq!(
        entry
            .fields
            .iter()
            .map(|(f, v)| (f.name.as_str(), v.clone()))
            .collect::<Vec<_>>(),
        vec![("Id", Value::I32(42)), ("Count", Value::I32(0))]
    );
    assert!(entry.modified_fields.is_empty());
    assert_eq!(entry.relations.len(), 1);
    assert_eq!(entry.relations[0].name, "C");
}

#[test]
fn type_name_written_only_on_change() {
    let schema = schema();
    let entity = schema["TypeName"].clone();
    let other = schema["Other"].clone();

    let mut buf = Vec::new();
    let mut w = writer(&mut buf);
    for (ty, state) in [
        (&entity, RecordState::Unchanged),
        (&entity, RecordState::Deleted),
        (&other, RecordState::Modified),
        (&entity, RecordState::Added),
    ] {
        w.start_entry().unwrap();
        w.set_type(ty).unwrap();
        w.set_state(state).unwrap();
        w.end_entry().unwrap();
    }
    w.finish().unwrap();

    let mut expected = vec![0x81, 8];
    expected.extend_from_slice(b"TypeName");
    expected.extend_from_slice(&[0, 0x02, 0, 0x83, 5]);
    expected.extend_from_slice(b"Other");
    expected.extend_from_slice(&[0, 0x84, 8]);
    expected.extend_from_slice(b"TypeName");
    expected.extend_from_slice(&[0, 0xFF]);
    assert_eq!(buf, expected);

    let mut r = BinaryEntryReader::new(buf.as_slice(), ValueContext::default());
    let decoded = read_all(&mut r, &schema).unwrap();
    let summary: Vec<_> = decoded
        .iter()
        .map(|e| (e.entity_type.name().to_owned(), e.state))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("TypeName".to_owned(), RecordState::Unchanged),
            ("TypeName".to_owned(), RecordState::Deleted),
            ("Other".to_owned(), RecordState::Modified),
            ("TypeName".to_owned(), RecordState::Added),
        ]
    );
}

#[test]
fn sections_interleave_and_demultiplex() {
    let schema = schema();
    let entity = schema["TypeName"].clone();
    let id = entity.field(0).unwrap();
    let count = entity.field(1).unwrap();

    let mut buf = Vec::new();
    let mut w = writer(&mut buf);
    w.start_entry().unwrap();
    w.set_type(&entity).unwrap();
    w.set_state(RecordState::Modified).unwrap();
    w.write_field(id, &Value::I32(1)).unwrap();
    w.write_modified_field(count, &Value::I32(10)).unwrap();
    w.write_field(count, &Value::I32(3)).unwrap();
    w.write_modified_field(id, &Value::I32(0)).unwrap();
    w.end_entry().unwrap();
    w.finish().unwrap();

    let mut r = BinaryEntryReader::new(buf.as_slice(), ValueContext::default());
    assert!(r.next_entry().unwrap());
    r.read_type(&schema).unwrap();
    assert_eq!(r.read_state().unwrap(), RecordState::Modified);

    // первым в потоке идёт поле основной секции
    assert!(r.read_modified_field().unwrap().is_none());
    assert_eq!(r.read_field().unwrap().unwrap().1, Value::I32(1));
    assert!(r.read_field().unwrap().is_none());
    assert_eq!(r.read_modified_field().unwrap().unwrap().1, Value::I32(10));
    assert_eq!(r.read_field().unwrap().unwrap().1, Value::I32(3));
    let (field, value) = r.read_modified_field().unwrap().unwrap();
    assert_eq!((field.name.as_str(), value), ("Id", Value::I32(0)));
    assert!(r.read_field().unwrap().is_none());
    assert!(r.read_modified_field().unwrap().is_none());
    assert!(r.read_relation().unwrap().is_none());
    assert!(!r.next_entry().unwrap());
}

#[test]
fn nullable_null_is_elided() {
    let entity = Arc::new(
        EntityType::builder("Row")
            .key("Id", ValueType::I32)
            .field("Maybe", ValueType::nullable(ValueType::I64))
            .build(),
    );
    let schema = HashMap::from([("Row".to_owned(), entity.clone())]);

    let mut buf = Vec::new();
    let mut w = writer(&mut buf);
    w.start_entry().unwrap();
    w.set_type(&entity).unwrap();
    w.set_state(RecordState::Added).unwrap();
    w.write_field(entity.field(0).unwrap(), &Value::I32(5)).unwrap();
    w.write_field(entity.field(1).unwrap(), &Value::Null).unwrap();
    w.write_modified_field(entity.field(1).unwrap(), &Value::I64(-1))
        .unwrap();
    w.end_entry().unwrap();
    w.finish().unwrap();

    let body = &buf[5..];
    assert_eq!(&body[..3], &[4, 5, 9]);
    // изменённое значение пишется через базовый тип, без флага присутствия
    assert_eq!(body[3], 10);
    let mut minus_one = vec![0xFF; 9];
    minus_one.push(0x01);
    assert_eq!(&body[4..14], minus_one.as_slice());

    let mut r = BinaryEntryReader::new(buf.as_slice(), ValueContext::default());
    let decoded = read_all(&mut r, &schema).unwrap();
    assert_eq!(decoded[0].fields[1].1, Value::Null);
    assert_eq!(decoded[0].modified_fields[0].1, Value::I64(-1));
}

#[test]
fn many_relations_use_wider_bitmap() {
    let mut builder = EntityType::builder("Wide").key("Id", ValueType::U8);
    for i in 0..10 {
        builder = builder.relation(format!("R{i:02}"));
    }
    let entity = Arc::new(builder.build());
    let schema = HashMap::from([("Wide".to_owned(), entity.clone())]);

    let mut buf = Vec::new();
    let mut w = writer(&mut buf);
    w.start_entry().unwrap();
    w.set_type(&entity).unwrap();
    w.set_state(RecordState::Unchanged).unwrap();
    w.write_relation_loaded(entity.relation(0).unwrap()).unwrap();
    w.write_relation_loaded(entity.relation(9).unwrap()).unwrap();
    w.end_entry().unwrap();
    w.finish().unwrap();

    assert_eq!(&buf[buf.len() - 5..], &[1, 3, 0b0000_0001, 0b0000_0010, 0xFF]);

    let mut r = BinaryEntryReader::new(buf.as_slice(), ValueContext::default());
    let decoded = read_all(&mut r, &schema).unwrap();
    let names: Vec<_> = decoded[0].relations.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["R00", "R09"]);
}

#[test]
fn snapshot_changes_roundtrip_through_binary() {
    let model = Model::from_json(
        r#"{
            "entities": [
                { "name": "Customer",
                  "fields": [
                    { "name": "Id", "type": "i32", "key": true },
                    { "name": "Email", "type": "string" },
                    { "name": "RowVersion", "type": "u64", "concurrency_token": true }
                  ],
                  "relations": ["Orders"] }
            ]
        }"#,
    )
    .unwrap();
    let customer = trackwire::Schema::entity_type(&model, "Customer").unwrap();

    let mut snapshot = RecordSnapshot::new(
        customer,
        RecordState::Modified,
        vec![Value::I32(7), Value::from("old@x"), Value::U64(3)],
        vec![Value::I32(7), Value::from("old@x"), Value::U64(3)],
        vec![false; 3],
        vec![true],
    )
    .unwrap();
    snapshot.set_current("Email", Value::from("new@x")).unwrap();

    let mut buf = Vec::new();
    let mut w = BinaryEntryWriter::new(&mut buf, model.value_context());
    trackwire::write_snapshot(&mut w, &snapshot, SerializationMode::Changes).unwrap();
    w.finish().unwrap();

    let mut r = BinaryEntryReader::new(buf.as_slice(), model.value_context());
    let decoded = read_all(&mut r, &model).unwrap();
    let data = decoded[0].to_data();
    assert_eq!(
        data.fields,
        vec![
            ("Id".to_owned(), Value::I32(7)),
            ("RowVersion".to_owned(), Value::U64(3))
        ]
    );
    assert_eq!(
        data.modified_fields,
        vec![("Email".to_owned(), Value::from("new@x"))]
    );
    assert!(data.loaded_relations.is_empty());
}

#[test]
fn replay_between_formats_is_lossless() {
    let schema = schema();
    let mut first = EntryData::new("Other", RecordState::Added);
    first.fields.push(("Key".into(), Value::from("k1")));
    first.fields.push(("Flag".into(), Value::Bool(true)));
    let mut second = EntryData::new("TypeName", RecordState::Modified);
    second.fields.push(("Id".into(), Value::I32(9)));
    second.modified_fields.push(("Count".into(), Value::I32(4)));
    second.loaded_relations.insert("A".into());
    second.loaded_relations.insert("B".into());
    let original = vec![first, second];

    let mut buf = Vec::new();
    let mut w = writer(&mut buf);
    let written = replay(&mut EntryDataReader::new(original.clone()), &mut w, &schema).unwrap();
    assert_eq!(written, 2);
    w.finish().unwrap();

    let mut r = BinaryEntryReader::new(buf.as_slice(), ValueContext::default());
    let back: Vec<EntryData> = read_all(&mut r, &schema)
        .unwrap()
        .iter()
        .map(|e| e.to_data())
        .collect();
    assert_eq!(back, original);
}

#[test]
fn eof_between_entries_is_clean_but_inside_is_error() {
    let schema = schema();
    let mut bytes = vec![0x81, 5];
    bytes.extend_from_slice(b"Other");
    bytes.push(0);
    // нет маркера конца потока
    let mut r = BinaryEntryReader::new(bytes.as_slice(), ValueContext::default());
    assert_eq!(read_all(&mut r, &schema).unwrap().len(), 1);

    let mut truncated = vec![0x81, 5];
    truncated.extend_from_slice(b"Oth");
    let mut r = BinaryEntryReader::new(truncated.as_slice(), ValueContext::default());
    let err = read_all(&mut r, &schema).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UnexpectedEof);
}

#[test]
fn corrupt_state_byte_is_rejected() {
    let mut r = BinaryEntryReader::new(&[0x07u8][..], ValueContext::default());
    let err = r.next_entry().unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvalidData);
}

#[test]
fn writer_rejects_out_of_order_calls() {
    let entity = type_name_entity();
    let mut buf = Vec::new();
    let mut w = writer(&mut buf);
    w.start_entry().unwrap();
    w.set_type(&entity).unwrap();
    let err = w
        .write_field(entity.field(0).unwrap(), &Value::I32(1))
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::ProtocolError);
}

#[test]
fn key_fields_and_bitmap_width() {
    let entity = Arc::new(
        EntityType::builder("Audit")
            .with_field(FieldSpec::new("Id", ValueType::I64).key())
            .field("Note", ValueType::String)
            .build(),
    );
    assert_eq!(entity.key_fields().count(), 1);
    assert_eq!(entity.relation_bitmap_len(), 0);
}
