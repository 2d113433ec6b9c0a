#![no_main]

use std::{collections::HashMap, sync::Arc};

use libfuzzer_sys::fuzz_target;
use trackwire::{
    read_all, replay, BinaryEntryReader, BinaryEntryWriter, EntityType, EntryDataReader,
    EntryDataWriter, ValueContext, ValueType,
};

fn schema() -> HashMap<String, Arc<EntityType>> {
    let types = [
        EntityType::builder("Order")
            .key("Id", ValueType::I64)
            .field("Note", ValueType::String)
            .field("Qty", ValueType::U32)
            .relation("Customer")
            .relation("Lines")
            .build(),
        EntityType::builder("Tag")
            .key("Name", ValueType::String)
            .field("Weight", ValueType::nullable(ValueType::F64))
            .build(),
    ];
    types
        .into_iter()
        .map(|t| (t.name().to_owned(), Arc::new(t)))
        .collect()
}

fuzz_target!(|data: &[u8]| {
    let schema = schema();

    let mut reader = BinaryEntryReader::new(data, ValueContext::default());
    let mut collected = EntryDataWriter::new();
    if replay(&mut reader, &mut collected, &schema).is_err() {
        return;
    }

    // Всё, что удалось прочитать, переписывается в бинарный поток без потерь.
    let entries = collected.into_entries();
    let mut writer = BinaryEntryWriter::new(Vec::new(), ValueContext::default());
    replay(
        &mut EntryDataReader::new(entries.clone()),
        &mut writer,
        &schema,
    )
    .expect("decoded entries must encode");
    let bytes = writer.finish().expect("finish");

    let mut reader = BinaryEntryReader::new(bytes.as_slice(), ValueContext::default());
    let decoded = read_all(&mut reader, &schema).expect("re-encoded stream must decode");
    assert_eq!(decoded.len(), entries.len());
});
