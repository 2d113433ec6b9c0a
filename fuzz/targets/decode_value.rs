#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use trackwire::{
    codec::value::{deserialize_value, serialize_value},
    CodecLimits, CompositeDescriptor, TypeRegistry, ValueContext, ValueType,
};

/// Тип, под который читаются байты.
#[derive(Debug, Arbitrary)]
enum FuzzType {
    Bool,
    I32,
    U64,
    F64,
    Decimal,
    Char,
    String,
    Bytes,
    NullableI16,
    Node,
    Point,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    ty: FuzzType,
    max_depth: u8,
    data: Vec<u8>,
}

impl From<&FuzzType> for ValueType {
    fn from(ty: &FuzzType) -> Self {
        match ty {
            FuzzType::Bool => ValueType::Bool,
            FuzzType::I32 => ValueType::I32,
            FuzzType::U64 => ValueType::U64,
            FuzzType::F64 => ValueType::F64,
            FuzzType::Decimal => ValueType::Decimal,
            FuzzType::Char => ValueType::Char,
            FuzzType::String => ValueType::String,
            FuzzType::Bytes => ValueType::array(ValueType::U8),
            FuzzType::NullableI16 => ValueType::nullable(ValueType::I16),
            FuzzType::Node => ValueType::composite("Node"),
            FuzzType::Point => ValueType::composite("Point"),
        }
    }
}

fn registry() -> Arc<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    registry
        .register(
            CompositeDescriptor::class("Node")
                .field("Label", ValueType::String)
                .field("Weights", ValueType::array(ValueType::F32))
                .field("Next", ValueType::composite("Node")),
        )
        .expect("Node registers");
    registry
        .register(
            CompositeDescriptor::structure("Point")
                .field("X", ValueType::I32)
                .field("Y", ValueType::I32),
        )
        .expect("Point registers");
    Arc::new(registry)
}

fuzz_target!(|input: FuzzInput| {
    let limits = CodecLimits {
        max_string_bytes: 4096,
        max_array_len: 4096,
        max_depth: usize::from(input.max_depth),
        ..CodecLimits::default()
    };
    let ctx = ValueContext::new(registry()).with_limits(limits);
    let ty = ValueType::from(&input.ty);

    // Декодер не должен паниковать ни на каких данных.
    let Ok(value) = deserialize_value(&ty, &input.data, &ctx) else {
        return;
    };

    // Прочитанное значение кодируется обратно и читается тем же.
    let bytes = serialize_value(&ty, &value, &ctx).expect("decoded value must encode");
    let again = deserialize_value(&ty, &bytes, &ctx).expect("re-encoded value must decode");
    assert!(
        value.is_identical(&again),
        "roundtrip mismatch for {ty}: {value:?} vs {again:?}"
    );
});
