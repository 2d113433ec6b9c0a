use std::{hint::black_box, io::Cursor};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use trackwire::codec::varint::{read_varint_u32, read_varint_u64, varint_size, write_varint_u32};

// По одному значению на каждую длину varint32.
const U32_CASES: [(&str, u32); 5] = [
    ("1_byte", 127),
    ("2_bytes", 16_383),
    ("3_bytes", 2_097_151),
    ("4_bytes", 268_435_455),
    ("5_bytes", u32::MAX),
];

fn encoding_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("varint_encode");

    for (name, value) in U32_CASES {
        group.bench_with_input(BenchmarkId::new("u32", name), &value, |b, &value| {
            let mut buf = Vec::with_capacity(5);
            b.iter(|| {
                buf.clear();
                write_varint_u32(black_box(&mut buf), black_box(value)).unwrap();
            });
        });
    }

    group.finish();
}

fn decoding_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("varint_decode");

    for (name, value) in U32_CASES {
        let mut encoded = Vec::new();
        write_varint_u32(&mut encoded, value).unwrap();
        group.bench_with_input(BenchmarkId::new("u32", name), &encoded, |b, buf| {
            b.iter(|| {
                let mut cursor = Cursor::new(black_box(buf));
                black_box(read_varint_u32(&mut cursor).unwrap());
            });
        });
    }

    group.finish();
}

fn size_calculation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("varint_size");

    for (name, value) in U32_CASES {
        group.bench_with_input(BenchmarkId::from_parameter(name), &value, |b, &value| {
            b.iter(|| black_box(varint_size(black_box(u64::from(value)))));
        });
    }

    group.finish();
}

/// Поток случайных u64: смесь коротких и длинных значений.
fn batch_benchmark(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(0x7261_6e64);
    let values: Vec<u64> = (0..10_000)
        .map(|_| {
            let bits = rng.gen_range(1..=64);
            rng.gen::<u64>() >> (64 - bits)
        })
        .collect();

    let mut encoded = Vec::new();
    for &v in &values {
        trackwire::codec::varint::write_varint_u64(&mut encoded, v).unwrap();
    }

    let mut group = c.benchmark_group("varint_batch");
    group.throughput(Throughput::Bytes(encoded.len() as u64));

    group.bench_function("encode_10k_u64", |b| {
        let mut buf = Vec::with_capacity(encoded.len());
        b.iter(|| {
            buf.clear();
            for &v in &values {
                trackwire::codec::varint::write_varint_u64(&mut buf, black_box(v)).unwrap();
            }
        });
    });

    group.bench_function("decode_10k_u64", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(&encoded));
            for _ in 0..values.len() {
                black_box(read_varint_u64(&mut cursor).unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    encoding_benchmark,
    decoding_benchmark,
    size_calculation_benchmark,
    batch_benchmark
);
criterion_main!(benches);
