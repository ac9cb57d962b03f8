//! Benchmarks for the Rayo wire codec

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rayo_test::{HostileGenerator, HostileKind};
use rayo_wire::{decode_seed, encode_seed, ChatMessage};

fn bench_seed_encode(c: &mut Criterion) {
    c.bench_function("seed_encode", |b| {
        b.iter(|| encode_seed(black_box(-1_234_567_890)))
    });
}

fn bench_seed_decode(c: &mut Criterion) {
    let bytes = encode_seed(i64::MIN);

    c.bench_function("seed_decode", |b| {
        b.iter(|| decode_seed(black_box(&bytes)))
    });
}

fn bench_text_roundtrip(c: &mut Criterion) {
    let message = ChatMessage::from("Checking in");

    c.bench_function("text_roundtrip", |b| {
        b.iter(|| {
            let bytes = message.encode().unwrap();
            let parsed = ChatMessage::decode(black_box(&bytes)).unwrap();
            black_box(parsed)
        })
    });
}

fn bench_reject_malformed(c: &mut Criterion) {
    let mut generator = HostileGenerator::new(42);
    let payloads: Vec<Vec<u8>> = HostileKind::ALL
        .iter()
        .filter(|kind| **kind != HostileKind::Oversized)
        .map(|kind| generator.payload(*kind))
        .collect();

    c.bench_function("reject_malformed", |b| {
        b.iter(|| {
            for payload in &payloads {
                black_box(ChatMessage::decode(black_box(payload)).is_err());
            }
        })
    });
}

criterion_group!(
    benches,
    bench_seed_encode,
    bench_seed_decode,
    bench_text_roundtrip,
    bench_reject_malformed
);
criterion_main!(benches);
