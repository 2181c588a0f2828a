//! Performance benchmarks for the JSON-lines service codec.
//!
//! Input events are the hot path: every key press on the display is fanned
//! out to each subscriber as one frame.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use braillink_core::{DisplayProperties, InputEvent, KeyBinding};
use braillink_protocol::{ClientCodec, ServerCodec, ServiceEvent};
use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tokio_util::codec::{Decoder, Encoder};

fn input_event() -> ServiceEvent {
    ServiceEvent::Input {
        event: InputEvent::from_packed(0x0012_0021),
    }
}

fn connected_event() -> ServiceEvent {
    let key_bindings = (0..64)
        .map(|i| KeyBinding::new(i, ["Dot1", "Dot4", "Space"]))
        .collect();
    ServiceEvent::connected(DisplayProperties {
        text_cells: 40,
        status_cells: 0,
        key_bindings,
        friendly_key_names: [
            ("Dot1".to_string(), "Dot 1".to_string()),
            ("Dot4".to_string(), "Dot 4".to_string()),
            ("Space".to_string(), "Space".to_string()),
        ]
        .into(),
    })
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    for (name, event) in [("input", input_event()), ("connected", connected_event())] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &event, |b, event| {
            b.iter(|| {
                let mut codec = ServerCodec::new();
                let mut buffer = BytesMut::new();
                codec.encode(black_box(event.clone()), &mut buffer).unwrap();
                black_box(buffer);
            });
        });
    }

    group.finish();
}

fn bench_decode_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_batch");

    for count in [10usize, 100, 1000] {
        let mut encoded = BytesMut::new();
        let mut encoder = ServerCodec::new();
        for _ in 0..count {
            encoder.encode(input_event(), &mut encoded).unwrap();
        }

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &encoded, |b, encoded| {
            b.iter(|| {
                let mut codec = ClientCodec::new();
                let mut buffer = encoded.clone();
                let mut decoded = 0;
                while let Some(event) = codec.decode(&mut buffer).unwrap() {
                    black_box(event);
                    decoded += 1;
                }
                assert_eq!(decoded, count);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode_batch);
criterion_main!(benches);
