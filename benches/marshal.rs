//! Marshaling benchmarks
//!
//! Compares the single-pass vector conversion with the per-element walk
//! used for multi-dimensional arrays, plus scalar and string conversion.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dispbridge::bridge::LocalCalendar;
use dispbridge::{ArrayBound, ArrayData, Bridge, DefaultHost, HostValue, SafeArray, Variant};

fn bridge() -> Bridge<DefaultHost<LocalCalendar<Utc>>> {
    Bridge::with_context(DefaultHost::with_calendar(LocalCalendar::new(Utc)))
}

fn bench_arrays(c: &mut Criterion) {
    let bridge = bridge();
    let mut group = c.benchmark_group("array_to_host");

    for size in [16usize, 256, 4096].iter() {
        let data: Vec<i32> = (0..*size as i32).collect();

        // One dimension (locked single pass)
        let vector = Variant::Array(SafeArray::vector(ArrayData::I4(data.clone())));
        group.bench_with_input(BenchmarkId::new("vector", size), &vector, |b, value| {
            b.iter(|| bridge.to_host(black_box(value)))
        });

        // Same elements as 2 x n/2 (index walk)
        let grid = SafeArray::new(
            ArrayData::I4(data),
            &[ArrayBound::new(2, 0), ArrayBound::new((*size / 2) as u32, 0)],
        )
        .map(Variant::Array);
        if let Ok(grid) = grid {
            group.bench_with_input(BenchmarkId::new("grid", size), &grid, |b, value| {
                b.iter(|| bridge.to_host(black_box(value)))
            });
        }
    }

    group.finish();
}

fn bench_scalars(c: &mut Criterion) {
    let bridge = bridge();
    let mut group = c.benchmark_group("scalar");

    group.bench_function("int_roundtrip", |b| {
        b.iter(|| {
            let variant = bridge.to_variant(black_box(&HostValue::Int32(42)));
            variant.and_then(|v| bridge.to_host(&v))
        })
    });

    let text = HostValue::string("The quick brown fox jumps over the lazy dög");
    group.bench_function("string_roundtrip", |b| {
        b.iter(|| {
            let variant = bridge.to_variant(black_box(&text));
            variant.and_then(|v| bridge.to_host(&v))
        })
    });

    group.bench_function("date_to_host", |b| {
        let date = bridge.to_variant(&HostValue::Date(1.7e12));
        b.iter(|| date.as_ref().map(|v| bridge.to_host(black_box(v))))
    });

    group.finish();
}

criterion_group!(benches, bench_arrays, bench_scalars);
criterion_main!(benches);
