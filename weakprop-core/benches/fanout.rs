//! Benchmarks for property fan-out
//!
//! Run with: cargo bench -p weakprop-core --bench fanout

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use weakprop_core::prelude::*;

// =============================================================================
// set_value with live subscribers
// =============================================================================

fn bench_set_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("property/set_value");

    for subscribers in [1usize, 16, 256] {
        group.throughput(Throughput::Elements(subscribers as u64));

        let property = WeakProperty::with_mode(0u64, PropertyMode::empty());
        let total = Arc::new(AtomicU64::new(0));
        let observers: Vec<Arc<dyn Observer<u64>>> = (0..subscribers)
            .map(|_| {
                let total = total.clone();
                let observer: Arc<dyn Observer<u64>> =
                    Arc::new(CallbackObserver::new(move |v: u64| {
                        total.fetch_add(v, Ordering::Relaxed);
                    }));
                observer
            })
            .collect();
        let _subs: Vec<Subscription> = observers.iter().map(|o| property.subscribe(o)).collect();

        group.bench_with_input(
            BenchmarkId::new("fanout", subscribers),
            &property,
            |b, property| b.iter(|| property.set_value(black_box(1))),
        );
    }

    group.finish();
}

// =============================================================================
// set_value through the validation pipeline
// =============================================================================

fn bench_validated_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("property/validated_set");

    for validators in [1usize, 4, 16] {
        let property = WeakProperty::new(0i64);
        for _ in 0..validators {
            property.validate_with(|v: &i64| (*v < 0).then(|| "negative".to_string()));
        }

        let mut next = 0i64;
        group.bench_with_input(
            BenchmarkId::new("validators", validators),
            &property,
            |b, property| {
                b.iter(|| {
                    next = -next - 1;
                    property.set_value(black_box(next));
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_set_value, bench_validated_set);
criterion_main!(benches);
