//! Runtime benchmarks: dispatch lookup, perform/resume round trips, and
//! escalation across nested handlers.
//!
//! Run with: cargo bench --bench vm_core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use effrun_vm::{Effect, EffectIdentity, Handler};

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for depth in [1usize, 8, 32] {
        let root: Effect<(), ()> = Effect::named("root");
        let mut leaf = root.clone();
        for _ in 0..depth {
            leaf = leaf.derive();
        }
        let handler = Handler::<()>::new().on(&root, |k, ()| k.resume(()));
        let identity: EffectIdentity = leaf.identity().clone();

        group.bench_with_input(BenchmarkId::new("ancestor_depth", depth), &identity, |b, id| {
            b.iter(|| black_box(handler.handles(id)));
        });
    }

    group.finish();
}

fn bench_perform(c: &mut Criterion) {
    let mut group = c.benchmark_group("perform");
    group.sample_size(20);

    let ask: Effect<(), u64> = Effect::named("ask");
    let handler = Handler::<u64>::new().on(&ask, |k, ()| k.resume(1));

    for count in [1u64, 100] {
        group.bench_with_input(BenchmarkId::new("resume_round_trips", count), &count, |b, &n| {
            b.iter(|| {
                let performer = ask.clone();
                let total = handler
                    .run(move || (0..n).map(|_| performer.perform(())).sum::<u64>())
                    .unwrap();
                black_box(total)
            });
        });
    }

    group.bench_function("empty_run", |b| {
        let handler = Handler::<u64>::new();
        b.iter(|| black_box(handler.run(|| 7).unwrap()));
    });

    group.finish();
}

fn bench_escalation(c: &mut Criterion) {
    let mut group = c.benchmark_group("escalation");
    group.sample_size(20);

    let ask: Effect<(), u64> = Effect::named("ask");
    let outer = Handler::<u64>::new().on(&ask, |k, ()| k.resume(2));

    group.bench_function("through_one_layer", |b| {
        b.iter(|| {
            let performer = ask.clone();
            let inner = Handler::<u64>::new();
            let total = outer
                .run(move || {
                    inner
                        .run(move || performer.perform(()) + performer.perform(()))
                        .unwrap_or_default()
                })
                .unwrap();
            black_box(total)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_lookup, bench_perform, bench_escalation);
criterion_main!(benches);
