use criterion::*;
use std::hint::black_box;

use lockstep::Dispatcher;

mod common;
use common::*;

fn dispatch_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    group.bench_function("relax_1k_2t", |b| {
        let mut d = Dispatcher::<Relax, WORK_SMALL, 2>::new();
        b.iter(|| {
            d.run().unwrap();
            black_box(d.shared().energy.get());
        });
    });

    group.bench_function("relax_16k_4t", |b| {
        let mut d = Dispatcher::<Relax, WORK_MED, 4>::new();
        b.iter(|| {
            d.run().unwrap();
            black_box(d.shared().energy.get());
        });
    });

    group.bench_function("relax_16k_8t", |b| {
        let mut d = Dispatcher::<Relax, WORK_MED, 8>::new();
        b.iter(|| {
            d.run().unwrap();
            black_box(d.shared().energy.get());
        });
    });

    group.finish();
}

criterion_group!(benches, dispatch_benchmark);
criterion_main!(benches);
