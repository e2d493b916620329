//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stagechain::prelude::*;
use stagechain::testing::SharedSlots;

fn run_three_stages(n: usize, capacity: usize) -> Vec<usize> {
    let values = SharedSlots::<usize>::new(n);

    let double = {
        let values = values.clone();
        Stage::pooled("double", 2, capacity, move |i| {
            values.set(i, 2 * i);
            Ok(())
        })
        .unwrap()
    };
    let increment = {
        let values = values.clone();
        Stage::pooled("increment", 2, capacity, move |i| {
            values.update(i, |v| *v += 1);
            Ok(())
        })
        .unwrap()
    };
    let sink = Stage::pooled("sink", 2, capacity, |i| {
        black_box(i);
        Ok(())
    })
    .unwrap();

    chain(chain(&double, &increment).unwrap(), &sink).unwrap();
    for stage in [&double, &increment, &sink] {
        stage.set_task_count(n).unwrap();
    }
    for i in 0..n {
        double.push(i).unwrap();
    }
    sink.wait().unwrap();
    values.to_vec()
}

fn pipeline_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("three_stage_pipeline");
    for capacity in [1, 8, 64] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| b.iter(|| run_three_stages(black_box(1_000), capacity)),
        );
    }
    group.finish();
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
