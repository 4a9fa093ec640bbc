use std::hint::black_box;

use benches::INPUTS;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ppseq_driver::{dsl, sequence::Sequences};

fn parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("ppseq/dsl");

    INPUTS.iter().for_each(|&(name, input)| {
        group.bench_with_input(BenchmarkId::new("dsl::parse", name), input, |b, input| {
            b.iter(|| dsl::parse(black_box(input)).is_ok())
        });
        group.bench_with_input(
            BenchmarkId::new("dsl::canonicalize", name),
            input,
            |b, input| b.iter(|| dsl::canonicalize(black_box(input)).map(|s| s.len())),
        );
        group.bench_with_input(
            BenchmarkId::new("Sequences::parse", name),
            input,
            |b, input| b.iter(|| Sequences::parse(black_box(input)).len()),
        );
    });
    group.finish();
}

criterion_group!(benches, parse);
criterion_main!(benches);
