use std::hint::black_box;

use benches::{setup, INPUTS};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ppseq_driver::{compiler::Compiler, packet::PacketView, sequence::Sequences};

fn describe(c: &mut Criterion) {
    let mut group = c.benchmark_group("ppseq/compiler/describe");
    let (calibration, channels, registers) = setup();
    let compiler = Compiler::new(&calibration, &channels, &registers);

    INPUTS.iter().for_each(|&(name, input)| {
        group.bench_with_input(
            BenchmarkId::new("Compiler::describe", name),
            &Sequences::parse(input),
            |b, sequences| {
                b.iter(|| {
                    sequences
                        .iter()
                        .map(|s| compiler.describe(black_box(s)).id)
                        .count()
                })
            },
        );
    });
    group.finish();
}

fn encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("ppseq/compiler/encode");
    let (calibration, channels, registers) = setup();
    let compiler = Compiler::new(&calibration, &channels, &registers);

    INPUTS.iter().for_each(|&(name, input)| {
        group.bench_with_input(
            BenchmarkId::new("Compiler::encode", name),
            &Sequences::parse(input).with_acquiring(true),
            |b, sequences| {
                b.iter(|| {
                    sequences
                        .iter()
                        .filter_map(|s| compiler.encode(black_box(s)).ok())
                        .map(|(_, bytes)| bytes.len())
                        .sum::<usize>()
                })
            },
        );
    });
    group.finish();
}

fn decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("ppseq/packet/decode");
    let (calibration, channels, registers) = setup();
    let compiler = Compiler::new(&calibration, &channels, &registers);

    INPUTS.iter().for_each(|&(name, input)| {
        let sequences = Sequences::parse(input).with_acquiring(true);
        let packets = sequences
            .iter()
            .filter_map(|s| compiler.encode(s).ok())
            .map(|(_, bytes)| bytes)
            .collect::<Vec<_>>();
        group.bench_with_input(
            BenchmarkId::new("PacketView::ticks", name),
            &packets,
            |b, packets| {
                b.iter(|| {
                    packets
                        .iter()
                        .filter_map(|p| PacketView::parse(black_box(p)).ok())
                        .map(|view| view.ticks().filter(Result::is_ok).count())
                        .sum::<usize>()
                })
            },
        );
    });
    group.finish();
}

criterion_group!(benches, describe, encode, decode);
criterion_main!(benches);
