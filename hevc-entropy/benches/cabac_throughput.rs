//! CABAC engine and residual coding benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hevc_entropy::syntax::{encode_residual, ResidualOptions};
use hevc_entropy::{
    ctx, BinEncoder, BitCountingCoder, BitEmittingCoder, Bitstream, Component, ContextTable,
    EntropyConfig, ScanOrder,
};

const BINS: usize = 64 * 1024;

fn bin_pattern() -> Vec<(u32, usize)> {
    (0..BINS)
        .map(|i| (((i * 31) % 7 == 0) as u32, ctx::SIG_COEFF + i % 42))
        .collect()
}

fn bench_context_bins(c: &mut Criterion) {
    let pattern = bin_pattern();
    let mut group = c.benchmark_group("context_bins");
    group.throughput(Throughput::Elements(BINS as u64));

    group.bench_function("emit", |b| {
        b.iter(|| {
            let mut coder = BitEmittingCoder::new(Bitstream::new(1 << 20));
            coder.init(0, 32);
            for &(bin, ctx_idx) in &pattern {
                coder.encode_bin(bin, ctx_idx).unwrap();
            }
            coder.encode_terminate(1).unwrap();
            black_box(coder.bitstream().offset())
        })
    });

    group.bench_function("count", |b| {
        b.iter(|| {
            let mut coder = BitCountingCoder::new(ContextTable::initial(0, 32));
            for &(bin, ctx_idx) in &pattern {
                coder.encode_bin(bin, ctx_idx).unwrap();
            }
            black_box(coder.rounded_bits())
        })
    });

    group.finish();
}

fn bench_bypass_bins(c: &mut Criterion) {
    let mut group = c.benchmark_group("bypass_bins");
    group.throughput(Throughput::Elements(BINS as u64));

    group.bench_function("emit_batched", |b| {
        b.iter(|| {
            let mut coder = BitEmittingCoder::new(Bitstream::new(1 << 20));
            coder.init(0, 32);
            for i in 0..BINS / 16 {
                coder.encode_bypass_bins(black_box(i as u32 * 0x9E37), 16).unwrap();
            }
            coder.encode_terminate(1).unwrap();
            black_box(coder.bitstream().offset())
        })
    });

    group.finish();
}

fn bench_residual(c: &mut Criterion) {
    let config = EntropyConfig::new(1920, 1080);
    let mut group = c.benchmark_group("residual");

    for log2 in [2u8, 3, 4, 5] {
        let n = 1usize << (2 * log2);
        let coeffs: Vec<i16> = (0..n)
            .map(|i| if i < n / 4 { ((i * 13) % 9) as i16 - 4 } else { 0 })
            .collect();
        let opts = ResidualOptions::new(log2, Component::Luma, ScanOrder::Diagonal);

        group.bench_with_input(BenchmarkId::new("count", 1 << log2), &coeffs, |b, coeffs| {
            let init = ContextTable::initial(0, 32);
            let mut coder = BitCountingCoder::new(init);
            b.iter(|| {
                coder.reset_from(&init);
                encode_residual(&mut coder, &config, black_box(coeffs), &opts).unwrap();
                black_box(coder.rounded_bits())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_context_bins, bench_bypass_bins, bench_residual);
criterion_main!(benches);
