//! Criterion benchmarks for arpa-core DSP primitives
//!
//! Run with: cargo bench -p arpa-core
#![allow(missing_docs)]

use arpa_core::{DampedComb, SeriesAllpass, resonant_lowpass_sections, saturate_i16};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

const SAMPLE_RATE: f32 = 32000.0;
const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

fn generate_test_signal(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
        })
        .collect()
}

fn bench_lowpass_design(c: &mut Criterion) {
    let mut group = c.benchmark_group("LowpassDesign");

    group.bench_function("single_pair", |b| {
        b.iter(|| {
            black_box(resonant_lowpass_sections(
                black_box(1000.0),
                black_box(2.0),
                black_box(SAMPLE_RATE),
            ))
        });
    });

    // Full table sweep, the shape of an engine cold start
    group.bench_function("table_4096", |b| {
        b.iter(|| {
            for cutoff_step in 0..128u32 {
                for resonance_step in 0..32u32 {
                    let cutoff = 100.0 * (cutoff_step as f32 / 127.0 * 7.0).exp2();
                    let q = 0.707 * 1.12f32.powi(resonance_step as i32);
                    black_box(resonant_lowpass_sections(cutoff, q, SAMPLE_RATE));
                }
            }
        });
    });

    group.finish();
}

fn bench_comb(c: &mut Criterion) {
    let mut group = c.benchmark_group("DampedComb");

    for &block_size in BLOCK_SIZES {
        let input = generate_test_signal(block_size);

        group.bench_with_input(
            BenchmarkId::new("process", block_size),
            &block_size,
            |b, _| {
                let mut comb = DampedComb::new(1100);
                comb.set_feedback(0.84);
                comb.set_damp(0.2);
                b.iter(|| {
                    for &sample in &input {
                        black_box(comb.process(black_box(sample)));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_allpass(c: &mut Criterion) {
    let mut group = c.benchmark_group("SeriesAllpass");

    for &block_size in BLOCK_SIZES {
        let input = generate_test_signal(block_size);

        group.bench_with_input(
            BenchmarkId::new("process", block_size),
            &block_size,
            |b, _| {
                let mut allpass = SeriesAllpass::new(556);
                allpass.set_gain(0.5);
                b.iter(|| {
                    for &sample in &input {
                        black_box(allpass.process(black_box(sample)));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_saturate(c: &mut Criterion) {
    let mut group = c.benchmark_group("saturate_i16");

    let samples: Vec<i32> = (0..1024).map(|i| (i - 512) * 128).collect();

    group.bench_function("block_1024", |b| {
        b.iter(|| {
            for &s in &samples {
                black_box(saturate_i16(black_box(s)));
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_lowpass_design,
    bench_comb,
    bench_allpass,
    bench_saturate
);
criterion_main!(benches);
