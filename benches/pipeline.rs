use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use hotword::features::FeatureExtractor;
use hotword::net::builder::build_model;
use hotword::{HOP_SIZE, NUM_MEL_FILTERS, SAMPLE_RATE, WINDOW_SIZE};

fn benchmark_feature_extraction(c: &mut Criterion) {
    let extractor = FeatureExtractor::new(SAMPLE_RATE, WINDOW_SIZE, HOP_SIZE, NUM_MEL_FILTERS);
    let clip: Vec<f32> = (0..SAMPLE_RATE)
        .map(|i| (i as f32 / SAMPLE_RATE as f32 * 440.0 * std::f32::consts::TAU).sin() * 0.5)
        .collect();

    c.bench_function("extract_1s_clip", |b| {
        b.iter(|| extractor.extract(&clip).unwrap())
    });
}

fn benchmark_forward_pass(c: &mut Criterion) {
    let extractor = FeatureExtractor::new(SAMPLE_RATE, WINDOW_SIZE, HOP_SIZE, NUM_MEL_FILTERS);
    let clip: Vec<f32> = (0..SAMPLE_RATE)
        .map(|i| (i as f32 / SAMPLE_RATE as f32 * 440.0 * std::f32::consts::TAU).sin() * 0.5)
        .collect();
    let features = extractor.extract(&clip).unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let mut model = build_model(&[], &extractor.output_shape(SAMPLE_RATE), &mut rng).unwrap();

    c.bench_function("dense_forward_1s_features", |b| {
        b.iter(|| model.forward(&features).unwrap())
    });
}

criterion_group!(benches, benchmark_feature_extraction, benchmark_forward_pass);
criterion_main!(benches);
