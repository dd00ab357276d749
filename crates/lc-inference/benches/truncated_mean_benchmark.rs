use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use lc_hist::{Axis, BinnedDistribution, SparseHistogram};
use lc_inference::{
    ProfileConfig, TruncatedMeanConfig, UncertaintyMethod, iterative_truncated_mean, profile_dynamic,
};
use rand::{Rng, SeedableRng};
use std::hint::black_box;

fn landau_like(n_bins: usize, entries: usize, seed: u64) -> BinnedDistribution {
    let mut d = BinnedDistribution::uniform(n_bins, 0.0, 10.0).unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    for _ in 0..entries {
        let u: f64 = rng.random();
        let v: f64 = rng.random();
        d.fill(2.0 + u + 6.0 * v.powi(5));
    }
    d
}

fn bench_truncated_mean(c: &mut Criterion) {
    let mut group = c.benchmark_group("truncated_mean/n_bins");
    for n_bins in [50usize, 200, 1000] {
        let d = landau_like(n_bins, 20_000, 42);
        for (name, uncertainty) in
            [("bootstrap", UncertaintyMethod::Bootstrap), ("std_err", UncertaintyMethod::StandardError)]
        {
            let cfg = TruncatedMeanConfig { uncertainty, ..Default::default() };
            group.bench_with_input(BenchmarkId::new(name, n_bins), &d, |b, d| {
                b.iter(|| {
                    let r = iterative_truncated_mean(black_box(d), black_box(&cfg)).unwrap();
                    black_box(r.value);
                });
            });
        }
    }
    group.finish();
}

fn bench_profile_dynamic(c: &mut Criterion) {
    let mut h = SparseHistogram::new(vec![
        Axis::new(100, 0.0, 100.0).unwrap(),
        Axis::new(200, 0.0, 10.0).unwrap(),
        Axis::new(18, 0.0, 180.0).unwrap(),
    ])
    .unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    for _ in 0..200_000 {
        let x: f64 = 100.0 * rng.random::<f64>();
        let q: f64 = 2.0 + rng.random::<f64>() + 6.0 * rng.random::<f64>().powi(5);
        let a: f64 = 180.0 * rng.random::<f64>();
        h.fill(&[x, q, a]).unwrap();
    }
    let cfg = ProfileConfig { min_counts: 5000.0, ..Default::default() };
    c.bench_function("profile_dynamic/200k_hits", |b| {
        b.iter(|| {
            let r = profile_dynamic(black_box(&mut h), 0, 1, &cfg).unwrap();
            black_box(r.curve.len());
        });
    });
}

criterion_group!(benches, bench_truncated_mean, bench_profile_dynamic);
criterion_main!(benches);
