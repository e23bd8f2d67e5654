//! Tracking cycle benchmarks
//!
//! One full cycle must fit comfortably inside the 200 ms period on the tag.
//!
//! Run with: cargo bench -p uwbtrack-core --bench cycle

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use uwbtrack_core::{
    linalg::{invert, SquareMatrix},
    trilaterate, AnchorSet, CycleController, EstimatorConfig, RangeEkf, RangeSample, TrackerConfig,
};

fn samples_at(x: f32, y: f32) -> [RangeSample; 4] {
    let ranges = AnchorSet::default().ranges_from(x, y);
    core::array::from_fn(|i| RangeSample::new(i, Some(ranges[i])))
}

/// Complete cycle: smoothing, predict, gated update
fn bench_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle");

    for anchors in [3usize, 4] {
        let mut samples = samples_at(0.85, 3.15);
        if anchors == 3 {
            samples[3].distance = None;
        }

        group.bench_with_input(BenchmarkId::new("step_samples", anchors), &samples, |b, samples| {
            let mut tracker = CycleController::new(TrackerConfig::default()).unwrap();
            let mut now = 0;
            b.iter(|| {
                now += 200;
                black_box(tracker.step_samples(black_box(samples), now))
            })
        });
    }

    group.finish();
}

fn bench_components(c: &mut Criterion) {
    let anchors = AnchorSet::default();
    let ranges = anchors.ranges_from(0.85, 3.15).map(Some);

    c.bench_function("trilaterate_4", |b| {
        b.iter(|| trilaterate(black_box(&anchors), black_box(&ranges), 3))
    });

    c.bench_function("ekf_predict_update", |b| {
        let mut ekf = RangeEkf::new(anchors, EstimatorConfig::default());
        b.iter(|| {
            ekf.predict();
            black_box(ekf.update(black_box(&ranges), &[0.2; 4]))
        })
    });

    let m: SquareMatrix<4> = [
        [4.0, 1.0, 0.5, 0.0],
        [1.0, 3.0, 0.0, 0.2],
        [0.5, 0.0, 2.0, 0.1],
        [0.0, 0.2, 0.1, 1.0],
    ];
    c.bench_function("invert_4x4", |b| {
        let mut inv = [[0.0; 4]; 4];
        b.iter(|| invert(black_box(&m), &mut inv))
    });
}

criterion_group!(benches, bench_cycle, bench_components);
criterion_main!(benches);
