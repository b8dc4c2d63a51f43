use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, SeedableRng};

use crowdtrail_core::{
    config::Config, coordinate::Coordinate, heatmap::HeatmapAggregator, storage::Position,
};

fn positions(n: usize) -> Vec<Position> {
    let start = Utc::now();
    (0..n)
        .map(|i| {
            Position::new(
                Coordinate::new(31.2304 + (i % 500) as f64 * 0.00005, 121.4737),
                start + Duration::seconds(i as i64),
                1,
            )
        })
        .collect()
}

fn heatmap(c: &mut Criterion) {
    let aggregator = HeatmapAggregator::from_config(&Config::default());
    let positions = positions(10_000);

    c.bench_function("aggregate_plain", |b| {
        b.iter(|| std::hint::black_box(aggregator.aggregate_plain(&positions)));
    });

    c.bench_function("aggregate_with_crowd", |b| {
        let mut rng = StdRng::seed_from_u64(0);
        b.iter(|| std::hint::black_box(aggregator.aggregate_with_crowd(&positions, true, &mut rng)));
    });
}

criterion_group!(benches, heatmap);
criterion_main!(benches);
