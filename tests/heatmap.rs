pub mod test_utils;

use chrono::Utc;
use crowdtrail_core::{
    config::{Config, CrowdConfig, HeatmapConfig},
    coordinate::Coordinate,
    heatmap::HeatmapAggregator,
    main_db::MainDb,
    storage::{Position, Session, Storage},
};
use rand::{rngs::StdRng, SeedableRng};
use test_utils::walk;

fn aggregator() -> HeatmapAggregator {
    HeatmapAggregator::from_config(&Config::default())
}

#[test]
fn plain_empty() {
    assert!(aggregator().aggregate_plain(&[]).is_empty());
    let mut rng = StdRng::seed_from_u64(0);
    assert!(aggregator()
        .aggregate_with_crowd(&[], true, &mut rng)
        .is_empty());
}

#[test]
fn plain_identical_positions() {
    let now = Utc::now();
    let positions: Vec<Position> = (0..7)
        .map(|_| Position::new(Coordinate::new(31.2304, 121.4737), now, 1))
        .collect();
    let points = aggregator().aggregate_plain(&positions);
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].intensity, 1.0);
    assert_eq!(points[0].coordinate, Coordinate::new(31.2304, 121.4737));
}

#[test]
fn plain_merges_nearby_positions() {
    let now = Utc::now();
    // 3m apart, same 4-decimal cell
    let positions = vec![
        Position::new(Coordinate::new(31.23041, 121.47371), now, 1),
        Position::new(Coordinate::new(31.23043, 121.47372), now, 1),
        Position::new(Coordinate::new(31.3, 121.5), now, 1),
    ];
    let points = aggregator().aggregate_plain(&positions);
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].coordinate, Coordinate::new(31.2304, 121.4737));
    // min(1, 2/3 * 10) and min(1, 1/3 * 10)
    assert_eq!(points[0].intensity, 1.0);
    assert_eq!(points[1].intensity, 1.0);

    // a single outlier among 100 gets 0.1
    let mut positions = walk(1, Coordinate::new(10.0, 10.0), now);
    positions.extend((0..99).map(|_| Position::new(Coordinate::new(20.0, 20.0), now, 1)));
    let points = aggregator().aggregate_plain(&positions);
    assert_eq!(points.len(), 2);
    assert!((points[0].intensity - 0.1).abs() < 1e-12);
    assert_eq!(points[1].intensity, 1.0);
}

#[test]
fn crowd_output_is_bounded() {
    let mut rng = StdRng::seed_from_u64(9);
    for n in [10, 100, 1000] {
        let positions = walk(n, Coordinate::new(31.2304, 121.4737), Utc::now());
        let points = aggregator().aggregate_with_crowd(&positions, true, &mut rng);
        assert!(!points.is_empty());
        assert!(points.len() <= 150, "{} inputs gave {} points", n, points.len());
        // at most 30 positions with at most 4 points each
        assert!(points.len() <= 30 * 4);
        for point in &points {
            assert!((0.0..=1.0).contains(&point.intensity));
        }
    }
}

#[test]
fn crowd_output_ceiling_truncates_batches() {
    let aggregator = HeatmapAggregator::new(
        HeatmapConfig {
            max_output_points: 5,
            ..Default::default()
        },
        CrowdConfig {
            default_density: 4,
            ..Default::default()
        },
    );
    let mut rng = StdRng::seed_from_u64(10);
    // far apart so synthetic points of different positions never share a cell
    let positions: Vec<Position> = (0..10)
        .map(|i| Position::new(Coordinate::new(i as f64, 0.0), Utc::now(), 1))
        .collect();
    let points = aggregator.aggregate_with_crowd(&positions, true, &mut rng);
    assert!(points.len() <= 5);
    // the first position contributes all 4 of its points, the second only 1
    assert!(points.iter().all(|p| p.coordinate.latitude.abs() < 1.5));
    assert!(points.iter().any(|p| p.coordinate.latitude > 0.5));
}

#[test]
fn crowd_only_uses_most_recent_positions() {
    let now = Utc::now();
    // 40 old positions near (0, 0), then 30 new ones near (50, 50)
    let mut positions = walk(40, Coordinate::new(0.0, 0.0), now - chrono::Duration::hours(1));
    positions.extend(walk(30, Coordinate::new(50.0, 50.0), now));
    let mut rng = StdRng::seed_from_u64(3);
    let points = aggregator().aggregate_with_crowd(&positions, true, &mut rng);
    assert!(!points.is_empty());
    assert!(points.iter().all(|p| p.coordinate.latitude > 49.0));
}

#[test]
fn crowd_averages_intensity_per_cell() {
    // a tiny radius keeps every synthetic point in the cell of its position
    let aggregator = HeatmapAggregator::new(
        HeatmapConfig::default(),
        CrowdConfig {
            default_radius_meters: 0.01,
            ..Default::default()
        },
    );
    let now = Utc::now();
    let positions = vec![
        Position::new(Coordinate::new(10.0, 10.0), now, 1),
        Position::new(Coordinate::new(20.0, 20.0), now, 1),
    ];
    let mut rng = StdRng::seed_from_u64(77);
    let points = aggregator.aggregate_with_crowd(&positions, true, &mut rng);
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].coordinate, Coordinate::new(10.0, 10.0));
    assert_eq!(points[1].coordinate, Coordinate::new(20.0, 20.0));
    for point in points {
        // an average of values in [0.5, 1.0], not a sum
        assert!((0.5..=1.0).contains(&point.intensity));
    }
}

#[test]
fn crowd_disabled_is_plain() {
    let now = Utc::now();
    let mut positions = walk(50, Coordinate::new(31.2304, 121.4737), now);
    positions.extend(walk(20, Coordinate::new(31.2304, 121.4737), now));
    let mut rng = StdRng::seed_from_u64(4);
    let aggregator = aggregator();
    assert_eq!(
        aggregator.aggregate_with_crowd(&positions, false, &mut rng),
        aggregator.aggregate_plain(&positions)
    );
}

#[tokio::test]
async fn scoped_by_session() {
    let main_db = MainDb::open_in_memory().unwrap();
    let now = Utc::now();
    let origin = Coordinate::new(0.0, 0.0);
    let first = main_db
        .create_session(&Session::start(origin, origin, now))
        .await
        .unwrap();
    let second = main_db
        .create_session(&Session::start(origin, origin, now))
        .await
        .unwrap();
    for (session_id, coordinate) in [
        (first, Coordinate::new(1.0, 1.0)),
        (first, Coordinate::new(1.0, 1.0)),
        (second, Coordinate::new(2.0, 2.0)),
    ] {
        main_db
            .save_location(&Position::new(coordinate, now, session_id))
            .await
            .unwrap();
    }

    let aggregator = aggregator();
    let mut rng = StdRng::seed_from_u64(0);
    let all = aggregator
        .compute(&main_db, None, false, &mut rng)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let only_second = aggregator
        .compute(&main_db, Some(second), false, &mut rng)
        .await
        .unwrap();
    assert_eq!(only_second.len(), 1);
    assert_eq!(only_second[0].coordinate, Coordinate::new(2.0, 2.0));
    assert_eq!(only_second[0].intensity, 1.0);
}
