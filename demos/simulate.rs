use crowdtrail_core::config::{Config, TrackingConfig};
use crowdtrail_core::coordinate::Coordinate;
use crowdtrail_core::heatmap::HeatmapAggregator;
use crowdtrail_core::main_db::MainDb;
use crowdtrail_core::route::StraightLineRoute;
use crowdtrail_core::storage::Storage;
use crowdtrail_core::tracking::{MovementSimulator, TrackingEvent};
use std::sync::Arc;
use std::time::Duration;

// People's Square -> The Bund
const ORIGIN: Coordinate = Coordinate {
    latitude: 31.2304,
    longitude: 121.4737,
};
const DESTINATION: Coordinate = Coordinate {
    latitude: 31.2397,
    longitude: 121.4998,
};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_module_path(false)
        .init();

    let config = Config {
        tracking: TrackingConfig {
            tick_interval_ms: 200,
        },
        ..Default::default()
    };
    let storage = Arc::new(MainDb::open_in_memory()?);
    let (mut simulator, mut events) = MovementSimulator::new(
        storage.clone(),
        Arc::new(StraightLineRoute::default()),
        config.tracking.clone(),
    );

    if !simulator.start_tracking(ORIGIN, DESTINATION).await {
        if let Some(TrackingEvent::Error(message)) = events.recv().await {
            println!("failed to start: {}", message);
        }
        return Ok(());
    }

    let aggregator = HeatmapAggregator::from_config(&config);
    let mut rng = rand::rng();
    let deadline = tokio::time::sleep(Duration::from_secs(6));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Some(TrackingEvent::PositionUpdated(position)) => {
                    let positions = storage.get_all_locations().await?;
                    let plain = aggregator.aggregate_plain(&positions);
                    let crowd = aggregator.aggregate_with_crowd(&positions, true, &mut rng);
                    println!(
                        "({:.5}, {:.5})  positions={} plain_points={} crowd_points={}",
                        position.coordinate.latitude,
                        position.coordinate.longitude,
                        positions.len(),
                        plain.len(),
                        crowd.len()
                    );
                }
                Some(TrackingEvent::Error(message)) => println!("error: {}", message),
                None => break,
            },
        }
    }

    simulator.stop_tracking().await;
    println!("sessions: {:?}", storage.get_all_sessions().await?);
    Ok(())
}
