use rand::Rng;
use std::f64::consts::PI;

use crate::config::CrowdConfig;
use crate::coordinate::{Coordinate, EARTH_RADIUS};
use crate::error::Result;
use crate::heatmap::HeatmapPoint;

// `cos(lat)` goes to zero at the poles and the east offset would blow up, so
// we never divide by anything smaller than this (~89.4 degrees).
const MIN_COS_LATITUDE: f64 = 0.01;

const MIN_INTENSITY: f64 = 0.5;
const MAX_INTENSITY: f64 = 1.0;

/// Scatter `density` synthetic points around `center`, uniformly over a disk
/// of `radius_meters`. `density` is clamped into the configured range and a
/// non positive radius falls back to the configured default.
pub fn generate_crowd_points<R: Rng + ?Sized>(
    center: &Coordinate,
    density: i32,
    radius_meters: f64,
    config: &CrowdConfig,
    rng: &mut R,
) -> Result<Vec<HeatmapPoint>> {
    center.validate()?;
    let density = config.clamp_density(density);
    let radius_meters = config.effective_radius(radius_meters);

    let lat_rad = center.latitude.to_radians();
    let cos_lat = lat_rad.cos().max(MIN_COS_LATITUDE);

    let points = (0..density)
        .map(|_| {
            let angle = rng.random::<f64>() * 2.0 * PI;
            // sqrt makes the density uniform over the area instead of the
            // radius, otherwise points pile up in the middle.
            let distance = rng.random::<f64>().sqrt() * radius_meters;
            let dx = distance * angle.cos();
            let dy = distance * angle.sin();

            let d_lat = dy / EARTH_RADIUS * (180.0 / PI);
            let d_lng = dx / (EARTH_RADIUS * cos_lat) * (180.0 / PI);

            let intensity = rng.random_range(MIN_INTENSITY..=MAX_INTENSITY);
            HeatmapPoint::new(
                Coordinate::new(
                    (center.latitude + d_lat).clamp(-90.0, 90.0),
                    wrap_longitude(center.longitude + d_lng),
                ),
                intensity,
            )
        })
        .collect();
    Ok(points)
}

fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..=180.0).contains(&longitude) {
        longitude
    } else {
        (longitude + 180.0).rem_euclid(360.0) - 180.0
    }
}
