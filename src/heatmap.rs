use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{Config, CrowdConfig, HeatmapConfig};
use crate::coordinate::Coordinate;
use crate::crowd;
use crate::error::{Error, Result};
use crate::storage::{Position, SessionId, Storage};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPoint {
    pub coordinate: Coordinate,
    // always within [0, 1]
    pub intensity: f64,
}

impl HeatmapPoint {
    pub fn new(coordinate: Coordinate, intensity: f64) -> Self {
        let intensity = if intensity.is_nan() {
            0.0
        } else {
            intensity.clamp(0.0, 1.0)
        };
        HeatmapPoint {
            coordinate,
            intensity,
        }
    }
}

type GridKey = (i64, i64);

fn grid_key(coordinate: &Coordinate, precision: u32) -> GridKey {
    let scale = 10f64.powi(precision as i32);
    (
        (coordinate.latitude * scale).round() as i64,
        (coordinate.longitude * scale).round() as i64,
    )
}

fn grid_coordinate(key: GridKey, precision: u32) -> Coordinate {
    let scale = 10f64.powi(precision as i32);
    Coordinate::new(key.0 as f64 / scale, key.1 as f64 / scale)
}

// Groups keep the order in which their cell was first seen so the output is
// stable for a given input.
fn group_by_grid<'a, T: 'a>(
    items: impl Iterator<Item = &'a T>,
    precision: u32,
    coordinate_of: impl Fn(&T) -> &Coordinate,
) -> Vec<(GridKey, Vec<&'a T>)> {
    let mut index: HashMap<GridKey, usize> = HashMap::new();
    let mut groups: Vec<(GridKey, Vec<&T>)> = Vec::new();
    for item in items {
        let key = grid_key(coordinate_of(item), precision);
        match index.get(&key) {
            Some(&i) => groups[i].1.push(item),
            None => {
                index.insert(key, groups.len());
                groups.push((key, vec![item]));
            }
        }
    }
    groups
}

pub struct HeatmapAggregator {
    heatmap: HeatmapConfig,
    crowd: CrowdConfig,
}

impl HeatmapAggregator {
    pub fn new(heatmap: HeatmapConfig, crowd: CrowdConfig) -> Self {
        HeatmapAggregator { heatmap, crowd }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.heatmap.clone(), config.crowd.clone())
    }

    /// One point per ~11m grid cell. The density ratio is amplified 10x and
    /// saturates at 1.0, raw ratios are usually too small to tell apart on
    /// the map.
    pub fn aggregate_plain(&self, positions: &[Position]) -> Vec<HeatmapPoint> {
        if positions.is_empty() {
            return Vec::new();
        }
        let total = positions.len() as f64;
        group_by_grid(positions.iter(), self.heatmap.plain_precision, |p| {
            &p.coordinate
        })
        .into_iter()
        .map(|(key, group)| {
            let intensity = f64::min(1.0, (group.len() as f64 / total) * 10.0);
            HeatmapPoint::new(grid_coordinate(key, self.heatmap.plain_precision), intensity)
        })
        .collect()
    }

    /// With `crowd_enabled`, every recent position is inflated into a few
    /// synthetic points around it before grouping on a finer grid. The number
    /// of synthetic points never exceeds `max_output_points`.
    pub fn aggregate_with_crowd<R: Rng + ?Sized>(
        &self,
        positions: &[Position],
        crowd_enabled: bool,
        rng: &mut R,
    ) -> Vec<HeatmapPoint> {
        if !crowd_enabled {
            return self.aggregate_plain(positions);
        }

        let max_points = self.heatmap.max_output_points;
        let mut crowd_points: Vec<HeatmapPoint> = Vec::new();
        for position in self.most_recent(positions) {
            if crowd_points.len() >= max_points {
                break;
            }
            let batch = match crowd::generate_crowd_points(
                &position.coordinate,
                self.crowd.default_density,
                self.crowd.default_radius_meters,
                &self.crowd,
                rng,
            ) {
                Ok(batch) => batch,
                Err(error) => {
                    warn!(
                        "[heatmap] crowd generation failed for {:?}, using fallback point: {}",
                        position.coordinate,
                        error.log_message()
                    );
                    vec![HeatmapPoint::new(
                        position.coordinate,
                        self.heatmap.fallback_intensity,
                    )]
                }
            };
            let room = max_points - crowd_points.len();
            crowd_points.extend(batch.into_iter().take(room));
        }

        group_by_grid(crowd_points.iter(), self.heatmap.crowd_precision, |p| {
            &p.coordinate
        })
        .into_iter()
        .map(|(key, group)| {
            // average, not sum: a cluster should not saturate right away
            let intensity =
                group.iter().map(|p| p.intensity).sum::<f64>() / group.len() as f64;
            HeatmapPoint::new(grid_coordinate(key, self.heatmap.crowd_precision), intensity)
        })
        .collect()
    }

    // The newest `max_input_positions` positions, kept in input order.
    fn most_recent<'a>(&self, positions: &'a [Position]) -> Vec<&'a Position> {
        if positions.len() <= self.heatmap.max_input_positions {
            return positions.iter().collect();
        }
        positions
            .iter()
            .enumerate()
            .sorted_by(|(_, a), (_, b)| b.timestamp.cmp(&a.timestamp))
            .take(self.heatmap.max_input_positions)
            .map(|(i, _)| i)
            .sorted()
            .map(|i| &positions[i])
            .collect()
    }

    pub async fn compute<R: Rng + ?Sized>(
        &self,
        storage: &dyn Storage,
        scope: Option<SessionId>,
        crowd_enabled: bool,
        rng: &mut R,
    ) -> Result<Vec<HeatmapPoint>> {
        let positions = load_positions(storage, scope).await?;
        Ok(self.aggregate_with_crowd(&positions, crowd_enabled, rng))
    }
}

/// All stored positions, or only the ones of one session.
pub async fn load_positions(
    storage: &dyn Storage,
    scope: Option<SessionId>,
) -> Result<Vec<Position>> {
    let result = match scope {
        None => storage.get_all_locations().await,
        Some(session_id) => storage.get_locations_by_session(session_id).await,
    };
    result.map_err(|e| Error::storage("Failed to load positions", e))
}
