use anyhow::Result;
use serde_json::{json, Value};

use crate::heatmap::HeatmapPoint;
use crate::storage::Position;

/// Anything that can draw the heatmap and the traveled path, e.g. a map
/// widget. Platform specific drawing lives in the implementations.
pub trait HeatmapRenderer {
    fn render(&mut self, heatmap: &[HeatmapPoint], path: &[Position]) -> Result<()>;
}

/// Renders into a GeoJSON `FeatureCollection`, which most web map libraries
/// can display as a circle layer plus a line layer.
pub struct GeoJsonRenderer {
    pub min_radius_meters: f64,
    pub max_radius_meters: f64,
    output: Option<Value>,
}

impl Default for GeoJsonRenderer {
    fn default() -> Self {
        GeoJsonRenderer {
            min_radius_meters: 5.0,
            max_radius_meters: 25.0,
            output: None,
        }
    }
}

impl GeoJsonRenderer {
    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    fn radius(&self, intensity: f64) -> f64 {
        self.min_radius_meters + (self.max_radius_meters - self.min_radius_meters) * intensity
    }
}

impl HeatmapRenderer for GeoJsonRenderer {
    fn render(&mut self, heatmap: &[HeatmapPoint], path: &[Position]) -> Result<()> {
        // GeoJSON is [lng, lat]
        let mut features: Vec<Value> = heatmap
            .iter()
            .map(|point| {
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        "coordinates": [point.coordinate.longitude, point.coordinate.latitude],
                    },
                    "properties": {
                        "intensity": point.intensity,
                        "radius_m": self.radius(point.intensity),
                    },
                })
            })
            .collect();

        if path.len() >= 2 {
            let coordinates: Vec<[f64; 2]> = path
                .iter()
                .map(|p| [p.coordinate.longitude, p.coordinate.latitude])
                .collect();
            features.push(json!({
                "type": "Feature",
                "geometry": {
                    "type": "LineString",
                    "coordinates": coordinates,
                },
                "properties": {
                    "session_id": path[path.len() - 1].session_id,
                },
            }));
        }

        self.output = Some(json!({
            "type": "FeatureCollection",
            "features": features,
        }));
        Ok(())
    }
}
