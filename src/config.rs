use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    // 0 means tick as fast as possible, only useful in tests.
    pub tick_interval_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            tick_interval_ms: 2000,
        }
    }
}

impl TrackingConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrowdConfig {
    pub min_density: i32,
    pub max_density: i32,
    pub default_density: i32,
    pub default_radius_meters: f64,
}

impl Default for CrowdConfig {
    fn default() -> Self {
        CrowdConfig {
            min_density: 2,
            max_density: 4,
            default_density: 3,
            default_radius_meters: 50.0,
        }
    }
}

impl CrowdConfig {
    /// Tighter clusters, for zoomed in map views.
    pub fn compact() -> Self {
        CrowdConfig {
            default_radius_meters: 15.0,
            ..Default::default()
        }
    }

    pub fn clamp_density(&self, density: i32) -> i32 {
        density.clamp(self.min_density, self.max_density.max(self.min_density))
    }

    pub fn effective_radius(&self, radius_meters: f64) -> f64 {
        // `NaN > 0.0` is false, so NaN falls back too
        if radius_meters.is_finite() && radius_meters > 0.0 {
            radius_meters
        } else {
            self.default_radius_meters
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    // decimal places used as grid when grouping
    pub plain_precision: u32,
    pub crowd_precision: u32,
    pub max_input_positions: usize,
    pub max_output_points: usize,
    pub fallback_intensity: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        HeatmapConfig {
            plain_precision: 4,
            crowd_precision: 5,
            max_input_positions: 30,
            max_output_points: 150,
            fallback_intensity: 0.7,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracking: TrackingConfig,
    pub crowd: CrowdConfig,
    pub heatmap: HeatmapConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            info!("config file {:?} not found, using defaults", path);
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
