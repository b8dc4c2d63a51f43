use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coordinate::{haversine_distance, Coordinate};

pub const STATUS_OK: &str = "OK";
pub const STATUS_ZERO_RESULTS: &str = "ZERO_RESULTS";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub status: String,
    pub points: Vec<Coordinate>,
    // meters
    pub total_distance: f64,
    // seconds
    pub total_duration: i64,
}

impl RouteResponse {
    pub fn ok(points: Vec<Coordinate>) -> Self {
        let total_distance = points
            .windows(2)
            .map(|w| haversine_distance(&w[0], &w[1]))
            .sum();
        RouteResponse {
            status: STATUS_OK.to_string(),
            points,
            total_distance,
            total_duration: 0,
        }
    }

    pub fn failed(status: &str) -> Self {
        RouteResponse {
            status: status.to_string(),
            points: Vec::new(),
            total_distance: 0.0,
            total_duration: 0,
        }
    }

    /// Anything other than the literal "OK" is a failure, including statuses
    /// we know nothing about.
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Turns an origin/destination pair into waypoints, e.g. a directions API.
/// `Err` means the request itself failed (network etc), a well formed but
/// unsuccessful answer is reported through `RouteResponse::status`.
#[async_trait]
pub trait RouteSource: Send + Sync {
    async fn fetch_route(&self, origin: Coordinate, destination: Coordinate)
        -> Result<RouteResponse>;
}

/// Always answers with the same response, regardless of the request.
pub struct FixedRoute {
    response: RouteResponse,
}

impl FixedRoute {
    pub fn new(points: Vec<Coordinate>) -> Self {
        FixedRoute {
            response: RouteResponse::ok(points),
        }
    }

    pub fn with_status(status: &str) -> Self {
        FixedRoute {
            response: RouteResponse::failed(status),
        }
    }
}

#[async_trait]
impl RouteSource for FixedRoute {
    async fn fetch_route(&self, _: Coordinate, _: Coordinate) -> Result<RouteResponse> {
        Ok(self.response.clone())
    }
}

/// A straight line from origin to destination, cut into `steps` equal legs.
/// Offline stand-in for a directions service.
pub struct StraightLineRoute {
    pub steps: usize,
    pub speed_mps: f64,
}

impl Default for StraightLineRoute {
    fn default() -> Self {
        // walking speed
        StraightLineRoute {
            steps: 20,
            speed_mps: 1.4,
        }
    }
}

#[async_trait]
impl RouteSource for StraightLineRoute {
    async fn fetch_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RouteResponse> {
        if self.steps == 0 {
            bail!("straight line route needs at least one step");
        }
        if origin == destination {
            return Ok(RouteResponse::failed(STATUS_ZERO_RESULTS));
        }
        let points: Vec<Coordinate> = (0..=self.steps)
            .map(|i| {
                let t = i as f64 / self.steps as f64;
                Coordinate::new(
                    origin.latitude + (destination.latitude - origin.latitude) * t,
                    origin.longitude + (destination.longitude - origin.longitude) * t,
                )
            })
            .collect();
        let mut response = RouteResponse::ok(points);
        if self.speed_mps > 0.0 {
            response.total_duration = (response.total_distance / self.speed_mps).round() as i64;
        }
        Ok(response)
    }
}
