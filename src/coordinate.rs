use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const EARTH_RADIUS: f64 = 6371000.0; // unit: meter

pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinate {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_coordinates(self.latitude, self.longitude)
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance(self, other)
    }
}

// NaN fails every comparison, so `contains` rejects it together with the
// infinities.
pub fn validate_latitude(latitude: f64) -> Result<()> {
    if (MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude) {
        Ok(())
    } else if latitude > MAX_LATITUDE {
        Err(Error::validation(format!(
            "Latitude must be at most {}, got {}",
            MAX_LATITUDE, latitude
        )))
    } else if latitude < MIN_LATITUDE {
        Err(Error::validation(format!(
            "Latitude must be at least {}, got {}",
            MIN_LATITUDE, latitude
        )))
    } else {
        Err(Error::validation(format!(
            "Latitude must be between {} and {}, got {}",
            MIN_LATITUDE, MAX_LATITUDE, latitude
        )))
    }
}

pub fn validate_longitude(longitude: f64) -> Result<()> {
    if (MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude) {
        Ok(())
    } else if longitude > MAX_LONGITUDE {
        Err(Error::validation(format!(
            "Longitude must be at most {}, got {}",
            MAX_LONGITUDE, longitude
        )))
    } else if longitude < MIN_LONGITUDE {
        Err(Error::validation(format!(
            "Longitude must be at least {}, got {}",
            MIN_LONGITUDE, longitude
        )))
    } else {
        Err(Error::validation(format!(
            "Longitude must be between {} and {}, got {}",
            MIN_LONGITUDE, MAX_LONGITUDE, longitude
        )))
    }
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    validate_latitude(latitude)?;
    validate_longitude(longitude)
}

pub fn validate_origin_and_destination(origin: &Coordinate, destination: &Coordinate) -> Result<()> {
    origin
        .validate()
        .map_err(|e| Error::validation(format!("Invalid origin: {}", e.message)))?;
    destination
        .validate()
        .map_err(|e| Error::validation(format!("Invalid destination: {}", e.message)))
}

pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds() {
        let error = validate_latitude(91.0).unwrap_err();
        assert!(error.message.contains("90"), "{}", error.message);
        assert!(error.message.contains("91"), "{}", error.message);

        let error = validate_longitude(-181.0).unwrap_err();
        assert!(error.message.contains("-180"), "{}", error.message);

        assert!(validate_coordinates(0.0, 0.0).is_ok());
        assert!(validate_coordinates(90.0, -180.0).is_ok());
        assert!(validate_coordinates(-90.0, 180.0).is_ok());
    }

    #[test]
    fn non_finite() {
        assert!(validate_latitude(f64::NAN).is_err());
        assert!(validate_latitude(f64::INFINITY).is_err());
        assert!(validate_longitude(f64::NEG_INFINITY).is_err());
        assert!(validate_longitude(f64::NAN)
            .unwrap_err()
            .message
            .contains("between"));
    }

    #[test]
    fn origin_and_destination() {
        let ok = Coordinate::new(31.2, 121.4);
        let bad = Coordinate::new(31.2, 200.0);
        assert!(validate_origin_and_destination(&ok, &ok).is_ok());
        assert!(validate_origin_and_destination(&bad, &ok)
            .unwrap_err()
            .message
            .starts_with("Invalid origin"));
        assert!(validate_origin_and_destination(&ok, &bad)
            .unwrap_err()
            .message
            .starts_with("Invalid destination"));
    }

    #[test]
    fn distance() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 1.0);
        // one degree on the equator
        assert!((a.distance_to(&b) - 111194.9).abs() < 1.0);
        assert_eq!(a.distance_to(&a), 0.0);
    }
}
