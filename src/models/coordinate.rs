//! Geographic point submitted for a watershed lookup.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// A WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// East-west position, `-180.0..=180.0`.
    pub longitude: f64,
    /// North-south position, `-90.0..=90.0`.
    pub latitude: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if either component is outside its range.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self> {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::Protocol(format!(
                "longitude out of range: {longitude}"
            )));
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::Protocol(format!(
                "latitude out of range: {latitude}"
            )));
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }

    /// Canonical `"lon,lat"` key used for coordinate-derived correlation.
    ///
    /// Uses the shortest round-trip `f64` rendering, so a value that survives
    /// a JSON round trip through the worker yields the identical key.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        format!("{},{}", self.longitude, self.latitude)
    }

    /// Well-known-text geometry, `POINT(<lon> <lat>)`.
    #[must_use]
    pub fn to_wkt(&self) -> String {
        format!("POINT({} {})", self.longitude, self.latitude)
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.longitude, self.latitude)
    }
}
