//! SafeRoute Risk Engine
//!
//! Builds reproducible risk grids around a city center, scores candidate
//! routes against them, measures live distance-off-route, and audits the
//! grid's error rates across time-of-day cohorts.
//!
//! # Risk Model
//!
//! ```text
//! risk(r, c) = min(1, U(seed) · (0.5 + 0.5·‖(r, c)‖ / half) · T(hour))
//! ```
//!
//! | Term | Description |
//! |------|-------------|
//! | U    | mulberry32 draw, seeded from the grid center |
//! | ‖·‖  | Euclidean cell offset from the center |
//! | T    | Temporal weight: 1.4 night, 1.15 evening, 1.0 day |
//!
//! # Labels
//!
//! One classifier is shared by the grid and the route scorer so a route's
//! aggregate label reads against the grid legend:
//!
//! | Risk        | Label  |
//! |-------------|--------|
//! | < 0.3       | Low    |
//! | < 0.6       | Medium |
//! | otherwise   | High   |

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

pub mod deviation;
pub mod fairness;
pub mod grid;
pub mod predictor;
pub mod routes;
pub mod scorer;
pub mod session;

pub use deviation::{distance_to_route, DeviationMonitor, DeviationStatus};
pub use fairness::{audit, Cohort, FairnessGroup, FairnessReport};
pub use grid::{generate, GridCell, GridSpec, Mulberry32, RiskGrid};
pub use predictor::{NullPredictor, Prediction, RiskFeatures, RiskPredictor};
pub use routes::{demo_routes, Route};
pub use scorer::{compare_routes, score_route, RouteComparison, RouteScore, RouteSegment};
pub use session::{RequestWindow, SessionContext};

/// Default map center (Chennai Central)
pub const DEFAULT_CENTER_LAT: f64 = 13.0827;
pub const DEFAULT_CENTER_LNG: f64 = 80.2707;

/// Upper bound of the Low band
pub const LOW_RISK_MAX: f64 = 0.3;

/// Upper bound of the Medium band
pub const MEDIUM_RISK_MAX: f64 = 0.6;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Rate limit reached: {limit} requests per {window_secs}s")]
    RateLimited { limit: usize, window_secs: u64 },
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Risk band for a cell or a whole route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLabel {
    Low,
    Medium,
    High,
}

impl RiskLabel {
    /// Classify a risk value in [0, 1]
    pub fn from_risk(risk: f64) -> Self {
        if risk < LOW_RISK_MAX {
            RiskLabel::Low
        } else if risk < MEDIUM_RISK_MAX {
            RiskLabel::Medium
        } else {
            RiskLabel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Low => "Low",
            RiskLabel::Medium => "Medium",
            RiskLabel::High => "High",
        }
    }
}

/// A (lat, lng) point on a route or a live position fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
}

impl Waypoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Reject NaN/infinite and out-of-range coordinates
    pub fn validate(&self) -> Result<()> {
        if !is_valid_latitude(self.lat) {
            return Err(EngineError::InvalidParameter(format!(
                "latitude out of range: {}",
                self.lat
            )));
        }
        if !is_valid_longitude(self.lng) {
            return Err(EngineError::InvalidParameter(format!(
                "longitude out of range: {}",
                self.lng
            )));
        }
        Ok(())
    }
}

impl From<(f64, f64)> for Waypoint {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

pub(crate) fn is_valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && lat.is_finite()
}

pub(crate) fn is_valid_longitude(lng: f64) -> bool {
    (-180.0..=180.0).contains(&lng) && lng.is_finite()
}

/// Round to 2 decimals, half away from zero
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Haversine distance between two points in meters
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1 * PI / 180.0;
    let lat2_rad = lat2 * PI / 180.0;
    let dlat = (lat2 - lat1) * PI / 180.0;
    let dlng = (lng2 - lng1) * PI / 180.0;

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_boundaries() {
        assert_eq!(RiskLabel::from_risk(0.0), RiskLabel::Low);
        assert_eq!(RiskLabel::from_risk(0.29), RiskLabel::Low);
        assert_eq!(RiskLabel::from_risk(0.3), RiskLabel::Medium);
        assert_eq!(RiskLabel::from_risk(0.59), RiskLabel::Medium);
        assert_eq!(RiskLabel::from_risk(0.6), RiskLabel::High);
        assert_eq!(RiskLabel::from_risk(1.0), RiskLabel::High);
    }

    #[test]
    fn test_haversine() {
        // Chennai Central to T. Nagar: ~7.7 km
        let dist = haversine_m(13.0827, 80.2707, 13.0478, 80.2089);
        assert!((dist - 7700.0).abs() < 300.0, "got {}", dist);

        // Same point: 0 m
        let dist = haversine_m(13.0827, 80.2707, 13.0827, 80.2707);
        assert!(dist.abs() < 0.001);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(0.3), 0.3);
        assert_eq!(round2(4.999), 5.0);
    }

    #[test]
    fn test_waypoint_validation() {
        assert!(Waypoint::new(13.0, 80.0).validate().is_ok());
        assert!(Waypoint::new(91.0, 80.0).validate().is_err());
        assert!(Waypoint::new(13.0, f64::NAN).validate().is_err());
    }
}
