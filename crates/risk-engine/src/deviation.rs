//! Route deviation detection
//!
//! Projection happens in raw degree space and only the final
//! point-to-projection distance is haversine. Valid at city scale where
//! segments are short.

use crate::{haversine_m, EngineError, Result, Waypoint};
use serde::{Deserialize, Serialize};

/// Off-route threshold used by the live navigation view (meters)
pub const DEFAULT_DEVIATION_THRESHOLD_M: u32 = 300;

/// Nearest point on segment `a → b` to `p`, parameter clamped to [0, 1]
fn project_onto_segment(p: &Waypoint, a: &Waypoint, b: &Waypoint) -> Waypoint {
    let dx = b.lng - a.lng;
    let dy = b.lat - a.lat;
    let len_sq = dx * dx + dy * dy;

    let t = if len_sq > 0.0 {
        (((p.lng - a.lng) * dx + (p.lat - a.lat) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Waypoint {
        lat: a.lat + t * dy,
        lng: a.lng + t * dx,
    }
}

/// Shortest distance in whole meters from `position` to any segment of the route
///
/// A single-waypoint route measures to that waypoint.
pub fn distance_to_route(position: Waypoint, waypoints: &[Waypoint]) -> Result<u32> {
    let min_dist = match waypoints {
        [] => {
            return Err(EngineError::InvalidParameter(
                "route has no waypoints".to_string(),
            ))
        }
        [only] => haversine_m(position.lat, position.lng, only.lat, only.lng),
        _ => waypoints
            .windows(2)
            .map(|pair| {
                let proj = project_onto_segment(&position, &pair[0], &pair[1]);
                haversine_m(position.lat, position.lng, proj.lat, proj.lng)
            })
            .fold(f64::INFINITY, f64::min),
    };

    if !min_dist.is_finite() {
        return Err(EngineError::InvalidParameter(format!(
            "position is not a finite coordinate: ({}, {})",
            position.lat, position.lng
        )));
    }

    Ok(min_dist.round() as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationStatus {
    pub distance_m: u32,
    pub off_route: bool,
}

/// Caller-owned threshold check over `distance_to_route`
#[derive(Debug, Clone, Copy)]
pub struct DeviationMonitor {
    pub threshold_m: u32,
}

impl DeviationMonitor {
    pub fn new(threshold_m: u32) -> Self {
        Self { threshold_m }
    }

    pub fn check(&self, position: Waypoint, waypoints: &[Waypoint]) -> Result<DeviationStatus> {
        let distance_m = distance_to_route(position, waypoints)?;
        Ok(DeviationStatus {
            distance_m,
            off_route: distance_m > self.threshold_m,
        })
    }
}

impl Default for DeviationMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_DEVIATION_THRESHOLD_M)
    }
}
