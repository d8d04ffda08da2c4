//! Candidate routes
//!
//! Routes come from an external router in production. `demo_routes` builds
//! reproducible alternatives between two points so the comparison view and
//! the scorer can be exercised without one.

use crate::{EngineError, Result, Waypoint};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const DEMO_NAMES: [&str; 3] = ["Fastest Route", "Safest Route", "Balanced Route"];
const DEMO_COLORS: [&str; 3] = ["#ef4444", "#22c55e", "#3b82f6"];
const FALLBACK_COLOR: &str = "#8b5cf6";

/// An ordered, non-empty path with display metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Unique within one comparison set
    pub id: u32,
    pub name: String,
    /// Display color (hex)
    pub color: String,
    pub waypoints: Vec<Waypoint>,
    pub distance_km: f64,
    pub duration_min: u32,
}

impl Route {
    pub fn validate(&self) -> Result<()> {
        if self.waypoints.is_empty() {
            return Err(EngineError::InvalidParameter(format!(
                "route {} has no waypoints",
                self.id
            )));
        }
        self.waypoints.iter().try_for_each(Waypoint::validate)
    }
}

/// Generate `count` alternative routes from `start` to `end`
///
/// Route `i` has `12 + 3i` steps and bends away from the straight line by
/// `(i - 1) · 0.008` degrees, so route 1 is the straight line.
pub fn demo_routes(start: Waypoint, end: Waypoint, count: usize) -> Vec<Route> {
    (0..count)
        .map(|i| {
            let fi = i as f64;
            let steps = 12 + i * 3;
            let jitter = (fi - 1.0) * 0.008;

            let waypoints = (0..=steps)
                .map(|s| {
                    let t = s as f64 / steps as f64;
                    Waypoint {
                        lat: start.lat + (end.lat - start.lat) * t + (t * PI).sin() * jitter,
                        lng: start.lng
                            + (end.lng - start.lng) * t
                            + (t * PI * 0.7).cos() * jitter * 0.6,
                    }
                })
                .collect();

            let extra = if i == 1 { 5 } else { 0 };

            Route {
                id: i as u32,
                name: DEMO_NAMES
                    .get(i)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("Route {}", i + 1)),
                color: DEMO_COLORS.get(i).copied().unwrap_or(FALLBACK_COLOR).to_string(),
                waypoints,
                distance_km: ((5.0 + fi * 1.2) * 10.0).round() / 10.0,
                duration_min: (12 + i * 4 + extra) as u32,
            }
        })
        .collect()
}
