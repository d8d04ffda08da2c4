//! Route safety scoring
//!
//! Each waypoint takes the risk of its nearest grid cell (squared distance in
//! raw lat/lng space, first cell wins on ties). The route score is
//! `round((1 - mean_risk) · 100)`, so a higher score is strictly safer.
//! Waypoints must be finite, in-range coordinates; anything else is rejected
//! before scoring.

use crate::grid::GridCell;
use crate::routes::Route;
use crate::{Result, RiskLabel, Waypoint};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Score reported for an empty route or an empty grid
pub const OPTIMISTIC_SCORE: u8 = 100;

/// One waypoint paired with its nearest cell's risk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub lat: f64,
    pub lng: f64,
    pub risk: f64,
    pub label: RiskLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteScore {
    /// Safety score 0-100 (higher = safer)
    pub score: u8,
    /// Label of the mean segment risk
    pub label: RiskLabel,
    pub segments: Vec<RouteSegment>,
}

/// Nearest cell by linear scan. `None` only for an empty grid.
fn nearest_cell<'a>(cells: &'a [GridCell], point: &Waypoint) -> Option<&'a GridCell> {
    let mut nearest: Option<&GridCell> = None;
    let mut min_d = f64::INFINITY;

    for cell in cells {
        let d = (cell.lat - point.lat).powi(2) + (cell.lng - point.lng).powi(2);
        // Strict comparison keeps the first cell on ties
        if d < min_d {
            min_d = d;
            nearest = Some(cell);
        }
    }

    nearest
}

/// Score an ordered path against grid cells
pub fn score_route(waypoints: &[Waypoint], cells: &[GridCell]) -> Result<RouteScore> {
    for wp in waypoints {
        wp.validate()?;
    }
    if waypoints.is_empty() || cells.is_empty() {
        return Ok(RouteScore {
            score: OPTIMISTIC_SCORE,
            label: RiskLabel::Low,
            segments: Vec::new(),
        });
    }

    let segments: Vec<RouteSegment> = waypoints
        .iter()
        .filter_map(|wp| {
            nearest_cell(cells, wp).map(|cell| RouteSegment {
                lat: wp.lat,
                lng: wp.lng,
                risk: cell.risk,
                label: cell.label,
            })
        })
        .collect();

    let mean_risk = segments.iter().map(|s| s.risk).sum::<f64>() / segments.len() as f64;
    let score = ((1.0 - mean_risk) * 100.0).round().clamp(0.0, 100.0) as u8;

    debug!(
        "Scored route: {} segments, mean risk {:.3}, score {}",
        segments.len(),
        mean_risk,
        score
    );

    Ok(RouteScore {
        score,
        label: RiskLabel::from_risk(mean_risk),
        segments,
    })
}

/// A route with its safety score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRoute {
    pub route: Route,
    pub safety: RouteScore,
}

/// Side-by-side comparison of alternative routes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteComparison {
    pub routes: Vec<ScoredRoute>,
    /// Route id with the highest safety score
    pub safest_id: u32,
    /// Route id with the shortest duration
    pub fastest_id: u32,
    /// Safety points gained by taking the safest route over the fastest
    pub safety_gain: i32,
    /// Extra minutes spent by taking the safest route over the fastest
    pub extra_minutes: i32,
}

/// Score every route and pick the safest and fastest. `None` if `routes` is empty.
pub fn compare_routes(routes: Vec<Route>, cells: &[GridCell]) -> Result<Option<RouteComparison>> {
    let scored = routes
        .into_iter()
        .map(|route| {
            let safety = score_route(&route.waypoints, cells)?;
            Ok(ScoredRoute { route, safety })
        })
        .collect::<Result<Vec<ScoredRoute>>>()?;

    let Some(mut safest) = scored.first() else {
        return Ok(None);
    };
    let mut fastest = safest;
    for candidate in &scored[1..] {
        if candidate.safety.score > safest.safety.score {
            safest = candidate;
        }
        if candidate.route.duration_min < fastest.route.duration_min {
            fastest = candidate;
        }
    }

    let safety_gain = i32::from(safest.safety.score) - i32::from(fastest.safety.score);
    let extra_minutes = safest.route.duration_min as i32 - fastest.route.duration_min as i32;
    let safest_id = safest.route.id;
    let fastest_id = fastest.route.id;

    Ok(Some(RouteComparison {
        routes: scored,
        safest_id,
        fastest_id,
        safety_gain,
        extra_minutes,
    }))
}
