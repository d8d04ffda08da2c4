//! Risk engine routes
//!
//! Grid generation is rate limited per session; scoring, comparison,
//! deviation and fairness regenerate the (deterministic) grid freely.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use risk_engine::grid::{GridSummary, MAX_GRID_SIZE};
use risk_engine::{
    audit, compare_routes, demo_routes, generate, score_route, DeviationMonitor, DeviationStatus,
    FairnessReport, GridSpec, Prediction, RiskFeatures, RiskGrid, RouteComparison, RouteScore,
    Waypoint,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

pub fn risk_router(state: AppState) -> Router {
    Router::new()
        .route("/grid", post(refresh_grid))
        .route("/score", post(score))
        .route("/compare", post(compare))
        .route("/deviation", post(deviation))
        .route("/fairness", get(fairness))
        .with_state(state)
}

const MAX_ALTERNATIVES: usize = 8;

/// Reject oversized grids before a session or rate slot is spent
fn check_grid_size(grid_size: Option<u32>) -> Result<(), ApiError> {
    match grid_size {
        Some(n) if n > MAX_GRID_SIZE => Err(ApiError::BadRequest(format!(
            "grid_size must be at most {}",
            MAX_GRID_SIZE
        ))),
        _ => Ok(()),
    }
}

fn current_hour() -> u8 {
    chrono::Timelike::hour(&chrono::Utc::now()) as u8
}

fn spec_for(
    center: Waypoint,
    hour: Option<u8>,
    grid_size: Option<u32>,
    cell_size_km: Option<f64>,
) -> GridSpec {
    let mut spec = GridSpec::new(center.lat, center.lng, hour.unwrap_or_else(current_hour));
    if let Some(n) = grid_size {
        spec = spec.with_grid_size(n);
    }
    if let Some(km) = cell_size_km {
        spec = spec.with_cell_size_km(km);
    }
    spec
}

/// Grid refresh request
#[derive(Debug, Default, Deserialize)]
pub struct GridRequest {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub hour: Option<u8>,
    pub grid_size: Option<u32>,
    pub cell_size_km: Option<f64>,
    #[serde(default)]
    pub geojson: bool,
}

#[derive(Serialize)]
pub struct GridResponse {
    pub session_id: String,
    pub grid: RiskGrid,
    pub summary: GridSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geojson: Option<serde_json::Value>,
}

/// Regenerate the session's grid, moving its center when coordinates are given
pub async fn refresh_grid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GridRequest>,
) -> ApiResult<GridResponse> {
    check_grid_size(req.grid_size)?;
    let (session_id, session) = state.session(&headers);

    let grid = session.context.lock().refresh_grid(
        req.lat,
        req.lng,
        |center| spec_for(center, req.hour, req.grid_size, req.cell_size_km),
        Instant::now(),
    )?;

    let summary = grid.summary();
    debug!(
        "[{}] grid of {} cells, mean risk {:.2}",
        session_id, summary.total_cells, summary.mean_risk
    );
    let geojson = req.geojson.then(|| grid.to_geojson());

    Ok(Json(GridResponse {
        session_id,
        grid,
        summary,
        geojson,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub waypoints: Vec<Waypoint>,
    /// Grid center; defaults to the session's center, or the configured
    /// default without a session
    pub center: Option<Waypoint>,
    pub hour: Option<u8>,
}

/// Score a waypoint list against the grid around the requested or session center
pub async fn score(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ScoreRequest>,
) -> ApiResult<RouteScore> {
    let center = match (req.center, state.existing_session(&headers)) {
        (Some(c), _) => c,
        (None, Some((_, session))) => session.context.lock().center,
        (None, None) => state.config.default_center,
    };

    let grid = generate(spec_for(center, req.hour, None, None))?;
    Ok(Json(score_route(&req.waypoints, grid.cells())?))
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub start: Waypoint,
    pub end: Waypoint,
    pub hour: Option<u8>,
    /// Number of alternatives (default 3)
    pub count: Option<usize>,
}

#[derive(Serialize)]
pub struct CompareResponse {
    pub comparison: Option<RouteComparison>,
    pub fairness: FairnessReport,
    pub prediction: Prediction,
    pub predictor: String,
}

/// Build alternatives between two points and compare their safety
pub async fn compare(
    State(state): State<AppState>,
    Json(req): Json<CompareRequest>,
) -> ApiResult<CompareResponse> {
    req.start.validate()?;
    req.end.validate()?;
    let count = req.count.unwrap_or(3);
    if count == 0 || count > MAX_ALTERNATIVES {
        return Err(ApiError::BadRequest(format!(
            "count must be between 1 and {}",
            MAX_ALTERNATIVES
        )));
    }

    let hour = req.hour.unwrap_or_else(current_hour);
    let midpoint = Waypoint::new(
        (req.start.lat + req.end.lat) / 2.0,
        (req.start.lng + req.end.lng) / 2.0,
    );
    let grid = generate(spec_for(midpoint, Some(hour), None, None))?;

    let comparison = compare_routes(demo_routes(req.start, req.end, count), grid.cells())?;
    let fairness = audit(&grid);
    let prediction = state.predictor.predict(&RiskFeatures::for_hour(hour)).await;

    if let Some(c) = &comparison {
        info!(
            "Compared {} routes: safest #{} (+{} safety, +{} min)",
            c.routes.len(),
            c.safest_id,
            c.safety_gain,
            c.extra_minutes
        );
    }

    Ok(Json(CompareResponse {
        comparison,
        fairness,
        prediction,
        predictor: state.predictor.name().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct DeviationRequest {
    pub position: Waypoint,
    pub route: Vec<Waypoint>,
    /// Overrides the configured threshold (meters)
    pub threshold_m: Option<u32>,
}

/// Distance from the live position to the active route
pub async fn deviation(
    State(state): State<AppState>,
    Json(req): Json<DeviationRequest>,
) -> ApiResult<DeviationStatus> {
    let monitor =
        DeviationMonitor::new(req.threshold_m.unwrap_or(state.config.deviation_threshold_m));
    let status = monitor.check(req.position, &req.route)?;
    if status.off_route {
        info!("Off route by {} m", status.distance_m);
    }
    Ok(Json(status))
}

#[derive(Debug, Default, Deserialize)]
pub struct FairnessQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub hour: Option<u8>,
    pub grid_size: Option<u32>,
}

/// Fairness audit for the grid at the given (or default) center
pub async fn fairness(
    State(state): State<AppState>,
    Query(query): Query<FairnessQuery>,
) -> ApiResult<FairnessReport> {
    check_grid_size(query.grid_size)?;
    let center = Waypoint::new(
        query.lat.unwrap_or(state.config.default_center.lat),
        query.lng.unwrap_or(state.config.default_center.lng),
    );
    let grid = generate(spec_for(center, query.hour, query.grid_size, None))?;
    Ok(Json(audit(&grid)))
}
