//! Risk grid generation
//!
//! A grid is a `grid_size × grid_size` row-major sequence of cells centered
//! on a point. Every cell draws exactly one value from a mulberry32 stream
//! seeded from the center, so identical inputs (including the hour) always
//! produce an identical grid.

use crate::{
    is_valid_latitude, is_valid_longitude, round2, EngineError, Result, RiskLabel,
    DEFAULT_CENTER_LAT, DEFAULT_CENTER_LNG,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Degrees of latitude per km (fixed conversion, also applied to longitude)
pub const DEG_PER_KM: f64 = 1.0 / 111.32;

/// Default number of cells per row/column
pub const DEFAULT_GRID_SIZE: u32 = 20;

/// Largest grid accepted per side
pub const MAX_GRID_SIZE: u32 = 200;

/// Default cell width in km
pub const DEFAULT_CELL_SIZE_KM: f64 = 0.5;

/// Temporal weights
pub const NIGHT_WEIGHT: f64 = 1.4;
pub const EVENING_WEIGHT: f64 = 1.15;
pub const DAY_WEIGHT: f64 = 1.0;

/// mulberry32 pseudo-random generator
///
/// 32-bit state, one `f64` in [0, 1) per call. The sequence depends only on
/// the seed and is identical on every platform.
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Seed from any integer, reduced modulo 2^32
    pub fn from_i64(seed: i64) -> Self {
        Self::new(seed as u32)
    }

    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        f64::from(t ^ (t >> 14)) / 4_294_967_296.0
    }
}

/// Inputs that identify a grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub center_lat: f64,
    pub center_lng: f64,
    pub grid_size: u32,
    pub cell_size_km: f64,
    /// Hour of day (0-23) for temporal weighting
    pub hour: u8,
}

impl GridSpec {
    pub fn new(center_lat: f64, center_lng: f64, hour: u8) -> Self {
        Self {
            center_lat,
            center_lng,
            grid_size: DEFAULT_GRID_SIZE,
            cell_size_km: DEFAULT_CELL_SIZE_KM,
            hour,
        }
    }

    pub fn with_grid_size(mut self, grid_size: u32) -> Self {
        self.grid_size = grid_size;
        self
    }

    pub fn with_cell_size_km(mut self, cell_size_km: f64) -> Self {
        self.cell_size_km = cell_size_km;
        self
    }

    /// Integer seed derived from the center: round(lat·1000 + lng·1000)
    pub fn seed(&self) -> i64 {
        // Round half up
        (self.center_lat * 1000.0 + self.center_lng * 1000.0 + 0.5).floor() as i64
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_size == 0 {
            return Err(EngineError::InvalidParameter(
                "grid_size must be positive".to_string(),
            ));
        }
        if self.grid_size > MAX_GRID_SIZE {
            return Err(EngineError::InvalidParameter(format!(
                "grid_size must be at most {}, got {}",
                MAX_GRID_SIZE, self.grid_size
            )));
        }
        if !is_valid_latitude(self.center_lat) || !is_valid_longitude(self.center_lng) {
            return Err(EngineError::InvalidParameter(format!(
                "center out of range: ({}, {})",
                self.center_lat, self.center_lng
            )));
        }
        if !(self.cell_size_km.is_finite() && self.cell_size_km > 0.0) {
            return Err(EngineError::InvalidParameter(format!(
                "cell_size_km must be positive, got {}",
                self.cell_size_km
            )));
        }
        if self.hour > 23 {
            return Err(EngineError::InvalidParameter(format!(
                "hour must be 0-23, got {}",
                self.hour
            )));
        }
        Ok(())
    }
}

impl Default for GridSpec {
    fn default() -> Self {
        Self::new(DEFAULT_CENTER_LAT, DEFAULT_CENTER_LNG, 12)
    }
}

/// One scored cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub lat: f64,
    pub lng: f64,
    /// Risk in [0, 1], 2 decimals
    pub risk: f64,
    pub label: RiskLabel,
}

/// A generated grid. Cells are never mutated after generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskGrid {
    pub spec: GridSpec,
    cells: Vec<GridCell>,
}

/// Per-label counts for the map legend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSummary {
    pub total_cells: usize,
    pub label_counts: HashMap<String, usize>,
    pub mean_risk: f64,
}

impl RiskGrid {
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn summary(&self) -> GridSummary {
        let mut label_counts: HashMap<String, usize> = HashMap::new();
        for cell in &self.cells {
            *label_counts.entry(cell.label.as_str().to_string()).or_default() += 1;
        }
        let mean_risk = if self.cells.is_empty() {
            0.0
        } else {
            round2(self.cells.iter().map(|c| c.risk).sum::<f64>() / self.cells.len() as f64)
        };

        GridSummary {
            total_cells: self.cells.len(),
            label_counts,
            mean_risk,
        }
    }

    /// Export cells as a GeoJSON FeatureCollection of points
    pub fn to_geojson(&self) -> serde_json::Value {
        let features: Vec<serde_json::Value> = self
            .cells
            .iter()
            .map(|cell| {
                serde_json::json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        "coordinates": [cell.lng, cell.lat]
                    },
                    "properties": {
                        "risk": cell.risk,
                        "label": cell.label.as_str(),
                    }
                })
            })
            .collect();

        serde_json::json!({
            "type": "FeatureCollection",
            "features": features,
            "properties": {
                "center": [self.spec.center_lng, self.spec.center_lat],
                "grid_size": self.spec.grid_size,
                "cell_size_km": self.spec.cell_size_km,
                "hour": self.spec.hour,
            }
        })
    }
}

/// Temporal multiplier: risk rises in the evening and peaks at night
pub fn temporal_weight(hour: u8) -> f64 {
    match hour {
        22..=23 | 0..=4 => NIGHT_WEIGHT,
        18..=21 => EVENING_WEIGHT,
        _ => DAY_WEIGHT,
    }
}

/// Generate the risk grid for `spec`
pub fn generate(spec: GridSpec) -> Result<RiskGrid> {
    spec.validate()?;

    let size = spec.grid_size as usize;
    let half = f64::from(spec.grid_size) / 2.0;
    let time_weight = temporal_weight(spec.hour);
    let mut rng = Mulberry32::from_i64(spec.seed());
    let mut cells = Vec::with_capacity(size * size);

    for row in 0..spec.grid_size {
        let r = f64::from(row) - half;
        let cell_lat = spec.center_lat + r * spec.cell_size_km * DEG_PER_KM;

        for col in 0..spec.grid_size {
            let c = f64::from(col) - half;
            let cell_lng = spec.center_lng + c * spec.cell_size_km * DEG_PER_KM;

            // Proximity-to-center decay
            let dist = (r * r + c * c).sqrt() / half;
            let base = rng.next_f64() * (0.5 + 0.5 * dist);
            let risk = round2((base * time_weight).min(1.0));

            cells.push(GridCell {
                lat: cell_lat,
                lng: cell_lng,
                risk,
                label: RiskLabel::from_risk(risk),
            });
        }
    }

    debug!(
        "Generated {}x{} grid at ({:.4}, {:.4}) hour={} weight={:.2}",
        spec.grid_size, spec.grid_size, spec.center_lat, spec.center_lng, spec.hour, time_weight
    );

    Ok(RiskGrid { spec, cells })
}
