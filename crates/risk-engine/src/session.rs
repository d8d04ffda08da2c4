//! Per-session request accounting
//!
//! Rate limiting state belongs to the calling session, not to the engine.
//! The session passes itself in; nothing here is global.

use crate::grid::{generate, GridSpec, RiskGrid};
use crate::{EngineError, Result, Waypoint, DEFAULT_CENTER_LAT, DEFAULT_CENTER_LNG};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

/// Max grid refreshes per window
pub const DEFAULT_RATE_LIMIT: usize = 100;

/// Sliding window length
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window request counter
#[derive(Debug, Clone)]
pub struct RequestWindow {
    limit: usize,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl RequestWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            timestamps: VecDeque::with_capacity(limit),
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Requests counted in the window ending at `now`
    pub fn in_flight(&mut self, now: Instant) -> usize {
        self.evict(now);
        self.timestamps.len()
    }

    pub fn is_exhausted(&mut self, now: Instant) -> bool {
        self.in_flight(now) >= self.limit
    }

    /// Record a request, or reject it when the window is full
    pub fn try_acquire(&mut self, now: Instant) -> Result<()> {
        if self.is_exhausted(now) {
            warn!("Rate limit reached ({} per {:?}), request blocked", self.limit, self.window);
            return Err(EngineError::RateLimited {
                limit: self.limit,
                window_secs: self.window.as_secs(),
            });
        }
        self.timestamps.push_back(now);
        Ok(())
    }
}

impl Default for RequestWindow {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW)
    }
}

/// State owned by one user session
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub center: Waypoint,
    pub requests: RequestWindow,
}

impl SessionContext {
    pub fn new(requests: RequestWindow) -> Self {
        Self {
            center: Waypoint::new(DEFAULT_CENTER_LAT, DEFAULT_CENTER_LNG),
            requests,
        }
    }

    /// Regenerate the grid, moving the center when coordinates are given
    ///
    /// Invalid specs are rejected before a request is counted.
    pub fn refresh_grid(
        &mut self,
        lat: Option<f64>,
        lng: Option<f64>,
        spec: impl FnOnce(Waypoint) -> GridSpec,
        now: Instant,
    ) -> Result<RiskGrid> {
        let center = Waypoint::new(lat.unwrap_or(self.center.lat), lng.unwrap_or(self.center.lng));
        let spec = spec(center);
        spec.validate()?;

        self.requests.try_acquire(now)?;
        let grid = generate(spec)?;
        self.center = center;
        Ok(grid)
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(RequestWindow::default())
    }
}
