//! Shared gateway state and per-session context
//!
//! Sessions are keyed by the `x-session-id` header. Only grid refreshes and
//! arming create a session; a request there without one (or with an unknown
//! one) gets a fresh session whose id is echoed back in the response body.
//! Every other route only reads existing sessions. Sessions idle longer than
//! [`SESSION_IDLE_TTL`] are evicted unless their countdown is still running.

use crate::config::GatewayConfig;
use axum::http::HeaderMap;
use emergency_dispatch::{
    CountdownConfig, CountdownController, CountdownState, Dispatcher, Position,
};
use parking_lot::Mutex;
use risk_engine::{RequestWindow, RiskPredictor, SessionContext};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const SESSION_HEADER: &str = "x-session-id";

pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub dispatcher: Dispatcher,
    pub predictor: Arc<dyn RiskPredictor>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        dispatcher: Dispatcher,
        predictor: Arc<dyn RiskPredictor>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
            predictor,
            sessions: Arc::new(SessionStore::default()),
        }
    }

    /// Look up the caller's session, creating one when needed
    pub fn session(&self, headers: &HeaderMap) -> (String, Arc<Session>) {
        let now = Instant::now();
        self.sessions.get_or_create(session_id(headers), now, || {
            let mut context = SessionContext::new(RequestWindow::new(
                self.config.rate_limit,
                self.config.rate_window,
            ));
            context.center = self.config.default_center;

            let countdown = CountdownController::new(
                self.dispatcher.clone(),
                CountdownConfig {
                    default_position: Position::new(
                        self.config.default_center.lat,
                        self.config.default_center.lng,
                    ),
                    ..CountdownConfig::default()
                },
            );

            Session::new(context, countdown, now)
        })
    }

    /// Look up the caller's session without creating one
    pub fn existing_session(&self, headers: &HeaderMap) -> Option<(String, Arc<Session>)> {
        let id = session_id(headers)?;
        let session = self.sessions.get(id, Instant::now())?;
        Some((id.to_string(), session))
    }
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

pub struct Session {
    pub context: Mutex<SessionContext>,
    pub countdown: CountdownController,
    last_seen: Mutex<Instant>,
}

impl Session {
    pub fn new(context: SessionContext, countdown: CountdownController, now: Instant) -> Self {
        Self {
            context: Mutex::new(context),
            countdown,
            last_seen: Mutex::new(now),
        }
    }

    fn touch(&self, now: Instant) {
        let mut last_seen = self.last_seen.lock();
        if now > *last_seen {
            *last_seen = now;
        }
    }

    /// Idle past `ttl` with no countdown in flight
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(*self.last_seen.lock()) > ttl
            && self.countdown.state() == CountdownState::Idle
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SESSION_IDLE_TTL)
    }
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    pub fn get_or_create(
        &self,
        id: Option<&str>,
        now: Instant,
        create: impl FnOnce() -> Session,
    ) -> (String, Arc<Session>) {
        let mut sessions = self.sessions.lock();
        self.evict_idle(&mut sessions, now);
        if let Some(id) = id {
            if let Some(session) = sessions.get(id) {
                session.touch(now);
                return (id.to_string(), session.clone());
            }
        }

        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        debug!("New session {}", id);
        let session = Arc::new(create());
        session.touch(now);
        sessions.insert(id.clone(), session.clone());
        (id, session)
    }

    pub fn get(&self, id: &str, now: Instant) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock();
        self.evict_idle(&mut sessions, now);
        let session = sessions.get(id)?;
        session.touch(now);
        Some(session.clone())
    }

    fn evict_idle(&self, sessions: &mut HashMap<String, Arc<Session>>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, self.idle_ttl));
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!("Evicted {} idle sessions", evicted);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}
