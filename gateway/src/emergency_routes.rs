//! Emergency alert routes
//!
//! Contacts arrive already authorized in the request body. Nothing here is
//! persisted; countdown state lives in the caller's session.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use emergency_dispatch::{
    AlertRequest, AlertResult, AlertSender, Contact, CountdownState, DispatchError, FixedPosition,
    Position, TransportStatus,
};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn emergency_router(state: AppState) -> Router {
    Router::new()
        .route("/alert", post(send_alert))
        .route("/arm", post(arm))
        .route("/cancel", post(cancel))
        .route("/countdown", get(countdown))
        .route("/status", get(status))
        .with_state(state)
}

/// Body shared by immediate alerts and arming
#[derive(Debug, Deserialize)]
pub struct AlertBody {
    /// Explicit location-sharing consent
    #[serde(default)]
    pub consent: bool,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub sender: AlertSender,
    pub message: Option<String>,
}

impl AlertBody {
    fn position(&self) -> Result<Option<Position>, ApiError> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => {
                risk_engine::Waypoint::new(lat, lng).validate()?;
                Ok(Some(Position::new(lat, lng)))
            }
            (None, None) => Ok(None),
            _ => Err(ApiError::BadRequest(
                "lat and lng must be given together".to_string(),
            )),
        }
    }
}

/// Send to every contact now, without a countdown
pub async fn send_alert(
    State(state): State<AppState>,
    Json(body): Json<AlertBody>,
) -> ApiResult<AlertResult> {
    if !body.consent {
        return Err(DispatchError::ConsentRequired.into());
    }
    let position = body
        .position()?
        .ok_or_else(|| ApiError::BadRequest("Location (lat, lng) is required".to_string()))?;

    let result = state
        .dispatcher
        .dispatch(
            position,
            &body.contacts,
            &body.sender,
            body.message.as_deref(),
        )
        .await?;
    info!(
        "[{}] {} of {} contacts reached",
        result.alert_id,
        result.delivered + result.simulated,
        result.total_contacts
    );
    Ok(Json(result))
}

#[derive(Serialize)]
pub struct CountdownResponse {
    /// Absent when the caller has no session yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub state: CountdownState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<AlertResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Arm the session's countdown; a missing position falls back to the default location
pub async fn arm(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AlertBody>,
) -> ApiResult<CountdownResponse> {
    let position = body.position()?;
    let (session_id, session) = state.session(&headers);

    let request = AlertRequest {
        contacts: body.contacts,
        sender: body.sender,
        message: body.message,
    };
    let countdown_state = session
        .countdown
        .arm(body.consent, request, &FixedPosition(position))
        .await?;

    Ok(Json(CountdownResponse {
        session_id: Some(session_id),
        state: countdown_state,
        last_result: None,
        last_error: None,
    }))
}

/// Cancel the session's countdown; without a session there is nothing armed
pub async fn cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<CountdownResponse> {
    let (session_id, session) = state
        .existing_session(&headers)
        .ok_or(DispatchError::NotArming)?;
    session.countdown.cancel()?;

    Ok(Json(CountdownResponse {
        session_id: Some(session_id),
        state: session.countdown.state(),
        last_result: None,
        last_error: None,
    }))
}

/// Countdown state and the outcome of the last dispatch
pub async fn countdown(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<CountdownResponse> {
    let Some((session_id, session)) = state.existing_session(&headers) else {
        return Json(CountdownResponse {
            session_id: None,
            state: CountdownState::Idle,
            last_result: None,
            last_error: None,
        });
    };
    let (last_result, last_error) = match session.countdown.last_result() {
        Some(Ok(result)) => (Some(result), None),
        Some(Err(e)) => (None, Some(e.to_string())),
        None => (None, None),
    };

    Json(CountdownResponse {
        session_id: Some(session_id),
        state: session.countdown.state(),
        last_result,
        last_error,
    })
}

pub async fn status(State(state): State<AppState>) -> Json<TransportStatus> {
    Json(state.dispatcher.status())
}
