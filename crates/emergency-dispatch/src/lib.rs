//! SafeRoute Emergency Dispatch
//!
//! Consent-gated emergency alerts:
//! - A cancellable 5-second countdown arms the alert
//! - The user's position is captured on arming (bounded, with fallback)
//! - One SMS body is built and fanned out to every contact independently
//! - Per-contact failures are recorded, never escalated
//!
//! # Transport Modes
//!
//! | Credentials | Mode | Attempt status |
//! |-------------|------|----------------|
//! | absent / placeholder | simulated | `simulated` |
//! | configured | live | `delivered` or `failed` |

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod countdown;
pub mod fanout;
pub mod message;
pub mod transport;

pub use countdown::{
    AlertRequest, Countdown, CountdownConfig, CountdownController, CountdownState, FixedPosition,
    PositionError, PositionProvider, COUNTDOWN_TICKS,
};
pub use fanout::Dispatcher;
pub use message::{build_sms_body, map_link, AlertSender};
pub use transport::{
    OutboundSms, SmsReceipt, SmsTransport, TransportError, TransportStatus, TwilioConfig,
    TwilioTransport,
};

/// Fallback position when no fix is available (Chennai Central)
pub const DEFAULT_LAT: f64 = 13.0827;
pub const DEFAULT_LNG: f64 = 80.2707;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Location consent is required before sending an alert")]
    ConsentRequired,
    #[error("No emergency contacts configured")]
    NoContacts,
    #[error("No countdown is armed")]
    NotArming,
    #[error("SMS provider unavailable: {0}")]
    TransportUnavailable(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Position fix shared with contacts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    /// Reported accuracy radius (meters)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            accuracy_m: None,
        }
    }

    pub fn fallback() -> Self {
        Self::new(DEFAULT_LAT, DEFAULT_LNG)
    }
}

/// An emergency contact (already authorized by the caller)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
}

impl Contact {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Delivered,
    Simulated,
    Failed,
}

/// Outcome of one contact's send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAttempt {
    pub contact: String,
    pub phone: String,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMode {
    Live,
    Simulated,
}

/// Aggregate result of one dispatch call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertResult {
    /// `EMG-<epoch millis>`, shared by every attempt of the call
    pub alert_id: String,
    pub map_link: String,
    pub mode: AlertMode,
    pub total_contacts: usize,
    pub delivered: usize,
    pub failed: usize,
    pub simulated: usize,
    /// At least one contact was reached (always true when simulated)
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub attempts: Vec<AlertAttempt>,
}
