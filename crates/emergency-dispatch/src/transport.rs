//! SMS transport
//!
//! `SmsTransport` is the delivery seam. `TwilioTransport` posts to the Twilio
//! Messages REST API; tests substitute in-memory transports.
//!
//! # Usage
//!
//! ```rust,ignore
//! if let Some(config) = TwilioConfig::from_env() {
//!     let transport = TwilioTransport::new(config);
//!     let receipt = transport.send(&sms).await?;
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
const PLACEHOLDER_SID: &str = "your_account_sid_here";
const PLACEHOLDER_TOKEN: &str = "your_auth_token_here";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Provider refused this message (bad number, unverified recipient, ...)
    #[error("rejected: {0}")]
    Rejected(String),
    /// Provider could not be reached
    #[error("unreachable: {0}")]
    Unreachable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundSms {
    pub to: String,
    pub from: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsReceipt {
    pub provider_id: String,
    pub status: String,
}

#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, sms: &OutboundSms) -> Result<SmsReceipt, TransportError>;

    /// Sender number used for outbound messages
    fn from_number(&self) -> &str;
}

/// Twilio credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

impl TwilioConfig {
    /// `None` when any credential is missing or still a placeholder
    pub fn new(
        account_sid: Option<String>,
        auth_token: Option<String>,
        from_number: Option<String>,
    ) -> Option<Self> {
        let account_sid = account_sid.filter(|s| !s.is_empty() && s != PLACEHOLDER_SID)?;
        let auth_token = auth_token.filter(|t| !t.is_empty() && t != PLACEHOLDER_TOKEN)?;
        Some(Self {
            account_sid,
            auth_token,
            from_number: from_number.unwrap_or_default(),
        })
    }

    /// Read `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_PHONE_NUMBER`
    pub fn from_env() -> Option<Self> {
        Self::new(
            std::env::var("TWILIO_ACCOUNT_SID").ok(),
            std::env::var("TWILIO_AUTH_TOKEN").ok(),
            std::env::var("TWILIO_PHONE_NUMBER").ok(),
        )
    }
}

/// Transport readiness, safe to expose (no secrets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStatus {
    pub configured: bool,
    pub from_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct TwilioError {
    #[serde(default)]
    message: String,
}

pub struct TwilioTransport {
    config: TwilioConfig,
    api_base: String,
    client: reqwest::Client,
}

impl TwilioTransport {
    pub fn new(config: TwilioConfig) -> Self {
        Self::with_timeout(config, Duration::from_secs(10))
    }

    pub fn with_timeout(config: TwilioConfig, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            api_base: TWILIO_API_BASE.to_string(),
            client,
        }
    }

    /// Point at a different API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base, self.config.account_sid
        )
    }
}

#[async_trait]
impl SmsTransport for TwilioTransport {
    async fn send(&self, sms: &OutboundSms) -> Result<SmsReceipt, TransportError> {
        let params = [
            ("To", sms.to.as_str()),
            ("From", sms.from.as_str()),
            ("Body", sms.body.as_str()),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(TransportError::Unreachable(format!("Twilio returned {}", status)));
        }
        if !status.is_success() {
            let message = response
                .json::<TwilioError>()
                .await
                .map(|e| e.message)
                .unwrap_or_default();
            return Err(TransportError::Rejected(if message.is_empty() {
                format!("Twilio returned {}", status)
            } else {
                message
            }));
        }

        let message: TwilioMessage = response
            .json()
            .await
            .map_err(|e| TransportError::Rejected(format!("unexpected response: {}", e)))?;
        debug!("Twilio accepted message {} ({})", message.sid, message.status);

        Ok(SmsReceipt {
            provider_id: message.sid,
            status: message.status,
        })
    }

    fn from_number(&self) -> &str {
        &self.config.from_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Form, Path};
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    /// Stand-in for the Messages endpoint; the recipient picks the outcome
    async fn messages(
        Path(account_sid): Path<String>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> Response {
        if account_sid != "AC0123" || !headers.contains_key(header::AUTHORIZATION) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        match form.get("To").map(String::as_str) {
            Some("+15550002222") => (
                StatusCode::CREATED,
                Json(json!({"sid": "SM0001", "status": "queued", "body": form["Body"]})),
            )
                .into_response(),
            Some("+15550003333") => (
                StatusCode::BAD_REQUEST,
                Json(json!({"code": 21211, "message": "Invalid 'To' Phone Number"})),
            )
                .into_response(),
            Some("+15550004444") => StatusCode::FORBIDDEN.into_response(),
            Some("+15550005555") => (StatusCode::OK, "not json").into_response(),
            _ => (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response(),
        }
    }

    async fn mock_twilio() -> TwilioTransport {
        let app = Router::new().route("/Accounts/:sid/Messages.json", post(messages));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        TwilioTransport::new(config()).with_api_base(format!("http://{}", addr))
    }

    fn sms_to(to: &str) -> OutboundSms {
        OutboundSms {
            to: to.to_string(),
            from: "+15550001111".to_string(),
            body: "I need help".to_string(),
        }
    }

    fn config() -> TwilioConfig {
        TwilioConfig::new(
            Some("AC0123".to_string()),
            Some("secret".to_string()),
            Some("+15550001111".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_placeholder_credentials_unconfigured() {
        assert!(TwilioConfig::new(
            Some(PLACEHOLDER_SID.to_string()),
            Some("secret".to_string()),
            None
        )
        .is_none());
        assert!(TwilioConfig::new(
            Some("AC0123".to_string()),
            Some(PLACEHOLDER_TOKEN.to_string()),
            None
        )
        .is_none());
        assert!(TwilioConfig::new(None, Some("secret".to_string()), None).is_none());
        assert!(
            TwilioConfig::new(Some(String::new()), Some("secret".to_string()), None).is_none()
        );
    }

    #[test]
    fn test_messages_url() {
        let transport = TwilioTransport::new(config());
        assert_eq!(
            transport.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC0123/Messages.json"
        );
        assert_eq!(transport.from_number(), "+15550001111");
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let transport = TwilioTransport::with_timeout(config(), Duration::from_millis(200))
            .with_api_base("http://127.0.0.1:9/");
        let sms = OutboundSms {
            to: "+15550002222".to_string(),
            from: "+15550001111".to_string(),
            body: "test".to_string(),
        };
        assert!(matches!(
            transport.send(&sms).await,
            Err(TransportError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_accepted_message_returns_receipt() {
        let transport = mock_twilio().await;
        assert_eq!(
            transport.send(&sms_to("+15550002222")).await,
            Ok(SmsReceipt {
                provider_id: "SM0001".to_string(),
                status: "queued".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_client_error_is_rejected_with_provider_message() {
        let transport = mock_twilio().await;
        assert_eq!(
            transport.send(&sms_to("+15550003333")).await,
            Err(TransportError::Rejected("Invalid 'To' Phone Number".to_string()))
        );
        // No error body: fall back to the status line
        assert_eq!(
            transport.send(&sms_to("+15550004444")).await,
            Err(TransportError::Rejected("Twilio returned 403 Forbidden".to_string()))
        );
    }

    #[tokio::test]
    async fn test_server_error_is_unreachable() {
        let transport = mock_twilio().await;
        assert_eq!(
            transport.send(&sms_to("+15550009999")).await,
            Err(TransportError::Unreachable("Twilio returned 503 Service Unavailable".to_string()))
        );
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_rejected() {
        let transport = mock_twilio().await;
        match transport.send(&sms_to("+15550005555")).await {
            Err(TransportError::Rejected(msg)) => assert!(msg.starts_with("unexpected response")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
