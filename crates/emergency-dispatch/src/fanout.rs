//! Dispatch fan-out
//!
//! One alert body, sent to every contact concurrently. A failed recipient is
//! recorded on its attempt and never stops the others.

use crate::message::{build_sms_body, map_link, AlertSender};
use crate::transport::{OutboundSms, SmsTransport, TransportError, TransportStatus};
use crate::{
    AlertAttempt, AlertMode, AlertResult, AttemptStatus, Contact, DispatchError, Position, Result,
};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

const SIMULATED_WARNING: &str =
    "SMS credentials not configured. Set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER for live delivery.";
const SIMULATED_NOTE: &str = "SMS credentials not configured, delivery simulated";

#[derive(Clone, Default)]
pub struct Dispatcher {
    transport: Option<Arc<dyn SmsTransport>>,
}

impl Dispatcher {
    pub fn new(transport: Option<Arc<dyn SmsTransport>>) -> Self {
        Self { transport }
    }

    /// Dispatcher with no transport; every send is simulated
    pub fn simulated() -> Self {
        Self { transport: None }
    }

    pub fn status(&self) -> TransportStatus {
        match &self.transport {
            Some(t) => TransportStatus {
                configured: true,
                from_number: Some(t.from_number().to_string()).filter(|n| !n.is_empty()),
            },
            None => TransportStatus {
                configured: false,
                from_number: None,
            },
        }
    }

    /// Send the alert to every contact
    pub async fn dispatch(
        &self,
        position: Position,
        contacts: &[Contact],
        sender: &AlertSender,
        message: Option<&str>,
    ) -> Result<AlertResult> {
        if contacts.is_empty() {
            return Err(DispatchError::NoContacts);
        }

        let sent_at = Utc::now();
        let alert_id = format!("EMG-{}", sent_at.timestamp_millis());
        let link = map_link(position.lat, position.lng);

        let Some(transport) = &self.transport else {
            warn!("[{}] SMS transport not configured, simulating delivery", alert_id);
            return Ok(simulated_result(alert_id, link, contacts));
        };

        let body = build_sms_body(sender, position.lat, position.lng, message, sent_at);
        info!(
            "[{}] Dispatching alert to {} contacts",
            alert_id,
            contacts.len()
        );

        let sends = contacts.iter().map(|contact| {
            let sms = OutboundSms {
                to: contact.phone.clone(),
                from: transport.from_number().to_string(),
                body: body.clone(),
            };
            async move { (contact, transport.send(&sms).await) }
        });
        let outcomes = join_all(sends).await;

        let all_unreachable = outcomes
            .iter()
            .all(|(_, r)| matches!(r, Err(TransportError::Unreachable(_))));
        if all_unreachable {
            let reason = outcomes
                .iter()
                .find_map(|(_, r)| r.as_ref().err().map(|e| e.to_string()))
                .unwrap_or_default();
            error!("[{}] SMS provider unreachable for every contact: {}", alert_id, reason);
            return Err(DispatchError::TransportUnavailable(reason));
        }

        let attempts: Vec<AlertAttempt> = outcomes
            .into_iter()
            .map(|(contact, outcome)| match outcome {
                Ok(receipt) => {
                    info!(
                        "[{}] SMS sent to {} ({})",
                        alert_id, contact.name, receipt.provider_id
                    );
                    AlertAttempt {
                        contact: contact.name.clone(),
                        phone: contact.phone.clone(),
                        status: AttemptStatus::Delivered,
                        provider_id: Some(receipt.provider_id),
                        provider_status: Some(receipt.status),
                        error: None,
                    }
                }
                Err(e) => {
                    error!("[{}] Failed to SMS {}: {}", alert_id, contact.phone, e);
                    AlertAttempt {
                        contact: contact.name.clone(),
                        phone: contact.phone.clone(),
                        status: AttemptStatus::Failed,
                        provider_id: None,
                        provider_status: None,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect();

        let delivered = attempts
            .iter()
            .filter(|a| a.status == AttemptStatus::Delivered)
            .count();

        Ok(AlertResult {
            alert_id,
            map_link: link,
            mode: AlertMode::Live,
            total_contacts: contacts.len(),
            delivered,
            failed: contacts.len() - delivered,
            simulated: 0,
            success: delivered > 0,
            warning: None,
            attempts,
        })
    }
}

fn simulated_result(alert_id: String, map_link: String, contacts: &[Contact]) -> AlertResult {
    let attempts = contacts
        .iter()
        .map(|c| AlertAttempt {
            contact: c.name.clone(),
            phone: c.phone.clone(),
            status: AttemptStatus::Simulated,
            provider_id: None,
            provider_status: None,
            error: None,
        })
        .collect::<Vec<_>>();

    AlertResult {
        alert_id,
        map_link,
        mode: AlertMode::Simulated,
        total_contacts: contacts.len(),
        delivered: 0,
        failed: 0,
        simulated: contacts.len(),
        success: true,
        warning: Some(format!("{}. {}", SIMULATED_NOTE, SIMULATED_WARNING)),
        attempts,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::SmsReceipt;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records every message; fails for listed numbers
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub sent: Mutex<Vec<OutboundSms>>,
        pub reject: Vec<String>,
        pub unreachable: bool,
    }

    #[async_trait]
    impl SmsTransport for RecordingTransport {
        async fn send(&self, sms: &OutboundSms) -> std::result::Result<SmsReceipt, TransportError> {
            if self.unreachable {
                return Err(TransportError::Unreachable("connection refused".to_string()));
            }
            if self.reject.contains(&sms.to) {
                return Err(TransportError::Rejected("invalid 'To' number".to_string()));
            }
            let mut sent = self.sent.lock();
            sent.push(sms.clone());
            Ok(SmsReceipt {
                provider_id: format!("SM{}", sent.len()),
                status: "queued".to_string(),
            })
        }

        fn from_number(&self) -> &str {
            "+15550001111"
        }
    }

    pub(crate) fn contacts() -> Vec<Contact> {
        vec![
            Contact::new("Asha", "+919800000001"),
            Contact::new("Ravi", "+919800000002"),
            Contact::new("Meena", "+919800000003"),
        ]
    }

    #[tokio::test]
    async fn test_partial_failure_isolated() {
        let transport = Arc::new(RecordingTransport {
            reject: vec!["+919800000002".to_string()],
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(Some(transport.clone()));

        let result = dispatcher
            .dispatch(Position::new(13.0827, 80.2707), &contacts(), &AlertSender::default(), None)
            .await
            .unwrap();

        assert_eq!(result.mode, AlertMode::Live);
        assert_eq!(result.total_contacts, 3);
        assert_eq!(result.delivered, 2);
        assert_eq!(result.failed, 1);
        assert!(result.success);
        assert_eq!(result.attempts[1].status, AttemptStatus::Failed);
        assert!(result.attempts[1].error.as_deref().unwrap_or("").contains("invalid"));
        assert_eq!(result.attempts[2].status, AttemptStatus::Delivered);
        assert!(result.alert_id.starts_with("EMG-"));

        // Same body to everyone
        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].body, sent[1].body);
        assert_eq!(sent[0].from, "+15550001111");
    }

    #[tokio::test]
    async fn test_all_rejected_is_not_success() {
        let transport = Arc::new(RecordingTransport {
            reject: contacts().into_iter().map(|c| c.phone).collect(),
            ..Default::default()
        });
        let result = Dispatcher::new(Some(transport))
            .dispatch(Position::new(1.0, 2.0), &contacts(), &AlertSender::default(), None)
            .await
            .unwrap();
        assert_eq!(result.delivered, 0);
        assert_eq!(result.failed, 3);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_call_error() {
        let transport = Arc::new(RecordingTransport {
            unreachable: true,
            ..Default::default()
        });
        let err = Dispatcher::new(Some(transport))
            .dispatch(Position::new(1.0, 2.0), &contacts(), &AlertSender::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TransportUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_simulates() {
        let dispatcher = Dispatcher::simulated();
        let result = dispatcher
            .dispatch(Position::new(13.0827, 80.2707), &contacts(), &AlertSender::default(), None)
            .await
            .unwrap();

        assert_eq!(result.mode, AlertMode::Simulated);
        assert_eq!(result.simulated, 3);
        assert!(result.success);
        assert!(result.warning.is_some());
        assert!(result
            .attempts
            .iter()
            .all(|a| a.status == AttemptStatus::Simulated));
        assert_eq!(
            result.map_link,
            "https://www.google.com/maps?q=13.082700,80.270700"
        );
        assert!(!dispatcher.status().configured);
    }

    #[tokio::test]
    async fn test_no_contacts() {
        let err = Dispatcher::simulated()
            .dispatch(Position::fallback(), &[], &AlertSender::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::NoContacts);
    }

    #[test]
    fn test_status_reports_sender() {
        let dispatcher = Dispatcher::new(Some(Arc::new(RecordingTransport::default())));
        let status = dispatcher.status();
        assert!(status.configured);
        assert_eq!(status.from_number.as_deref(), Some("+15550001111"));
    }
}
