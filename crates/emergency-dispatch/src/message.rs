//! SMS body templating

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_HEADLINE: &str = "🚨 Emergency alert from a SafeRoute user";
const CONSENT_FOOTER: &str = "This alert was sent via SafeRoute with user consent.";

/// Identity of the person raising the alert
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSender {
    pub name: Option<String>,
    /// Call-back number
    pub phone: Option<String>,
}

/// Google Maps link, 6 decimal places
pub fn map_link(lat: f64, lng: f64) -> String {
    format!("https://www.google.com/maps?q={:.6},{:.6}", lat, lng)
}

fn headline(sender: &AlertSender, custom: Option<&str>) -> String {
    match (custom.map(str::trim).filter(|m| !m.is_empty()), &sender.name) {
        (Some(message), _) => message.to_string(),
        (None, Some(name)) => format!("🚨 EMERGENCY ALERT from {}", name),
        (None, None) => DEFAULT_HEADLINE.to_string(),
    }
}

/// Build the SMS text sent to every contact
///
/// A custom message replaces the headline; location, map link, call-back
/// number, timestamp and consent footer are always present.
pub fn build_sms_body(
    sender: &AlertSender,
    lat: f64,
    lng: f64,
    custom: Option<&str>,
    sent_at: DateTime<Utc>,
) -> String {
    let mut lines = vec![
        headline(sender, custom),
        String::new(),
        format!("📍 Location: {:.6}, {:.6}", lat, lng),
        format!("🗺️ Map: {}", map_link(lat, lng)),
    ];
    if let Some(phone) = &sender.phone {
        lines.push(format!("📞 Call back: {}", phone));
    }
    lines.push(String::new());
    lines.push(format!("⏱️ Sent at: {}", sent_at.format("%d %b %Y, %H:%M:%S UTC")));
    lines.push(String::new());
    lines.push(CONSENT_FOOTER.to_string());

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sent_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 22, 15, 4).unwrap()
    }

    #[test]
    fn test_map_link_precision() {
        assert_eq!(
            map_link(13.0827, 80.2707),
            "https://www.google.com/maps?q=13.082700,80.270700"
        );
        assert_eq!(
            map_link(-33.8688197, 151.2093),
            "https://www.google.com/maps?q=-33.868820,151.209300"
        );
    }

    #[test]
    fn test_full_body() {
        let sender = AlertSender {
            name: Some("Priya".to_string()),
            phone: Some("+919800000000".to_string()),
        };
        let body = build_sms_body(&sender, 13.0827, 80.2707, None, sent_at());
        let expected = [
            "🚨 EMERGENCY ALERT from Priya",
            "",
            "📍 Location: 13.082700, 80.270700",
            "🗺️ Map: https://www.google.com/maps?q=13.082700,80.270700",
            "📞 Call back: +919800000000",
            "",
            "⏱️ Sent at: 09 Mar 2024, 22:15:04 UTC",
            "",
            "This alert was sent via SafeRoute with user consent.",
        ]
        .join("\n");
        assert_eq!(body, expected);
    }

    #[test]
    fn test_custom_message_replaces_headline_only() {
        let body = build_sms_body(
            &AlertSender::default(),
            13.0827,
            80.2707,
            Some("Being followed near the station"),
            sent_at(),
        );
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "Being followed near the station");
        assert!(body.contains("maps?q=13.082700,80.270700"));
        assert!(body.ends_with(CONSENT_FOOTER));
        // No call-back line without a sender phone
        assert!(!body.contains("Call back"));
    }

    #[test]
    fn test_blank_custom_message_ignored() {
        let body = build_sms_body(&AlertSender::default(), 1.0, 2.0, Some("   "), sent_at());
        assert!(body.starts_with(DEFAULT_HEADLINE));
    }
}
