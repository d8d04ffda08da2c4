//! Gateway configuration, read once from the environment at startup

use emergency_dispatch::TwilioConfig;
use risk_engine::deviation::DEFAULT_DEVIATION_THRESHOLD_M;
use risk_engine::session::{DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW};
use risk_engine::{Waypoint, DEFAULT_CENTER_LAT, DEFAULT_CENTER_LNG};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_PORT: u16 = 18700;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    /// Base URL of the risk prediction service
    pub ml_url: Option<String>,
    /// Map center for new sessions and fallback alert location
    pub default_center: Waypoint,
    pub deviation_threshold_m: u32,
    pub rate_limit: usize,
    pub rate_window: Duration,
    pub twilio: Option<TwilioConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            ml_url: None,
            default_center: Waypoint::new(DEFAULT_CENTER_LAT, DEFAULT_CENTER_LNG),
            deviation_threshold_m: DEFAULT_DEVIATION_THRESHOLD_M,
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window: DEFAULT_RATE_WINDOW,
            twilio: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let port = lookup("SAFEROUTE_GATEWAY_PORT").or_else(|| lookup("PORT"));

        let center = Waypoint::new(
            parse_or(&lookup, "SAFEROUTE_DEFAULT_LAT", defaults.default_center.lat),
            parse_or(&lookup, "SAFEROUTE_DEFAULT_LNG", defaults.default_center.lng),
        );
        let default_center = match center.validate() {
            Ok(()) => center,
            Err(e) => {
                warn!("Ignoring default center: {}", e);
                defaults.default_center
            }
        };

        Self {
            port: port
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            ml_url: lookup("SAFEROUTE_ML_URL").filter(|u| !u.trim().is_empty()),
            default_center,
            deviation_threshold_m: parse_or(
                &lookup,
                "SAFEROUTE_DEVIATION_THRESHOLD_M",
                defaults.deviation_threshold_m,
            ),
            rate_limit: parse_or(&lookup, "SAFEROUTE_RATE_LIMIT", defaults.rate_limit),
            rate_window: Duration::from_secs(parse_or(
                &lookup,
                "SAFEROUTE_RATE_WINDOW_SECS",
                defaults.rate_window.as_secs(),
            )),
            twilio: TwilioConfig::new(
                lookup("TWILIO_ACCOUNT_SID"),
                lookup("TWILIO_AUTH_TOKEN"),
                lookup("TWILIO_PHONE_NUMBER"),
            ),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {}={:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> GatewayConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.port, 18700);
        assert_eq!(c.deviation_threshold_m, 300);
        assert_eq!(c.rate_limit, 100);
        assert_eq!(c.rate_window, Duration::from_secs(60));
        assert!(c.ml_url.is_none());
        assert!(c.twilio.is_none());
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("PORT", "9000"),
            ("SAFEROUTE_ML_URL", "http://localhost:5000"),
            ("SAFEROUTE_DEFAULT_LAT", "12.9716"),
            ("SAFEROUTE_DEFAULT_LNG", "77.5946"),
            ("SAFEROUTE_RATE_LIMIT", "5"),
            ("TWILIO_ACCOUNT_SID", "AC1"),
            ("TWILIO_AUTH_TOKEN", "tok"),
            ("TWILIO_PHONE_NUMBER", "+15550001111"),
        ]);
        assert_eq!(c.port, 9000);
        assert_eq!(c.ml_url.as_deref(), Some("http://localhost:5000"));
        assert_eq!(c.default_center, Waypoint::new(12.9716, 77.5946));
        assert_eq!(c.rate_limit, 5);
        assert!(c.twilio.is_some());
    }

    #[test]
    fn test_gateway_port_wins_and_bad_values_fall_back() {
        let c = config(&[
            ("SAFEROUTE_GATEWAY_PORT", "18800"),
            ("PORT", "9000"),
            ("SAFEROUTE_RATE_LIMIT", "lots"),
            ("SAFEROUTE_DEFAULT_LAT", "123.0"),
        ]);
        assert_eq!(c.port, 18800);
        assert_eq!(c.rate_limit, 100);
        assert_eq!(c.default_center.lat, DEFAULT_CENTER_LAT);
    }
}
