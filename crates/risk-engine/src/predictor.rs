//! Risk prediction extension point
//!
//! A trained model lives outside this crate. `RiskPredictor` is the seam;
//! `NullPredictor` is the fallback when no model is wired in, and
//! `HttpPredictor` (feature `ml-service`) calls a remote prediction service.
//!
//! ```rust,ignore
//! let predictor = HttpPredictor::new("http://localhost:5000");
//! match predictor.predict(&RiskFeatures::for_hour(22)).await {
//!     Prediction::Score(score) => println!("model risk {}", score),
//!     Prediction::Unavailable => println!("using grid estimate"),
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Model input features (defaults match the prediction service)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFeatures {
    pub hour: u8,
    /// Street lighting 0-10
    pub lighting_score: f64,
    /// Distance to nearest police station (km)
    pub police_stn_dist: f64,
    pub past_incidents: u32,
    /// Crowd density 0-10
    pub crowd_density: f64,
}

impl Default for RiskFeatures {
    fn default() -> Self {
        Self {
            hour: 12,
            lighting_score: 5.0,
            police_stn_dist: 1.0,
            past_incidents: 0,
            crowd_density: 5.0,
        }
    }
}

impl RiskFeatures {
    pub fn for_hour(hour: u8) -> Self {
        Self {
            hour,
            ..Self::default()
        }
    }
}

/// Outcome of a prediction request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "risk_score", rename_all = "snake_case")]
pub enum Prediction {
    /// Risk 0-100
    Score(f64),
    Unavailable,
}

impl Prediction {
    pub fn score(&self) -> Option<f64> {
        match self {
            Prediction::Score(s) => Some(*s),
            Prediction::Unavailable => None,
        }
    }
}

#[async_trait]
pub trait RiskPredictor: Send + Sync {
    /// Never fails: any fault degrades to `Prediction::Unavailable`
    async fn predict(&self, features: &RiskFeatures) -> Prediction;

    fn name(&self) -> &str;
}

/// Predictor used when no model service is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPredictor;

#[async_trait]
impl RiskPredictor for NullPredictor {
    async fn predict(&self, _features: &RiskFeatures) -> Prediction {
        Prediction::Unavailable
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Clamp a raw model output into [0, 100], 2 decimals
pub fn clamp_score(raw: f64) -> Prediction {
    if raw.is_finite() {
        Prediction::Score(crate::round2(raw.clamp(0.0, 100.0)))
    } else {
        Prediction::Unavailable
    }
}

#[cfg(feature = "ml-service")]
pub use http::HttpPredictor;

#[cfg(feature = "ml-service")]
mod http {
    use super::{clamp_score, Prediction, RiskFeatures, RiskPredictor};
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::time::Duration;
    use tracing::warn;

    #[derive(Debug, Deserialize)]
    struct PredictResponse {
        risk_score: f64,
    }

    /// Client for a remote `/ml/predict` endpoint
    pub struct HttpPredictor {
        base_url: String,
        client: reqwest::Client,
    }

    impl HttpPredictor {
        pub fn new(base_url: impl Into<String>) -> Self {
            Self::with_timeout(base_url, Duration::from_secs(5))
        }

        pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new());

            Self {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                client,
            }
        }

        async fn request(&self, features: &RiskFeatures) -> Result<f64, String> {
            let url = format!("{}/ml/predict", self.base_url);
            let response = self
                .client
                .post(&url)
                .json(features)
                .send()
                .await
                .map_err(|e| e.to_string())?;

            if !response.status().is_success() {
                return Err(format!("prediction service returned {}", response.status()));
            }

            let body: PredictResponse = response.json().await.map_err(|e| e.to_string())?;
            Ok(body.risk_score)
        }
    }

    #[async_trait]
    impl RiskPredictor for HttpPredictor {
        async fn predict(&self, features: &RiskFeatures) -> Prediction {
            match self.request(features).await {
                Ok(raw) => clamp_score(raw),
                Err(e) => {
                    warn!("Prediction service unreachable, using grid estimate: {}", e);
                    Prediction::Unavailable
                }
            }
        }

        fn name(&self) -> &str {
            "http"
        }
    }
}
