use anyhow::Result;
use axum::{extract::State, routing::get, Json, Router};
use emergency_dispatch::{Dispatcher, SmsTransport, TwilioTransport};
use risk_engine::predictor::HttpPredictor;
use risk_engine::{NullPredictor, RiskPredictor};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod emergency_routes;
mod error;
mod risk_routes;
mod state;

use config::GatewayConfig;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "saferoute_gateway=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env();

    let transport: Option<Arc<dyn SmsTransport>> = match &config.twilio {
        Some(twilio) => {
            tracing::info!("   SMS transport: Twilio ({})", twilio.from_number);
            Some(Arc::new(TwilioTransport::new(twilio.clone())))
        }
        None => {
            tracing::warn!("   SMS credentials not configured - alerts will be simulated");
            None
        }
    };

    let predictor: Arc<dyn RiskPredictor> = match &config.ml_url {
        Some(url) => {
            tracing::info!("   Risk predictor: {}", url);
            Arc::new(HttpPredictor::new(url.clone()))
        }
        None => Arc::new(NullPredictor),
    };

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        "   Default center: ({:.4}, {:.4}), deviation threshold {} m, {} grid refreshes per {:?}",
        config.default_center.lat,
        config.default_center.lng,
        config.deviation_threshold_m,
        config.rate_limit,
        config.rate_window
    );

    let state = AppState::new(config, Dispatcher::new(transport), predictor);
    let app = app(state);

    tracing::info!("🛡️  SafeRoute Gateway starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state.clone())
        .nest("/api/v1/risk", risk_routes::risk_router(state.clone()))
        .nest("/api/v1/emergency", emergency_routes::emergency_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "saferoute-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "sms_configured": state.dispatcher.status().configured,
        "predictor": state.predictor.name(),
        "sessions": state.sessions.len(),
    }))
}
