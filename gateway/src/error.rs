//! Error to HTTP status mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use emergency_dispatch::DispatchError;
use risk_engine::EngineError;
use serde::Serialize;
use thiserror::Error;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(EngineError::InvalidParameter(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Dispatch(DispatchError::ConsentRequired)
            | ApiError::Dispatch(DispatchError::NoContacts) => StatusCode::BAD_REQUEST,
            ApiError::Dispatch(DispatchError::NotArming) => StatusCode::CONFLICT,
            ApiError::Dispatch(DispatchError::TransportUnavailable(_)) => StatusCode::BAD_GATEWAY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
