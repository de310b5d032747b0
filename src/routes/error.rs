//! Mapping from domain errors to HTTP responses.
//!
//! Body is always `{ "error": "<message>" }`.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;

use crate::error::AirQualityError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Domain(AirQualityError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<AirQualityError> for ApiError {
    fn from(err: AirQualityError) -> Self {
        ApiError::Domain(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(err) => match err {
                AirQualityError::NoDataAvailable { .. } | AirQualityError::LocationNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                AirQualityError::InsufficientHistory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(message) => message,
            ApiError::Domain(err) => err.to_string(),
        };

        if status.is_server_error() {
            tracing::error!("request failed: {}", message);
        } else {
            tracing::debug!("request rejected ({}): {}", status, message);
        }

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
