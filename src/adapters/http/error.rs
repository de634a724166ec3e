use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use tracing::warn;

use crate::application::dto::ErrorResponse;
use crate::domain::errors::DomainError;

/// Traducción de `DomainError` a respuesta HTTP con cuerpo `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DomainError::MissingInput | DomainError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        if self.0.is_processing() {
            format!("Failed to process image: {}", self.0)
        } else {
            self.0.to_string()
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.message();
        warn!("{} -> {}", status, error);
        (status, Json(ErrorResponse { error })).into_response()
    }
}
