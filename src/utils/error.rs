use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::time::Duration;
use thiserror::Error;

use crate::api::types::ErrorResponse;

#[derive(Debug, Error)]
pub enum RdsPoolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Token generation failed: {0}")]
    TokenGeneration(String),

    #[error("Failed to open database connection: {0}")]
    ConnectionOpen(String),

    #[error("Connection pool exhausted: no connection available within {0:?}")]
    PoolExhausted(Duration),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Invalid event: {0}")]
    Decode(String),
}

impl RdsPoolError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RdsPoolError::PoolExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            RdsPoolError::Decode(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.kind(), self.to_string(), self.status_code().as_u16())
    }

    fn kind(&self) -> &'static str {
        match self {
            RdsPoolError::Io(_) => "IoError",
            RdsPoolError::Config(_) => "ConfigError",
            RdsPoolError::TokenGeneration(_) => "TokenGenerationError",
            RdsPoolError::ConnectionOpen(_) => "ConnectionError",
            RdsPoolError::PoolExhausted(_) => "PoolExhausted",
            RdsPoolError::Query(_) => "QueryError",
            RdsPoolError::Decode(_) => "BadRequest",
        }
    }
}

impl IntoResponse for RdsPoolError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.error_response())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, RdsPoolError>;
