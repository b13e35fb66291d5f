use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Persistence or upstream API unreachable or unconfigured.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Upstream answered, but without a success indicator or the expected field.
    #[error("Upstream data invalid: {0}")]
    UpstreamDataInvalid(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Collapse transport-level failures into the two kinds callers reason about.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(
            self,
            AppError::BackendUnavailable(_)
                | AppError::Http(_)
                | AppError::Database(_)
                | AppError::Io(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
