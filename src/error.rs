use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    /// A title-search provider answered about a different title than the one queried
    #[error("Provider {provider} resolved {found} instead of {expected}")]
    ProviderMismatch {
        provider: &'static str,
        expected: String,
        found: String,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Cache(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::ExternalApi(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::HttpClient(_) | AppError::ProviderMismatch { .. } => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl AppError {
    /// Copies the error for delivery to several waiters
    ///
    /// Errors wrapping a foreign source keep their message but become
    /// `ExternalApi` (HTTP) or `Internal` (cache).
    pub fn replicate(&self) -> AppError {
        match self {
            AppError::Cache(e) => AppError::Internal(format!("Cache error: {}", e)),
            AppError::HttpClient(e) => AppError::ExternalApi(e.to_string()),
            AppError::NotFound(msg) => AppError::NotFound(msg.clone()),
            AppError::InvalidInput(msg) => AppError::InvalidInput(msg.clone()),
            AppError::ExternalApi(msg) => AppError::ExternalApi(msg.clone()),
            AppError::ProviderMismatch {
                provider,
                expected,
                found,
            } => AppError::ProviderMismatch {
                provider,
                expected: expected.clone(),
                found: found.clone(),
            },
            AppError::Timeout(msg) => AppError::Timeout(msg.clone()),
            AppError::Internal(msg) => AppError::Internal(msg.clone()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = AppError::NotFound("tt0000001".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_provider_mismatch_message() {
        let err = AppError::ProviderMismatch {
            provider: "tastedive",
            expected: "tt1375666".to_string(),
            found: "tt0816692".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Provider tastedive resolved tt0816692 instead of tt1375666"
        );
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_replicate_keeps_kind() {
        let original = AppError::NotFound("no recommendations".to_string());
        assert!(matches!(original.replicate(), AppError::NotFound(msg) if msg == "no recommendations"));

        let timeout = AppError::Timeout("tmdb".to_string());
        assert_eq!(
            timeout.replicate().into_response().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
