use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("calendar error: {0}")]
    Calendar(String),

    #[error("calendar call timed out: {0}")]
    Timeout(&'static str),

    #[error("messaging error: {0}")]
    Messaging(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Calendar(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Messaging(_) => StatusCode::BAD_GATEWAY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::FORBIDDEN,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::Config("bad".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Calendar("down".to_string()), StatusCode::BAD_GATEWAY),
            (AppError::Timeout("query_busy"), StatusCode::GATEWAY_TIMEOUT),
            (AppError::Messaging("down".to_string()), StatusCode::BAD_GATEWAY),
            (AppError::BadRequest("empty".to_string()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized, StatusCode::FORBIDDEN),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
