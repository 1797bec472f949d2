use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::protocol::ProtocolError;

#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    UnknownSession(String),
    UnsupportedMethod(String),
    PayloadTooLarge(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "invalid_request",
            AppError::UnknownSession(_) => "unknown_session",
            AppError::UnsupportedMethod(_) => "unsupported_method",
            AppError::PayloadTooLarge(_) => "payload_too_large",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UnknownSession(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UnsupportedMethod(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Internal(e) => {
                tracing::error!("internal error: {e}");
                "internal server error".to_string()
            }
            AppError::BadRequest(msg) => msg.clone(),
            AppError::UnknownSession(sid) => format!("unknown session id: {sid}"),
            AppError::UnsupportedMethod(method) => format!("unsupported method: {method}"),
            AppError::PayloadTooLarge(msg) => msg.clone(),
        }
    }

    /// Errors after which the client must not reuse the connection.
    fn closes_connection(&self) -> bool {
        matches!(
            self,
            AppError::UnknownSession(_) | AppError::UnsupportedMethod(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.message()
            }
        });

        let mut response = (status, Json(body)).into_response();
        if self.closes_connection() {
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
        response
    }
}

impl From<ProtocolError> for AppError {
    fn from(e: ProtocolError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}
