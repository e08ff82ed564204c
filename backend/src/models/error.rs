use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Serialize, Deserialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetail {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    pub request_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("A try-on or edit is already in progress")]
    Busy,

    #[error("No generated image available")]
    NoResult,

    #[error("Unknown image slot: {0}")]
    UnknownSlot(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("File too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("Invalid MIME type: {0}")]
    InvalidMimeType(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Busy => StatusCode::CONFLICT,
            AppError::NoResult => StatusCode::NOT_FOUND,
            AppError::UnknownSlot(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::InvalidMimeType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_problem_detail(&self, request_id: &str) -> ProblemDetail {
        let (code, title, detail) = match self {
            AppError::Busy => (
                "SESSION_BUSY",
                "Session Busy",
                "Wait for the current try-on or edit to finish".to_string(),
            ),
            AppError::NoResult => (
                "NO_RESULT",
                "No Result",
                "There is no generated image to download yet".to_string(),
            ),
            AppError::UnknownSlot(slot) => (
                "UNKNOWN_SLOT",
                "Unknown Slot",
                format!("'{}' is not one of subject, garment-1, garment-2", slot),
            ),
            AppError::ValidationError(field) => (
                "VALIDATION_ERROR",
                "Validation Error",
                field.clone(),
            ),
            AppError::FileTooLarge(size) => (
                "FILE_TOO_LARGE",
                "File Too Large",
                format!("File size {} exceeds maximum allowed", size),
            ),
            AppError::InvalidMimeType(mime) => (
                "INVALID_MIME_TYPE",
                "Invalid MIME Type",
                format!("MIME type '{}' is not an image type", mime),
            ),
            AppError::Internal(detail) => (
                "INTERNAL_ERROR",
                "Internal Error",
                detail.clone(),
            ),
        };

        ProblemDetail {
            problem_type: format!("https://stylefit.dev/problems/{}", code.to_lowercase()),
            title: title.to_string(),
            status: self.status().as_u16(),
            detail,
            code: code.to_string(),
            request_id: request_id.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // request_id_middleware keeps this header, so the body and header agree.
        let request_id = uuid::Uuid::new_v4().to_string();
        let problem = self.to_problem_detail(&request_id);

        let mut response = (self.status(), Json(problem)).into_response();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("X-Request-Id", value);
        }
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
