use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::models::error::AppError;
use crate::models::image::{EncodedImage, Slot};
use crate::models::session::SessionView;
use crate::AppState;

pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Path(slot): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<SessionView>, AppError> {
    let slot: Slot = slot.parse()?;

    // The body limit cuts the stream off mid-read; report it as an oversized file.
    let declared_size = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(state.config.max_upload_bytes);
    let read_error = |context: &str, e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::FileTooLarge(declared_size)
        } else {
            AppError::ValidationError(format!("{}: {}", context, e))
        }
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| read_error("Multipart error", e))?
    {
        // Skip plain form fields; only a file part carries the image.
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let data = field
            .bytes()
            .await
            .map_err(|e| read_error("Failed to read upload", e))?;

        let image = EncodedImage::from_upload(
            data.to_vec(),
            &content_type,
            Some(filename),
            state.config.max_upload_bytes,
        )?;

        return Ok(Json(state.studio.set_image(slot, image)));
    }

    Err(AppError::ValidationError("No file in upload".to_string()))
}

pub async fn clear_image(
    State(state): State<Arc<AppState>>,
    Path(slot): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let slot: Slot = slot.parse()?;
    Ok(Json(state.studio.clear_image(slot)))
}
