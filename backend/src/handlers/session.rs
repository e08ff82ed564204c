use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::error::AppError;
use crate::models::session::SessionView;
use crate::AppState;

pub const DOWNLOAD_FILENAME: &str = "stylefit-try-on.png";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineRequest {
    pub instruction: String,
}

pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.studio.view())
}

pub async fn reset_session(State(state): State<Arc<AppState>>) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.studio.reset()?))
}

pub async fn try_on(State(state): State<Arc<AppState>>) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.studio.try_on().await?))
}

pub async fn refine(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RefineRequest>, JsonRejection>,
) -> Result<Json<SessionView>, AppError> {
    let Json(req) = payload?;
    Ok(Json(state.studio.refine(&req.instruction).await?))
}

pub async fn download_result(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let result = state.studio.result().ok_or(AppError::NoResult)?;
    let etag = format!("\"{}\"", result.image.sha256_hex());

    let unchanged = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == etag);
    if unchanged {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let content_type = HeaderValue::from_str(&result.image.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let etag = HeaderValue::from_str(&etag)
        .map_err(|e| AppError::Internal(format!("Invalid ETag: {}", e)))?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", DOWNLOAD_FILENAME))
        .map_err(|e| AppError::Internal(format!("Invalid Content-Disposition: {}", e)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::ETAG, etag),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        result.image.bytes,
    )
        .into_response())
}
