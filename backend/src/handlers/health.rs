use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime: f64,
    pub model: String,
    pub session_status: &'static str,
}

static START_TIME: OnceLock<Instant> = OnceLock::new();

pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let uptime = START_TIME
        .get()
        .map(|s| s.elapsed().as_secs_f64())
        .unwrap_or(0.0);

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime,
        model: state.config.gemini_model.clone(),
        session_status: state.studio.view().status,
    })
}

pub async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "apiVersion": "v1",
        "buildHash": env!("CARGO_PKG_VERSION")
    }))
}
