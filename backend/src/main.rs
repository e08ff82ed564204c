mod handlers;
mod models;
mod services;

use std::sync::Arc;
use axum::{
    Router,
    middleware,
    extract::Request,
    http::{HeaderValue, Method, header::{self, HeaderName}},
    response::Response,
    body::Body,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use models::config::AppConfig;
use services::gemini::GeminiClient;
use services::studio::Studio;
use services::translator::Translator;

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub studio: Studio,
}

/// Headers that must never appear in logs.
const SENSITIVE_HEADERS: &[&str] = &[
    "x-goog-api-key",
    "authorization",
    "cookie",
];

const REQUEST_ID_HEADER: &str = "x-request-id";

fn is_sensitive_header(name: &HeaderName) -> bool {
    let lower = name.as_str();
    SENSITIVE_HEADERS.iter().any(|&s| lower == s)
}

async fn request_id_middleware(
    request: Request<Body>,
    next: axum::middleware::Next,
) -> Response {
    let mut response = next.run(request).await;
    // Problem responses already carry the id quoted in their body.
    if !response.headers().contains_key(REQUEST_ID_HEADER) {
        let request_id = uuid::Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
    }
    response
}

fn build_router(state: Arc<AppState>) -> Router {
    let config = state.config.clone();

    let cors_origins: Vec<HeaderValue> = config.allowed_origins.iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
        .expose_headers([
            HeaderName::from_static("x-request-id"),
            header::CONTENT_DISPOSITION,
            header::ETAG,
        ]);

    let api_v1 = Router::new()
        .route("/session", axum::routing::get(handlers::session::get_session))
        .route("/session/reset", axum::routing::post(handlers::session::reset_session))
        .route("/images/:slot", axum::routing::post(handlers::images::upload_image))
        .route("/images/:slot", axum::routing::delete(handlers::images::clear_image))
        .route("/try-on", axum::routing::post(handlers::session::try_on))
        .route("/refine", axum::routing::post(handlers::session::refine))
        .route("/result", axum::routing::get(handlers::session::download_result));

    // Trace layer that redacts credential headers from log output
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            let safe_headers: Vec<String> = request
                .headers()
                .keys()
                .map(|name| {
                    if is_sensitive_header(name) {
                        format!("{}=[REDACTED]", name)
                    } else {
                        let val = request
                            .headers()
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("");
                        format!("{}={}", name, val)
                    }
                })
                .collect();

            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                headers = %safe_headers.join(", "),
            )
        })
        .on_response(|response: &Response, latency: std::time::Duration, _span: &Span| {
            tracing::info!(
                status = response.status().as_u16(),
                latency_ms = latency.as_millis() as u64,
                "response",
            );
        });

    // Multipart framing adds a little on top of the file itself.
    let body_limit = (config.max_upload_bytes as usize).saturating_add(64 * 1024);

    Router::new()
        .nest("/api/v1", api_v1)
        .route("/", axum::routing::get(handlers::ui::index))
        .route("/api/health", axum::routing::get(handlers::health::health_check))
        .route("/api/version", axum::routing::get(handlers::health::version))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    handlers::health::init_start_time();

    let config = Arc::new(config);
    let gemini = Arc::new(GeminiClient::new(&config));
    tracing::info!(model = %gemini.model(), "Gemini client ready");

    let state = Arc::new(AppState {
        config: config.clone(),
        studio: Studio::new(Translator::new(gemini)),
    });

    let app = build_router(state);

    let addr = config.listen_addr.clone();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
