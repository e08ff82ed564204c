use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::config::AppConfig;

// ---------------------------------------------------------------------------
// Wire types: generateContent request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

// Base64 payloads would swamp debug logs.
impl std::fmt::Debug for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Part::Text { text } => f.debug_struct("Text").field("text", text).finish(),
            Part::InlineData { inline_data } => f
                .debug_struct("InlineData")
                .field("mime_type", &inline_data.mime_type)
                .field("data_len", &inline_data.data.len())
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
}

impl GenerationConfig {
    pub fn image_and_text() -> Self {
        Self {
            response_modalities: vec!["IMAGE".to_string(), "TEXT".to_string()],
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types: generateContent response
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<ResponseContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePart {
    pub text: Option<String>,
    pub inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInlineData {
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Gemini API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Gemini API quota exceeded")]
    QuotaExceeded,

    #[error("Gemini API key was rejected")]
    InvalidKey,

    #[error("Gemini rejected the request: {0}")]
    BadRequest(String),

    #[error("Gemini API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Gemini API error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("Failed to decode Gemini response: {0}")]
    Decode(String),
}

/// Anything that can answer a `generateContent` call.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GenerationError>;
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &AppConfig) -> Self {
        Self {
            client,
            api_key: config.gemini_api_key.clone(),
            endpoint: endpoint_for(&config.gemini_api_base, &config.gemini_model),
            model: config.gemini_model.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn endpoint_for(api_base: &str, model: &str) -> String {
    format!("{}/models/{}:generateContent", api_base.trim_end_matches('/'), model)
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GenerationError> {
        let part_count: usize = request.contents.iter().map(|c| c.parts.len()).sum();
        info!(model = %self.model, parts = part_count, "Sending generateContent request to Gemini");

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::QuotaExceeded);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GenerationError::InvalidKey);
        }
        if status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::BadRequest(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let parsed = decode_response(&body)?;
        debug!(candidates = parsed.candidates.len(), "Gemini response decoded");
        Ok(parsed)
    }
}

fn decode_response(body: &[u8]) -> Result<GenerateContentResponse, GenerationError> {
    let parsed: GenerateContentResponse =
        serde_json::from_slice(body).map_err(|e| GenerationError::Decode(e.to_string()))?;

    if let Some(error) = parsed.error {
        return Err(GenerationError::Api {
            code: error.code,
            message: error.message,
        });
    }

    Ok(parsed)
}
