use std::sync::Arc;

use base64::Engine as _;
use tracing::{error, warn};

use crate::models::generation::GenerationResult;
use crate::models::image::EncodedImage;
use crate::services::gemini::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationBackend,
    GenerationConfig, GenerationError, InlineData, Part,
};

pub const TRY_ON_INSTRUCTION: &str = "Take the clothing item(s) from the subsequent image(s) and realistically place it onto the person in the first image. If there are two clothing items, layer them naturally (e.g., a jacket over a shirt). Make sure the fit, perspective, and lighting look natural. The output should be just the final image.";

pub const MAX_GARMENTS: usize = 2;

const DEFAULT_RESULT_MIME: &str = "image/png";

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("Failed to generate virtual try-on image.")]
    Initiate(#[source] GenerationError),

    #[error("Failed to edit virtual try-on image.")]
    Refine(#[source] GenerationError),

    #[error("Expected 1 to {max} garment images, got {0}", max = MAX_GARMENTS)]
    GarmentCount(usize),
}

pub struct Translator {
    backend: Arc<dyn GenerationBackend>,
}

impl Translator {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    /// Composites `garments` (in order, base layer first) onto `subject`.
    pub async fn initiate(
        &self,
        subject: &EncodedImage,
        garments: &[EncodedImage],
    ) -> Result<GenerationResult, TranslateError> {
        let request = build_try_on_request(subject, garments)?;
        self.send(&request).await.map_err(|e| {
            error!(error = %e, garments = garments.len(), "Try-on generation failed");
            TranslateError::Initiate(e)
        })
    }

    /// Applies a free-text edit to a previously generated image.
    pub async fn refine(
        &self,
        prior: &EncodedImage,
        instruction: &str,
    ) -> Result<GenerationResult, TranslateError> {
        let request = build_refine_request(prior, instruction);
        self.send(&request).await.map_err(|e| {
            error!(error = %e, "Try-on edit failed");
            TranslateError::Refine(e)
        })
    }

    async fn send(&self, request: &GenerateContentRequest) -> Result<GenerationResult, GenerationError> {
        let response = self.backend.generate_content(request).await?;
        parse_response(&response)
    }
}

fn image_part(image: &EncodedImage) -> Part {
    Part::InlineData {
        inline_data: InlineData {
            mime_type: image.mime_type.clone(),
            data: image.to_base64(),
        },
    }
}

fn single_turn(parts: Vec<Part>) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig::image_and_text(),
    }
}

pub fn build_try_on_request(
    subject: &EncodedImage,
    garments: &[EncodedImage],
) -> Result<GenerateContentRequest, TranslateError> {
    if garments.is_empty() || garments.len() > MAX_GARMENTS {
        return Err(TranslateError::GarmentCount(garments.len()));
    }

    let mut parts = Vec::with_capacity(garments.len() + 2);
    parts.push(image_part(subject));
    parts.extend(garments.iter().map(image_part));
    parts.push(Part::Text {
        text: TRY_ON_INSTRUCTION.to_string(),
    });

    Ok(single_turn(parts))
}

pub fn build_refine_request(prior: &EncodedImage, instruction: &str) -> GenerateContentRequest {
    single_turn(vec![
        image_part(prior),
        Part::Text {
            text: instruction.to_string(),
        },
    ])
}

/// Takes the first inline image and the first non-empty text from the first
/// candidate. Later parts of either kind are ignored.
pub fn parse_response(response: &GenerateContentResponse) -> Result<GenerationResult, GenerationError> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        warn!(block_reason = %reason, "Gemini blocked the prompt");
    }

    let Some(candidate) = response.candidates.first() else {
        warn!("Gemini response contained no candidates");
        return Ok(GenerationResult::default());
    };

    if let Some(reason) = candidate.finish_reason.as_deref().filter(|r| *r != "STOP") {
        warn!(finish_reason = %reason, "Gemini candidate finished early");
    }

    let parts = candidate
        .content
        .as_ref()
        .map(|c| c.parts.as_slice())
        .unwrap_or_default();

    let mut result = GenerationResult::default();
    for part in parts {
        if result.image.is_none() {
            if let Some(inline) = &part.inline_data {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(inline.data.as_bytes())
                    .map_err(|e| GenerationError::Decode(format!("inline image data: {}", e)))?;
                let mime_type = inline
                    .mime_type
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_RESULT_MIME.to_string());
                result.image = Some(EncodedImage::new(bytes, mime_type));
            }
        }
        if result.text.is_none() {
            if let Some(text) = part.text.as_ref().filter(|t| !t.is_empty()) {
                result.text = Some(text.clone());
            }
        }
        if result.image.is_some() && result.text.is_some() {
            break;
        }
    }

    if result.image.is_none() {
        warn!("Model response did not contain an image part");
    }

    Ok(result)
}
