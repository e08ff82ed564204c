use crate::models::image::EncodedImage;

/// What one model call produced. Either half may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResult {
    pub image: Option<EncodedImage>,
    pub text: Option<String>,
}

impl GenerationResult {
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.text.is_none()
    }
}
