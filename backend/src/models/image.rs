use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::error::AppError;

/// An uploaded or generated image held in memory exactly as received.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub original_filename: Option<String>,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            original_filename: None,
        }
    }

    /// Intake boundary: accepts anything whose content type is `image/*`.
    pub fn from_upload(
        bytes: Vec<u8>,
        content_type: &str,
        filename: Option<String>,
        max_bytes: u64,
    ) -> Result<Self, AppError> {
        let mime_type = content_type.trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(AppError::InvalidMimeType(content_type.to_string()));
        }
        if bytes.is_empty() {
            return Err(AppError::ValidationError("Uploaded file is empty".to_string()));
        }
        if bytes.len() as u64 > max_bytes {
            return Err(AppError::FileTooLarge(bytes.len() as u64));
        }

        Ok(Self {
            bytes,
            mime_type,
            original_filename: filename.filter(|f| !f.is_empty()),
        })
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn sha256_hex(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }

    pub fn summary(&self) -> ImageSummary {
        ImageSummary {
            filename: self.original_filename.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.bytes.len() as u64,
        }
    }
}

// Image payloads are large; keep logs and panics readable.
impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("original_filename", &self.original_filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub filename: Option<String>,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Upload slots shown in the UI. Garments are layered in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Slot {
    #[serde(rename = "subject")]
    Subject,
    #[serde(rename = "garment-1")]
    Garment1,
    #[serde(rename = "garment-2")]
    Garment2,
}

impl Slot {
    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Subject => "subject",
            Slot::Garment1 => "garment-1",
            Slot::Garment2 => "garment-2",
        }
    }
}

impl FromStr for Slot {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subject" => Ok(Slot::Subject),
            "garment-1" | "garment1" => Ok(Slot::Garment1),
            "garment-2" | "garment2" => Ok(Slot::Garment2),
            other => Err(AppError::UnknownSlot(other.to_string())),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_any_image_subtype() {
        let image = EncodedImage::from_upload(vec![1, 2, 3], "image/webp", Some("a.webp".into()), 10).unwrap();
        assert_eq!(image.mime_type, "image/webp");
        assert_eq!(image.original_filename.as_deref(), Some("a.webp"));
    }

    #[test]
    fn rejects_non_image_content_type() {
        let err = EncodedImage::from_upload(vec![1], "application/pdf", None, 10).unwrap_err();
        assert!(matches!(err, AppError::InvalidMimeType(m) if m == "application/pdf"));
    }

    #[test]
    fn rejects_empty_and_oversized_files() {
        assert!(matches!(
            EncodedImage::from_upload(vec![], "image/png", None, 10),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            EncodedImage::from_upload(vec![0; 11], "image/png", None, 10),
            Err(AppError::FileTooLarge(11))
        ));
    }

    #[test]
    fn content_type_is_normalized() {
        let image = EncodedImage::from_upload(vec![1], " Image/PNG ", Some(String::new()), 10).unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.original_filename, None);
    }

    #[test]
    fn slot_names_round_trip_through_parse() {
        for slot in [Slot::Subject, Slot::Garment1, Slot::Garment2] {
            assert_eq!(slot.as_str().parse::<Slot>().unwrap(), slot);
        }
        assert!(matches!("hat".parse::<Slot>(), Err(AppError::UnknownSlot(_))));
    }

    #[test]
    fn debug_output_omits_bytes() {
        let image = EncodedImage::new(vec![0; 4096], "image/png");
        let debug = format!("{:?}", image);
        assert!(debug.contains("len: 4096"));
        assert!(debug.len() < 200);
    }
}
