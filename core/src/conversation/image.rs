//! Photo attachments for vision turns.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const ACCEPTED_MEDIA_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    /// Base64 payload, optionally as a `data:` URL.
    pub data: String,
    pub media_type: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("unsupported image type '{0}', expected one of image/jpeg, image/png, image/webp")]
    UnsupportedType(String),

    #[error("image data is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("image is {size} bytes, over the {max} byte limit")]
    TooLarge { size: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLimits {
    pub max_bytes: usize,
    pub accepted_types: Vec<String>,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_bytes: MAX_IMAGE_BYTES,
            accepted_types: ACCEPTED_MEDIA_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl ImageAttachment {
    pub fn new(data: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            media_type: media_type.into(),
        }
    }

    /// Base64 payload without any `data:...;base64,` prefix.
    pub fn payload(&self) -> &str {
        let payload = match self.data.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, p)| p).unwrap_or(rest),
            None => &self.data,
        };
        payload.trim()
    }

    /// Check type, encoding and decoded size. Returns the decoded size.
    pub fn validate(&self, limits: &ImageLimits) -> Result<usize, ImageError> {
        let media_type = self.media_type.to_ascii_lowercase();
        if !limits.accepted_types.iter().any(|t| *t == media_type) {
            return Err(ImageError::UnsupportedType(self.media_type.clone()));
        }
        let bytes = STANDARD
            .decode(self.payload())
            .map_err(|e| ImageError::InvalidEncoding(e.to_string()))?;
        if bytes.len() > limits.max_bytes {
            return Err(ImageError::TooLarge {
                size: bytes.len(),
                max: limits.max_bytes,
            });
        }
        Ok(bytes.len())
    }
}
