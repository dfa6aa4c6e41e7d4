//! Upload validation for the analysis pipeline
//!
//! Checks size and format before anything is hashed, and derives the format
//! tag used in the provider's data URI.

use crate::config::ImageConfig;
use crate::constants::{ACCEPTED_IMAGE_FORMATS, DEFAULT_IMAGE_FORMAT};
use crate::error::{AnalyzerError, AnalyzerResult};
use std::path::Path;

/// Raw upload as received from a caller
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Vec<u8>>, filename: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.map(str::to_string),
        }
    }
}

/// Pixel dimensions read from an image header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_size_bytes: u64,
    max_width: u32,
    max_height: u32,
}

impl UploadValidator {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            max_size_bytes: config.max_size_bytes(),
            max_width: config.max_width,
            max_height: config.max_height,
        }
    }

    /// Validate an upload and return its data-URI format tag
    pub fn validate(&self, upload: &ImageUpload) -> AnalyzerResult<String> {
        if upload.bytes.is_empty() {
            return Err(AnalyzerError::validation("Image content must not be empty"));
        }

        let size = upload.bytes.len() as u64;
        if size > self.max_size_bytes {
            return Err(AnalyzerError::validation(format!(
                "Image too large: {size} bytes (max: {})",
                self.max_size_bytes
            )));
        }

        let format = image_format_tag(upload.filename.as_deref());
        if !ACCEPTED_IMAGE_FORMATS.contains(&format.as_str()) {
            return Err(AnalyzerError::validation(format!(
                "Unsupported image format: {format}"
            )));
        }

        // Dimensions are only enforced when the header is recognizable
        if let Some(dims) = header_dimensions(&upload.bytes) {
            if dims.width > self.max_width || dims.height > self.max_height {
                return Err(AnalyzerError::validation(format!(
                    "Image dimensions {}x{} exceed the {}x{} limit",
                    dims.width, dims.height, self.max_width, self.max_height
                )));
            }
        }

        Ok(format)
    }
}

/// Lowercased filename extension, or `png` when there is none
pub fn image_format_tag(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_IMAGE_FORMAT.to_string())
}

/// Read width and height from PNG, GIF or BMP headers
pub fn header_dimensions(bytes: &[u8]) -> Option<ImageDimensions> {
    const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

    if bytes.starts_with(PNG_SIGNATURE) && bytes.len() >= 24 && &bytes[12..16] == b"IHDR" {
        return Some(ImageDimensions {
            width: u32::from_be_bytes(bytes[16..20].try_into().ok()?),
            height: u32::from_be_bytes(bytes[20..24].try_into().ok()?),
        });
    }

    if (bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a")) && bytes.len() >= 10 {
        return Some(ImageDimensions {
            width: u16::from_le_bytes(bytes[6..8].try_into().ok()?) as u32,
            height: u16::from_le_bytes(bytes[8..10].try_into().ok()?) as u32,
        });
    }

    if bytes.starts_with(b"BM") && bytes.len() >= 26 {
        let width = i32::from_le_bytes(bytes[18..22].try_into().ok()?);
        // Negative height marks a top-down bitmap
        let height = i32::from_le_bytes(bytes[22..26].try_into().ok()?);
        return Some(ImageDimensions {
            width: width.unsigned_abs(),
            height: height.unsigned_abs(),
        });
    }

    None
}
