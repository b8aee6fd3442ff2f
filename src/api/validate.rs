//! Request validation rules.

use image::DynamicImage;

use super::error::ApiError;
use crate::pipeline::preprocess;

pub const VALID_STYLES: &[&str] = &[
    "modern",
    "minimalist",
    "industrial",
    "scandinavian",
    "bohemian",
    "farmhouse",
    "traditional",
    "contemporary",
    "mediterranean",
    "mid-century modern",
    "coastal",
    "gothic",
    "art deco",
    "japanese",
    "rustic",
    "transitional",
];

pub const VALID_ROOM_TYPES: &[&str] = &[
    "living room",
    "bedroom",
    "kitchen",
    "bathroom",
    "dining room",
    "office",
    "entryway",
    "hallway",
    "den",
    "nursery",
    "game room",
    "study",
    "sunroom",
    "basement",
    "loft",
    "attic",
];

/// Maximum upload size in bytes (10 MB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Smallest accepted image side in pixels.
pub const MIN_IMAGE_DIMENSION: u32 = 256;

/// Largest accepted image side in pixels.
pub const MAX_IMAGE_DIMENSION: u32 = 4096;

pub const MAX_PALETTE_CHARS: usize = 500;

pub const MAX_PROMPT_CHARS: usize = 1000;

/// Maximum furniture entries after splitting on commas.
pub const MAX_FURNITURE_ITEMS: usize = 20;

pub const MAX_FURNITURE_CHARS: usize = 100;

/// Limits applied to submissions. Every violation is rejected, never
/// truncated.
#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub styles: Vec<String>,
    pub room_types: Vec<String>,
    pub max_upload_bytes: usize,
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub max_palette_chars: usize,
    pub max_prompt_chars: usize,
    pub max_furniture_items: usize,
    pub max_furniture_chars: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            styles: VALID_STYLES.iter().map(|s| s.to_string()).collect(),
            room_types: VALID_ROOM_TYPES.iter().map(|s| s.to_string()).collect(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            min_dimension: MIN_IMAGE_DIMENSION,
            max_dimension: MAX_IMAGE_DIMENSION,
            max_palette_chars: MAX_PALETTE_CHARS,
            max_prompt_chars: MAX_PROMPT_CHARS,
            max_furniture_items: MAX_FURNITURE_ITEMS,
            max_furniture_chars: MAX_FURNITURE_CHARS,
        }
    }
}

fn pick_allowed(value: &str, allowed: &[String]) -> Option<String> {
    let needle = value.trim().to_lowercase();
    allowed
        .iter()
        .find(|a| a.to_lowercase() == needle)
        .map(|a| a.to_lowercase())
}

impl ValidationRules {
    /// Canonical (lowercase) style name.
    pub fn style(&self, style: &str) -> Result<String, ApiError> {
        pick_allowed(style, &self.styles).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Invalid style. Allowed styles are: {}",
                self.styles.join(", ")
            ))
        })
    }

    /// Canonical (lowercase) room type.
    pub fn room_type(&self, room_type: &str) -> Result<String, ApiError> {
        pick_allowed(room_type, &self.room_types).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Invalid room type. Allowed room types are: {}",
                self.room_types.join(", ")
            ))
        })
    }

    /// Blank palettes count as absent.
    pub fn color_palette(&self, palette: Option<String>) -> Result<Option<String>, ApiError> {
        let Some(palette) = palette.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        if palette.chars().count() > self.max_palette_chars {
            return Err(ApiError::BadRequest(format!(
                "Color palette description too long. Maximum length is {} characters.",
                self.max_palette_chars
            )));
        }
        Ok(Some(palette))
    }

    pub fn prompt(&self, prompt: &str) -> Result<String, ApiError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ApiError::BadRequest("Prompt must not be empty.".into()));
        }
        if prompt.chars().count() > self.max_prompt_chars {
            return Err(ApiError::BadRequest(format!(
                "Prompt too long. Maximum length is {} characters.",
                self.max_prompt_chars
            )));
        }
        Ok(prompt.to_string())
    }

    pub fn strength(&self, strength: f32) -> Result<f32, ApiError> {
        if !(0.0..=1.0).contains(&strength) {
            return Err(ApiError::BadRequest(
                "Strength must be between 0.0 and 1.0.".into(),
            ));
        }
        Ok(strength)
    }

    /// Flatten repeated and comma-separated entries, dropping blanks.
    pub fn furniture(&self, entries: &[String]) -> Result<Vec<String>, ApiError> {
        let items: Vec<String> = entries
            .iter()
            .flat_map(|e| e.split(','))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if items.len() > self.max_furniture_items {
            return Err(ApiError::BadRequest(format!(
                "Too many furniture items. Maximum is {}.",
                self.max_furniture_items
            )));
        }
        if let Some(long) = items.iter().find(|i| i.chars().count() > self.max_furniture_chars) {
            return Err(ApiError::BadRequest(format!(
                "Furniture item '{}' is too long. Maximum length is {} characters.",
                long.chars().take(20).collect::<String>(),
                self.max_furniture_chars
            )));
        }
        Ok(items)
    }

    /// Check size, format and dimensions of an upload and decode it.
    pub fn image(&self, bytes: &[u8]) -> Result<DynamicImage, ApiError> {
        if bytes.len() > self.max_upload_bytes {
            return Err(ApiError::BadRequest(format!(
                "Image file too large. Maximum size is {} MB.",
                self.max_upload_bytes / (1024 * 1024)
            )));
        }
        if preprocess::accepted_format(bytes).is_none() {
            return Err(ApiError::BadRequest(
                "Unsupported image format. Please upload a JPEG or PNG image.".into(),
            ));
        }
        let img = preprocess::decode(bytes).map_err(|e| {
            ApiError::BadRequest(format!("Could not decode image: {e}"))
        })?;
        self.dimensions(img.width(), img.height())?;
        Ok(img)
    }

    pub fn dimensions(&self, width: u32, height: u32) -> Result<(), ApiError> {
        let (min, max) = (self.min_dimension, self.max_dimension);
        if width < min || height < min {
            return Err(ApiError::BadRequest(format!(
                "Image dimensions too small. Minimum size is {min}x{min} pixels."
            )));
        }
        if width > max || height > max {
            return Err(ApiError::BadRequest(format!(
                "Image dimensions too large. Maximum size is {max}x{max} pixels."
            )));
        }
        Ok(())
    }

    /// A mask must be a JPEG/PNG matching the image's dimensions.
    pub fn mask(&self, bytes: &[u8], image: &DynamicImage) -> Result<DynamicImage, ApiError> {
        if bytes.len() > self.max_upload_bytes {
            return Err(ApiError::BadRequest(format!(
                "Mask file too large. Maximum size is {} MB.",
                self.max_upload_bytes / (1024 * 1024)
            )));
        }
        if preprocess::accepted_format(bytes).is_none() {
            return Err(ApiError::BadRequest(
                "Unsupported mask format. Please upload a JPEG or PNG image.".into(),
            ));
        }
        let mask = preprocess::decode(bytes)
            .map_err(|e| ApiError::BadRequest(format!("Could not decode mask: {e}")))?;
        if (mask.width(), mask.height()) != (image.width(), image.height()) {
            return Err(ApiError::BadRequest(format!(
                "Mask dimensions {}x{} do not match image dimensions {}x{}.",
                mask.width(),
                mask.height(),
                image.width(),
                image.height()
            )));
        }
        Ok(mask)
    }
}
