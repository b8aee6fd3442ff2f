//! Multipart form extraction for the submission endpoints.

use std::collections::{HashMap, HashSet};

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::Multipart;

use super::error::ApiError;
use crate::scheduler::Priority;

/// Fields of a multipart body, grouped by name.
#[derive(Debug, Default)]
pub struct FormData {
    files: HashMap<String, Bytes>,
    texts: HashMap<String, Vec<String>>,
    /// Parts without a file name whose content is not UTF-8.
    binary: HashSet<String>,
}

impl FormData {
    /// Read the whole body. Parts with a file name are kept as bytes; the
    /// rest are decoded as UTF-8 text.
    ///
    /// A request that is not `multipart/form-data` reads as an empty form,
    /// so the caller reports every required field as missing.
    pub async fn read(multipart: Result<Multipart, MultipartRejection>) -> Result<Self, ApiError> {
        let mut form = Self::default();
        let mut multipart = match multipart {
            Ok(multipart) => multipart,
            Err(rejection) => {
                tracing::debug!(error = %rejection.body_text(), "request body is not multipart");
                return Ok(form);
            }
        };
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let has_file_name = field.file_name().is_some();
            let bytes = field.bytes().await.map_err(multipart_error)?;
            if has_file_name {
                form.files.insert(name, bytes);
                continue;
            }
            match String::from_utf8(bytes.to_vec()) {
                Ok(text) => form.texts.entry(name).or_default().push(text),
                Err(_) => {
                    form.binary.insert(name);
                }
            }
        }
        Ok(form)
    }

    pub fn file(&self, name: &str) -> Option<&Bytes> {
        self.files.get(name).filter(|b| !b.is_empty())
    }

    /// First value of a text field, ignoring blanks.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts
            .get(name)
            .and_then(|v| v.first())
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn texts(&self, name: &str) -> &[String] {
        self.texts.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether a part named `name` arrived without a file name.
    fn sent_as_plain_part(&self, name: &str) -> bool {
        self.binary.contains(name) || self.texts.contains_key(name)
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Request body too large.".into())
    } else {
        ApiError::BadRequest(format!("Malformed multipart body: {}", e.body_text()))
    }
}

/// Collects `"field: message"` entries for a 422 response.
#[derive(Debug, Default)]
struct Missing(Vec<String>);

impl Missing {
    fn file(&mut self, form: &FormData, name: &str) -> Bytes {
        match form.file(name) {
            Some(bytes) => bytes.clone(),
            None if form.sent_as_plain_part(name) => {
                self.0.push(format!("{name}: expected an uploaded file"));
                Bytes::new()
            }
            None => {
                self.0.push(format!("{name}: field required"));
                Bytes::new()
            }
        }
    }

    fn text(&mut self, form: &FormData, name: &str) -> String {
        match form.text(name) {
            Some(text) => text.to_string(),
            None if form.binary.contains(name) => {
                self.0.push(format!("{name}: value is not valid text"));
                String::new()
            }
            None => {
                self.0.push(format!("{name}: field required"));
                String::new()
            }
        }
    }

    fn finish(self) -> Result<(), ApiError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Unprocessable(self.0))
        }
    }
}

fn priority(form: &FormData) -> Result<Priority, ApiError> {
    form.text("priority")
        .unwrap_or_default()
        .parse::<Priority>()
        .map_err(ApiError::BadRequest)
}

/// Form of `POST /redesign/populated`.
#[derive(Debug)]
pub struct PopulatedForm {
    pub file: Bytes,
    pub style: String,
    pub room_type: String,
    pub color_palette: Option<String>,
    pub priority: Priority,
}

impl TryFrom<&FormData> for PopulatedForm {
    type Error = ApiError;

    fn try_from(form: &FormData) -> Result<Self, Self::Error> {
        let mut missing = Missing::default();
        let file = missing.file(form, "file");
        let style = missing.text(form, "style");
        let room_type = missing.text(form, "room_type");
        missing.finish()?;
        Ok(Self {
            file,
            style,
            room_type,
            color_palette: form.text("color_palette").map(str::to_string),
            priority: priority(form)?,
        })
    }
}

/// Form of `POST /redesign/empty`.
#[derive(Debug)]
pub struct EmptyForm {
    pub file: Bytes,
    pub style: String,
    pub room_type: String,
    pub furniture: Vec<String>,
    pub color_palette: Option<String>,
    pub priority: Priority,
}

impl TryFrom<&FormData> for EmptyForm {
    type Error = ApiError;

    fn try_from(form: &FormData) -> Result<Self, Self::Error> {
        let mut missing = Missing::default();
        let file = missing.file(form, "file");
        let style = missing.text(form, "style");
        let room_type = missing.text(form, "room_type");
        missing.finish()?;
        Ok(Self {
            file,
            style,
            room_type,
            furniture: form.texts("furniture").to_vec(),
            color_palette: form.text("color_palette").map(str::to_string),
            priority: priority(form)?,
        })
    }
}

pub const DEFAULT_STRENGTH: f32 = 0.8;

/// Form of `POST /inpainting`.
#[derive(Debug)]
pub struct InpaintingForm {
    pub file: Bytes,
    pub mask: Bytes,
    pub prompt: String,
    pub strength: f32,
    pub priority: Priority,
}

impl TryFrom<&FormData> for InpaintingForm {
    type Error = ApiError;

    fn try_from(form: &FormData) -> Result<Self, Self::Error> {
        let mut missing = Missing::default();
        let file = missing.file(form, "file");
        let mask = missing.file(form, "mask");
        let prompt = missing.text(form, "prompt");
        let strength = match form.text("strength") {
            None => DEFAULT_STRENGTH,
            Some(raw) => match raw.trim().parse::<f32>() {
                Ok(v) => v,
                Err(_) => {
                    missing.0.push("strength: value is not a valid float".to_string());
                    DEFAULT_STRENGTH
                }
            },
        };
        missing.finish()?;
        Ok(Self {
            file,
            mask,
            prompt,
            strength,
            priority: priority(form)?,
        })
    }
}
