//! CLIP / T5 prompt generation.
//!
//! Prompts come from an OpenAI chat completion when a key is configured.
//! Every failure path degrades to the fixed default prompts so a job never
//! fails because the language model was unavailable.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Prompt pair consumed by the two Flux text encoders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPair {
    pub clip: String,
    pub t5: String,
}

/// What the generator knows about the requested design.
#[derive(Debug, Clone, Copy)]
pub struct PromptRequest<'a> {
    pub style: &'a str,
    pub room_type: &'a str,
    pub color_palette: Option<&'a str>,
    /// Caption of the existing room (populated redesign only).
    pub caption: Option<&'a str>,
    /// Furniture to place (empty redesign only).
    pub furniture: &'a [String],
}

impl PromptRequest<'_> {
    pub fn defaults(&self) -> PromptPair {
        if self.furniture.is_empty() {
            default_prompts(self.style, self.room_type)
        } else {
            default_empty_room_prompts(self.style, self.room_type, self.furniture)
        }
    }
}

pub fn default_prompts(style: &str, room_type: &str) -> PromptPair {
    PromptPair {
        clip: format!(
            "A {style} {room_type} with elegant furniture, balanced lighting, and harmonious colors."
        ),
        t5: format!(
            "Transform this {room_type} into a {style} style space. Include furniture appropriate for a {room_type}, with balanced composition, proper lighting, and a cohesive color scheme that matches the {style} aesthetic."
        ),
    }
}

pub fn default_empty_room_prompts(style: &str, room_type: &str, furniture: &[String]) -> PromptPair {
    let items = furniture.join(", ");
    PromptPair {
        clip: format!(
            "A {style} {room_type} furnished with {items}, balanced lighting, and harmonious colors."
        ),
        t5: format!(
            "Furnish this empty {room_type} in a {style} style space with {items}. Keep the existing walls, windows and floor layout, with balanced composition, proper lighting, and a cohesive color scheme that matches the {style} aesthetic."
        ),
    }
}

#[async_trait]
pub trait PromptGenerator: Send + Sync {
    /// Always returns a usable pair; falls back to defaults on failure.
    async fn generate(&self, request: &PromptRequest<'_>) -> PromptPair;
}

/// Generator that always returns the default prompts.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPrompter;

#[async_trait]
impl PromptGenerator for DefaultPrompter {
    async fn generate(&self, request: &PromptRequest<'_>) -> PromptPair {
        request.defaults()
    }
}

/// Settings for the OpenAI-backed generator.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Prompt generator backed by the chat completions API.
pub struct OpenAiPrompter {
    client: reqwest::Client,
    config: OpenAiConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiPrompter {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    async fn request(&self, api_key: &str, request: &PromptRequest<'_>) -> Result<PromptPair, String> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_instruction(request)},
                {"role": "user", "content": user_message(request)},
            ],
            "response_format": {"type": "json_object"},
            "temperature": self.config.temperature,
        });

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {text}"));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| e.to_string())?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| "empty completion".to_string())?;
        parse_prompt_pair(&content)
    }
}

#[async_trait]
impl PromptGenerator for OpenAiPrompter {
    async fn generate(&self, request: &PromptRequest<'_>) -> PromptPair {
        let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            tracing::warn!("OpenAI key not configured, using default prompts");
            return request.defaults();
        };
        match self.request(api_key, request).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(error = %e, "prompt generation failed, using default prompts");
                request.defaults()
            }
        }
    }
}

/// Parse a `{"clip": .., "t5": ..}` object, rejecting blank prompts.
pub fn parse_prompt_pair(content: &str) -> Result<PromptPair, String> {
    let pair: PromptPair = serde_json::from_str(content).map_err(|e| e.to_string())?;
    if pair.clip.trim().is_empty() || pair.t5.trim().is_empty() {
        return Err("completion contained an empty prompt".to_string());
    }
    Ok(pair)
}

fn user_message(request: &PromptRequest<'_>) -> String {
    let mut msg = String::new();
    if let Some(caption) = request.caption {
        msg.push_str(&format!("Description: {caption}\n"));
    }
    if !request.furniture.is_empty() {
        msg.push_str(&format!("Furniture: {}\n", request.furniture.join(", ")));
    }
    msg.push_str(&format!("Style: {}\nRoom Type: {}", request.style, request.room_type));
    msg
}

fn system_instruction(request: &PromptRequest<'_>) -> String {
    let style = request.style;
    let room_type = request.room_type;
    let colors = match request.color_palette {
        Some(palette) => format!(
            "and incorporate the specific color '{palette}' as a dominant theme throughout the entire room"
        ),
        None => "and use colors that are appropriate for the specified style".to_string(),
    };
    let furniture = if request.furniture.is_empty() {
        String::new()
    } else {
        format!(
            "\nThe room is currently empty. Furnish it with exactly these items: {}.\n",
            request.furniture.join(", ")
        )
    };

    format!(
        r#"You are an 'Image Prompt Generator' for Flux image synthesis. Create two prompts, one for CLIP and one for T5, that clearly and powerfully apply a {style} interior design style to a {room_type} while preserving the original room structure. The style must visibly drive materials, colors and decor but not the room's architectural geometry, {colors}.
{furniture}
### Structural Constraint:
Do not modify fixed architectural elements such as:
- Window and door shapes
- Wall layout or dimensions
- Ceiling height or room footprint

You may vary:
- Surface finishes (wall materials, floor texture)
- Fabric, furniture and color palette
- Patterns on rugs, chairs and all interior items
- Lighting mood and fixtures
- Decorative objects

1. **CLIP Prompt:** a concise, structured description of the room's key visual features, about 77 tokens (40-50 words), limited to layout, materials, lighting and furniture.

2. **T5 Prompt:** a detailed technical description of about 512 tokens (350-400 words) in a structured "recipe" format. Include:
   - **Main Subject with Emphasis**: bracketed phrases for stylistically critical elements, e.g. `[Low-profile tatami bed flanked by shoji screens and rice paper lamps]`
   - **Environmental & Lighting Dynamics**: how light interacts with key materials and surfaces
   - **Perspective & Imaging Notes**: depth of field, camera angle, lighting intensity, texture fidelity
   Use direct scene-construction language, never narrative or viewer language.

The output must reflect the given style prominently and must not default to a generic modern interior.

Return your output as a JSON object with keys "clip" and "t5"."#
    )
}
