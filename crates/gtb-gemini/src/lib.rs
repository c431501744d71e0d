//! Gemini adapter (chat, vision, image generation).
//!
//! Implements the `gtb-core` model port over the `generateContent` REST API.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use gtb_core::{
    errors::Error,
    model::{ContextEntry, HealthStatus, ModelHealth, ModelLineup, ModelPort},
    Result,
};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const CHAT_MODEL: &str = "gemini-2.5-flash";
const VISION_MODEL: &str = "gemini-2.5-pro";
const IMAGE_GEN_MODEL: &str = "gemini-2.0-flash-preview-image-generation";

const SYSTEM_INSTRUCTION: &str = "You are a helpful AI assistant in a Telegram bot. \
    Provide concise, helpful responses. Be friendly and conversational. \
    If asked about your capabilities, mention that you can analyze images \
    and generate images using the /image command.";

const DEFAULT_ANALYSIS_PROMPT: &str = "Analyze this image in detail. Describe what you see, \
    including objects, people, scenery, text, and any notable features. \
    Be descriptive but concise.";

/// Only the trailing lines of history are sent upstream.
const CONTEXT_TAIL: usize = 10;

// ============== Wire types ==============

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn inline_image(mime_type: &str, data: String) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data,
            }),
        }
    }
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "responseModalities", skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(rename = "inlineData")]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
struct ResponseInlineData {
    data: String,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, if any.
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.as_ref()?.first()?.content.as_ref()?.parts;
        let text = parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Base64-decoded bytes of the first inline-data part, if any.
    fn image(&self) -> Result<Option<Vec<u8>>> {
        let Some(candidates) = &self.candidates else {
            return Ok(None);
        };
        let Some(content) = candidates.first().and_then(|c| c.content.as_ref()) else {
            return Ok(None);
        };

        for part in &content.parts {
            if let Some(inline) = &part.inline_data {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(&inline.data)
                    .map_err(|e| Error::External(format!("gemini base64 decode error: {e}")))?;
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}

/// Flatten the conversation history and the new message into one prompt body.
fn build_chat_prompt(message: &str, context: &[ContextEntry]) -> String {
    let mut lines = Vec::new();
    let skip = context.len().saturating_sub(CONTEXT_TAIL);
    for entry in &context[skip..] {
        lines.push(format!("{}: {}", entry.role, entry.content));
    }
    lines.push(format!("user: {message}"));
    lines.join("\n")
}

// ============== Client ==============

pub struct GeminiClient {
    api_key: String,
    http: reqwest::Client,
    models: ModelLineup,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("reqwest client build");

        Self {
            api_key: api_key.into(),
            http,
            models: ModelLineup {
                chat: CHAT_MODEL.to_string(),
                vision: VISION_MODEL.to_string(),
                image_generation: IMAGE_GEN_MODEL.to_string(),
            },
        }
    }

    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse> {
        let url = format!("{API_BASE}/{model}:generateContent?key={}", self.api_key);

        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::External(format!("gemini request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("gemini response read error: {e}")))?;

        debug!("gemini {model} responded with status {status}");

        if !status.is_success() {
            return Err(Error::External(format!(
                "gemini api error: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| Error::External(format!("gemini json error: {e}")))?;

        if let Some(err) = &parsed.error {
            return Err(Error::External(format!("gemini error: {}", err.message)));
        }

        Ok(parsed)
    }
}

#[async_trait]
impl ModelPort for GeminiClient {
    async fn generate_text(&self, prompt: &str, context: &[ContextEntry]) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part::text(build_chat_prompt(prompt, context))],
            }],
            system_instruction: Some(Content {
                parts: vec![Part::text(SYSTEM_INSTRUCTION)],
            }),
            generation_config: Some(GenerationConfig {
                max_output_tokens: Some(1000),
                temperature: Some(0.7),
                response_modalities: None,
            }),
        };

        let resp = self.generate(CHAT_MODEL, &request).await?;
        resp.text()
            .ok_or_else(|| Error::External("gemini returned an empty response".to_string()))
    }

    async fn analyze_image(&self, image: &[u8], prompt: Option<&str>) -> Result<String> {
        let prompt = match prompt {
            Some(p) if !p.trim().is_empty() => p,
            _ => DEFAULT_ANALYSIS_PROMPT,
        };

        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::inline_image("image/jpeg", encoded),
                    Part::text(prompt),
                ],
            }],
            system_instruction: None,
            generation_config: None,
        };

        let resp = self.generate(VISION_MODEL, &request).await?;
        resp.text()
            .ok_or_else(|| Error::External("gemini returned an empty analysis".to_string()))
    }

    async fn generate_image(&self, prompt: &str) -> Result<Option<Vec<u8>>> {
        info!("generating image: {prompt}");

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part::text(format!(
                    "Create a high-quality, detailed image: {prompt}"
                ))],
            }],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                max_output_tokens: None,
                temperature: None,
                response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
            }),
        };

        let resp = self.generate(IMAGE_GEN_MODEL, &request).await?;
        let image = resp.image()?;
        if let Some(bytes) = &image {
            info!("image generated: {} bytes", bytes.len());
        }
        Ok(image)
    }

    async fn health_check(&self) -> ModelHealth {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part::text("Say 'OK' if you can respond")],
            }],
            system_instruction: None,
            generation_config: None,
        };

        match self.generate(CHAT_MODEL, &request).await {
            Ok(resp) => {
                let ok = resp
                    .text()
                    .map(|t| t.to_uppercase().contains("OK"))
                    .unwrap_or(false);
                ModelHealth {
                    status: if ok {
                        HealthStatus::Healthy
                    } else {
                        HealthStatus::Degraded
                    },
                    text_generation: ok,
                    detail: None,
                    models: self.models.clone(),
                }
            }
            Err(err) => ModelHealth {
                status: HealthStatus::Unhealthy,
                text_generation: false,
                detail: Some(err.to_string()),
                models: self.models.clone(),
            },
        }
    }
}
