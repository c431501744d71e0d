//! Hexagonal port for the generative model backend.

use async_trait::async_trait;
use serde::Serialize;

use crate::Result;

/// One line of conversation history passed to the model.
///
/// Historical entries are all mapped to the `user` role, including prior
/// bot replies. That flattening is intentional; distinguishing assistant
/// turns observably changes response quality and is left alone.
#[derive(Clone, Debug, Serialize)]
pub struct ContextEntry {
    pub role: String,
    pub content: String,
}

impl ContextEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Model names the adapter is configured with, reported by health checks.
#[derive(Clone, Debug, Serialize)]
pub struct ModelLineup {
    pub chat: String,
    pub vision: String,
    pub image_generation: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ModelHealth {
    pub status: HealthStatus,
    pub text_generation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub models: ModelLineup,
}

/// Port for the generative backend (Gemini over REST in the shipped adapter).
///
/// All calls are single-shot; callers absorb failures into user-facing
/// placeholders rather than propagating them into core state.
#[async_trait]
pub trait ModelPort: Send + Sync {
    async fn generate_text(&self, prompt: &str, context: &[ContextEntry]) -> Result<String>;

    async fn analyze_image(&self, image: &[u8], prompt: Option<&str>) -> Result<String>;

    /// Returns `Ok(None)` when the model answered without producing an image.
    async fn generate_image(&self, prompt: &str) -> Result<Option<Vec<u8>>>;

    async fn health_check(&self) -> ModelHealth;
}
