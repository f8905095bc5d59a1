//! Generative backend abstraction.
//!
//! A [`Generator`] receives the assembled messages plus a system instruction
//! and returns raw text and an optional continuity token. Parsing the text
//! into a story response is the engine's job, not the backend's.

pub mod gemini;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::GenerationConfig;
use crate::story::context::ContextMessage;
use crate::story::types::LengthMode;

/// Shape the generator is asked to reply in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    /// JSON story turn: narrative, stats, options, isGameOver.
    #[default]
    Story,
    /// JSON object with the four world-setting fields.
    WorldSettings,
    PlainText,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub messages: Vec<ContextMessage>,
    pub length: LengthMode,
    pub format: ResponseFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReply {
    pub text: String,
    /// Opaque token to store on the model turn and replay next time.
    pub continuity_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("rate limited by provider")]
    RateLimited,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider returned no content")]
    EmptyResponse,

    #[error("generator not configured: {0}")]
    NotConfigured(String),
}

impl GenerationError {
    /// Whether the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited | Self::Timeout(_) | Self::EmptyResponse => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Authentication(_) | Self::NotConfigured(_) => false,
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedReply, GenerationError>;
}

/// Stand-in used when no backend could be built (for example a missing API
/// key). Commands that never generate keep working; the ones that do fail
/// with [`GenerationError::NotConfigured`].
pub struct UnconfiguredGenerator {
    reason: String,
}

impl UnconfiguredGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Generator for UnconfiguredGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedReply, GenerationError> {
        Err(GenerationError::NotConfigured(self.reason.clone()))
    }
}

/// Create a generator from config. Currently only `"gemini"` is supported.
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "gemini" => Ok(Box::new(gemini::GeminiGenerator::from_config(config)?)),
        other => anyhow::bail!("unknown generation provider: {other}. Supported: gemini"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        assert!(GenerationError::RateLimited.is_transient());
        assert!(GenerationError::Api { status: 503, message: String::new() }.is_transient());
        assert!(!GenerationError::Api { status: 400, message: String::new() }.is_transient());
        assert!(!GenerationError::NotConfigured("no key".into()).is_transient());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = GenerationConfig {
            provider: "carrier-pigeon".into(),
            ..Default::default()
        };
        assert!(create_generator(&config).is_err());
    }

    #[tokio::test]
    async fn unconfigured_generator_reports_reason() {
        let generator = UnconfiguredGenerator::new("GEMINI_API_KEY is not set");
        let request = GenerationRequest {
            system_instruction: String::new(),
            messages: Vec::new(),
            length: LengthMode::Short,
            format: ResponseFormat::Story,
        };
        let err = generator.generate(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured(ref r) if r.contains("GEMINI_API_KEY")));
    }
}
