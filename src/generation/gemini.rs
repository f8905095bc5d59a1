//! Gemini `generateContent` over REST.
//!
//! Model turns are replayed as `model` contents whose text part carries the
//! stored `thoughtSignature`; the signature of the reply is returned as the
//! continuity token.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{GeneratedReply, GenerationError, GenerationRequest, Generator, ResponseFormat};
use crate::config::GenerationConfig;
use crate::story::context::ContextMessage;

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_output_tokens: u32,
}

impl GeminiGenerator {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        max_output_tokens: u32,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            max_output_tokens,
        })
    }

    /// Build from config, reading the key from `config.api_key_env`.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            GenerationError::NotConfigured(format!("environment variable {} is not set", config.api_key_env))
        })?;
        Self::new(&config.base_url, &config.model, api_key, config.max_output_tokens)
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    pub(crate) fn request_body(&self, request: &GenerationRequest) -> Value {
        let contents: Vec<Value> = request.messages.iter().map(content_entry).collect();
        let safety: Vec<Value> = SAFETY_CATEGORIES
            .iter()
            .map(|c| json!({ "category": c, "threshold": "BLOCK_NONE" }))
            .collect();

        let mut config = json!({
            "maxOutputTokens": self.max_output_tokens,
            "thinkingConfig": { "thinkingBudget": request.length.thinking_budget() },
        });
        let schema = match request.format {
            ResponseFormat::Story => Some(story_schema()),
            ResponseFormat::WorldSettings => Some(world_schema()),
            ResponseFormat::PlainText => None,
        };
        if let Some(schema) = schema {
            config["responseMimeType"] = json!("application/json");
            config["responseSchema"] = schema;
        }

        json!({
            "contents": contents,
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
            "generationConfig": config,
            "safetySettings": safety,
        })
    }
}

fn content_entry(message: &ContextMessage) -> Value {
    let mut part = json!({ "text": message.text });
    if let Some(token) = &message.continuity_token {
        part["thoughtSignature"] = json!(token);
    }
    json!({ "role": message.role.as_str(), "parts": [part] })
}

fn world_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "worldContext": { "type": "STRING" },
            "plotDirection": { "type": "STRING" },
            "majorFactions": { "type": "STRING" },
            "keyNpcs": { "type": "STRING" }
        },
        "required": ["worldContext", "plotDirection", "majorFactions", "keyNpcs"]
    })
}

fn story_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "narrative": { "type": "STRING" },
            "stats": {
                "type": "OBJECT",
                "properties": {
                    "name": { "type": "STRING" },
                    "realm": { "type": "STRING" },
                    "status": { "type": "STRING" },
                    "inventory": { "type": "ARRAY", "items": { "type": "STRING" } },
                    "origin": { "type": "STRING" },
                    "talents": { "type": "ARRAY", "items": { "type": "STRING" } }
                }
            },
            "options": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "label": { "type": "STRING" },
                        "action": { "type": "STRING" },
                        "type": { "type": "STRING", "enum": ["safe", "risky", "social", "custom"] }
                    }
                }
            },
            "isGameOver": { "type": "BOOLEAN" }
        },
        "required": ["narrative", "stats", "options", "isGameOver"]
    })
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    thought_signature: Option<String>,
}

/// Concatenate the non-thought text of the first candidate and pick up its
/// first thought signature.
fn extract_reply(response: ApiResponse) -> Result<GeneratedReply, GenerationError> {
    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    let continuity_token = parts.iter().find_map(|p| p.thought_signature.clone());
    let text: String = parts
        .iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text.as_deref())
        .collect();

    if text.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(GeneratedReply {
        text,
        continuity_token,
    })
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedReply, GenerationError> {
        let body = self.request_body(request);
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            length = %request.length,
            "sending generation request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Network(format!("request timed out: {e}"))
                } else {
                    GenerationError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        match status {
            200 => {}
            429 => return Err(GenerationError::RateLimited),
            401 | 403 => {
                return Err(GenerationError::Authentication(
                    "invalid API key or insufficient permissions".into(),
                ))
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                warn!(status, body = %message, "generator returned error");
                return Err(GenerationError::Api { status, message });
            }
        }

        let parsed: ApiResponse = response.json().await.map_err(|e| GenerationError::Api {
            status,
            message: format!("failed to parse response: {e}"),
        })?;
        let reply = extract_reply(parsed)?;
        debug!(
            chars = reply.text.len(),
            has_token = reply.continuity_token.is_some(),
            "generation reply received"
        );
        Ok(reply)
    }
}
