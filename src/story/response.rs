//! Structured generator output.
//!
//! The generator is asked for a JSON object with `narrative`, `stats`,
//! `options` and `isGameOver`. [`parse_story_response`] tolerates Markdown
//! fences and chatter around the object but rejects anything that does not
//! validate; [`fallback_response`] builds the degraded reply used when the
//! caller opts into keeping unparseable output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::story::context::excerpt;
use crate::story::types::{CharacterTraits, Session, Turn};

/// Characters of raw text kept in a degraded narrative.
pub const FALLBACK_NARRATIVE_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response contains no JSON object")]
    NoJsonObject,

    #[error("response does not match the expected schema: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("response has no usable content")]
    Blank,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub name: String,
    pub realm: String,
    pub status: String,
    pub inventory: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talents: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    Safe,
    Risky,
    Social,
    #[serde(other)]
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryOption {
    pub label: String,
    /// The prompt issued if the player picks this option.
    pub action: String,
    #[serde(rename = "type")]
    pub kind: OptionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryResponse {
    pub narrative: String,
    pub stats: Stats,
    pub options: Vec<StoryOption>,
    pub is_game_over: bool,
}

impl StoryResponse {
    /// Fill `origin`/`talents` from the character sheet when the generator left them out.
    pub fn merge_traits(&mut self, traits: Option<&CharacterTraits>) {
        let Some(traits) = traits else { return };
        if self.stats.origin.as_deref().map_or(true, str::is_empty) {
            self.stats.origin = Some(traits.origin.clone());
        }
        if self.stats.talents.as_ref().map_or(true, Vec::is_empty) {
            self.stats.talents = Some(traits.talents.clone());
        }
    }
}

/// Stats and choices shown after the latest model turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedState {
    pub stats: Stats,
    pub options: Vec<StoryOption>,
    pub is_game_over: bool,
}

/// Remove Markdown code fences the generator sometimes wraps JSON in.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_open = match trimmed.strip_prefix("```") {
        Some(rest) => rest.strip_prefix("json").unwrap_or(rest),
        None => trimmed,
    };
    without_open
        .trim()
        .strip_suffix("```")
        .unwrap_or(without_open.trim())
        .trim()
        .to_string()
}

/// Deserialize the outermost JSON object in `raw`, ignoring fences and
/// any prose around it.
pub fn parse_json_object<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, ResponseError> {
    let cleaned = strip_code_fences(raw);
    let (start, end) = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => return Err(ResponseError::NoJsonObject),
    };
    Ok(serde_json::from_str(&cleaned[start..=end])?)
}

pub fn parse_story_response(raw: &str) -> Result<StoryResponse, ResponseError> {
    parse_json_object(raw)
}

/// Degraded reply built from unparseable output.
pub fn fallback_response(raw: &str, session: &Session) -> StoryResponse {
    let mut narrative = excerpt(raw.trim(), FALLBACK_NARRATIVE_CHARS).to_string();
    narrative.push_str("... (The story engine is recovering from an overlong reply; please try again.)");

    let mut response = StoryResponse {
        narrative,
        stats: Stats {
            name: session.hero_name.clone(),
            realm: "Unknown".into(),
            status: "Connection unstable".into(),
            ..Default::default()
        },
        options: vec![StoryOption {
            label: "Continue".into(),
            action: "Continue".into(),
            kind: OptionKind::Safe,
        }],
        is_game_over: false,
    };
    response.merge_traits(session.traits.as_ref());
    response
}

/// Recompute the displayed state from the last model turn in `history`.
///
/// `None` when no model turn remains or its stored response cannot be parsed.
pub fn derived_state(history: &[Turn]) -> Option<DerivedState> {
    let last_model = history.iter().rev().find(|t| t.is_model())?;
    match parse_story_response(last_model.raw_response().unwrap_or_default()) {
        Ok(parsed) => Some(DerivedState {
            stats: parsed.stats,
            options: parsed.options,
            is_game_over: parsed.is_game_over,
        }),
        Err(e) => {
            tracing::warn!(
                sequence_index = last_model.sequence_index,
                error = %e,
                "could not restore state from last model turn"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::types::{TurnContent, WorldSettings};

    const VALID: &str = r#"{
        "narrative": "The lantern flickers.",
        "stats": {"name": "Lin", "realm": "Qi Refining", "status": "Healthy", "inventory": ["Lantern"]},
        "options": [
            {"label": "Advance", "action": "Walk deeper", "type": "risky"},
            {"label": "Wait", "action": "Wait and listen", "type": "whimsical"}
        ],
        "isGameOver": false
    }"#;

    fn session() -> Session {
        Session {
            id: "s".into(),
            hero_name: "Lin".into(),
            gender: "male".into(),
            genre: "cultivation".into(),
            world: WorldSettings::default(),
            traits: Some(CharacterTraits {
                origin: "Water root".into(),
                talents: vec!["Swordplay".into()],
            }),
            avatar: None,
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn parses_plain_json() {
        let parsed = parse_story_response(VALID).unwrap();
        assert_eq!(parsed.narrative, "The lantern flickers.");
        assert_eq!(parsed.stats.inventory, vec!["Lantern"]);
        assert_eq!(parsed.options[0].kind, OptionKind::Risky);
        assert_eq!(parsed.options[1].kind, OptionKind::Custom);
        assert!(!parsed.is_game_over);
    }

    #[test]
    fn parses_fenced_json_with_chatter() {
        let fenced = format!("```json\n{VALID}\n```");
        assert!(parse_story_response(&fenced).is_ok());

        let chatty = format!("Here you go: {VALID} enjoy");
        assert!(parse_story_response(&chatty).is_ok());
    }

    #[test]
    fn missing_required_field_is_invalid() {
        let err = parse_story_response(r#"{"narrative": "x", "stats": {}, "options": []}"#).unwrap_err();
        assert!(matches!(err, ResponseError::Invalid(_)));
    }

    #[test]
    fn plain_text_has_no_json_object() {
        let err = parse_story_response("The story continues without braces").unwrap_err();
        assert!(matches!(err, ResponseError::NoJsonObject));
    }

    #[test]
    fn fallback_truncates_and_carries_traits() {
        let raw = "x".repeat(5000);
        let response = fallback_response(&raw, &session());
        assert!(response.narrative.starts_with(&"x".repeat(FALLBACK_NARRATIVE_CHARS)));
        assert!(!response.narrative.contains(&"x".repeat(FALLBACK_NARRATIVE_CHARS + 1)));
        assert_eq!(response.stats.name, "Lin");
        assert_eq!(response.stats.origin.as_deref(), Some("Water root"));
        assert_eq!(response.options.len(), 1);
    }

    #[test]
    fn merge_traits_keeps_generated_values() {
        let mut parsed = parse_story_response(VALID).unwrap();
        parsed.stats.origin = Some("Ice root".into());
        parsed.merge_traits(session().traits.as_ref());
        assert_eq!(parsed.stats.origin.as_deref(), Some("Ice root"));
        assert_eq!(parsed.stats.talents, Some(vec!["Swordplay".to_string()]));
    }

    #[test]
    fn derived_state_uses_last_model_turn() {
        let history = vec![
            Turn {
                id: "m1".into(),
                session_id: "s".into(),
                sequence_index: 1,
                content: TurnContent::Model {
                    narrative: "The lantern flickers.".into(),
                    raw_response: VALID.into(),
                    embedding: None,
                    continuity_token: None,
                },
            },
            Turn {
                id: "u2".into(),
                session_id: "s".into(),
                sequence_index: 2,
                content: TurnContent::User {
                    prompt: "dangling".into(),
                },
            },
        ];
        let state = derived_state(&history).unwrap();
        assert_eq!(state.stats.realm, "Qi Refining");
        assert_eq!(state.options.len(), 2);

        assert!(derived_state(&history[1..]).is_none());
    }
}
