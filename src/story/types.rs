//! Story data model.
//!
//! A [`Session`] holds the fixed character and world settings of one story.
//! A [`Turn`] is one entry in its transcript: either the player's instruction
//! ([`TurnContent::User`]) or a generated reply ([`TurnContent::Model`]).

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "model" => Ok(Self::Model),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// Free-form world-building text supplied when the story is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSettings {
    pub world_context: String,
    pub plot_direction: String,
    pub major_factions: String,
    pub key_npcs: String,
}

/// The protagonist's origin (class, bloodline, background) and talents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterTraits {
    pub origin: String,
    pub talents: Vec<String>,
}

/// Fields needed to start a story. Fixed once the session exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub hero_name: String,
    pub gender: String,
    pub genre: String,
    pub world: WorldSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits: Option<CharacterTraits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// UUID v7 assigned on creation.
    pub id: String,
    pub hero_name: String,
    pub gender: String,
    pub genre: String,
    pub world: WorldSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits: Option<CharacterTraits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Role-dependent payload of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TurnContent {
    User {
        /// The literal instruction issued by the player.
        prompt: String,
    },
    Model {
        /// Display text extracted from the structured response.
        narrative: String,
        /// The full structured response exactly as the generator returned it.
        raw_response: String,
        /// Vector of `narrative` alone; `None` when embedding failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        embedding: Option<Vec<f32>>,
        /// Opaque token that must be replayed verbatim on the next call.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        continuity_token: Option<String>,
    },
}

impl TurnContent {
    pub fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::Model { .. } => Role::Model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub session_id: String,
    /// Zero-based position, contiguous within a session.
    pub sequence_index: u32,
    #[serde(flatten)]
    pub content: TurnContent,
}

impl Turn {
    pub fn role(&self) -> Role {
        self.content.role()
    }

    pub fn is_model(&self) -> bool {
        self.role() == Role::Model
    }

    pub fn user_prompt(&self) -> Option<&str> {
        match &self.content {
            TurnContent::User { prompt } => Some(prompt),
            TurnContent::Model { .. } => None,
        }
    }

    pub fn narrative(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Model { narrative, .. } => Some(narrative),
            TurnContent::User { .. } => None,
        }
    }

    pub fn raw_response(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Model { raw_response, .. } => Some(raw_response),
            TurnContent::User { .. } => None,
        }
    }

    /// The stored vector, if one exists and is non-empty.
    pub fn embedding(&self) -> Option<&[f32]> {
        match &self.content {
            TurnContent::Model {
                embedding: Some(v), ..
            } if !v.is_empty() => Some(v),
            _ => None,
        }
    }

    pub fn continuity_token(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Model {
                continuity_token, ..
            } => continuity_token.as_deref(),
            TurnContent::User { .. } => None,
        }
    }
}

/// A turn about to be written. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub session_id: String,
    pub sequence_index: u32,
    pub content: TurnContent,
}

/// Requested narrative length, mapped to a fixed instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthMode {
    Short,
    #[default]
    Medium,
    Long,
}

impl LengthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }

    /// Instruction appended to the final user block.
    pub fn directive(&self) -> &'static str {
        match self {
            Self::Short => "[REQUIREMENT: Keep it SHORT, about 200-300 words.]",
            Self::Medium => {
                "[REQUIREMENT: Moderate length, about 400-500 words, balancing action and description.]"
            }
            Self::Long => "[REQUIREMENT: Write a LONG, detailed passage of about 800 words.]",
        }
    }

    /// Reasoning budget requested from generators that support one.
    pub fn thinking_budget(&self) -> u32 {
        match self {
            Self::Long => 32768,
            Self::Short | Self::Medium => 16384,
        }
    }
}

impl std::fmt::Display for LengthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LengthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "long" => Ok(Self::Long),
            _ => Err(format!("unknown length mode: {s} (expected short, medium or long)")),
        }
    }
}

/// Portable form of one story, used for export and restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBundle {
    pub session: Session,
    pub turns: Vec<Turn>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_serializes_with_flat_role_tag() {
        let turn = Turn {
            id: "t1".into(),
            session_id: "s1".into(),
            sequence_index: 1,
            content: TurnContent::Model {
                narrative: "The gate opens.".into(),
                raw_response: "{}".into(),
                embedding: Some(vec![0.5, 0.5]),
                continuity_token: Some("sig".into()),
            },
        };
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "model");
        assert_eq!(json["sequence_index"], 1);
        assert_eq!(json["continuity_token"], "sig");

        let back: Turn = serde_json::from_value(json).unwrap();
        assert_eq!(back, turn);
    }

    #[test]
    fn empty_embedding_reads_as_absent() {
        let turn = Turn {
            id: "t1".into(),
            session_id: "s1".into(),
            sequence_index: 1,
            content: TurnContent::Model {
                narrative: "x".into(),
                raw_response: "{}".into(),
                embedding: Some(vec![]),
                continuity_token: None,
            },
        };
        assert!(turn.embedding().is_none());
    }

    #[test]
    fn length_mode_parses_and_budgets() {
        assert_eq!("long".parse::<LengthMode>().unwrap(), LengthMode::Long);
        assert!("epic".parse::<LengthMode>().is_err());
        assert_eq!(LengthMode::default(), LengthMode::Medium);
        assert!(LengthMode::Long.thinking_budget() > LengthMode::Short.thinking_budget());
    }
}
