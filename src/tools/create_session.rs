//! MCP `create_session` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use taleweave::story::types::{CharacterTraits, NewSession, WorldSettings};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateSessionParams {
    #[schemars(description = "Protagonist's name")]
    pub hero_name: String,

    #[schemars(description = "Protagonist's gender, used in narration")]
    pub gender: String,

    #[schemars(description = "Genre tag, e.g. 'cultivation', 'fantasy', 'scifi', 'horror'")]
    pub genre: String,

    #[schemars(description = "Setting of the world: geography, era, magic or technology")]
    pub world_context: String,

    #[schemars(description = "Where the plot should head")]
    #[serde(default)]
    pub plot_direction: String,

    #[schemars(description = "Major factions and powers")]
    #[serde(default)]
    pub major_factions: String,

    #[schemars(description = "Important non-player characters")]
    #[serde(default)]
    pub key_npcs: String,

    #[schemars(description = "Protagonist's origin (bloodline, class, background). Optional.")]
    pub origin: Option<String>,

    #[schemars(description = "Protagonist's talents. Optional.")]
    pub talents: Option<Vec<String>>,

    /// Generate the opening scene right away. Defaults to true.
    #[schemars(description = "If true (default), generate the opening scene immediately")]
    pub begin: Option<bool>,

    #[schemars(description = "Length of the opening scene: 'short', 'medium' (default) or 'long'")]
    pub length: Option<String>,
}

impl CreateSessionParams {
    pub fn to_new_session(&self) -> NewSession {
        let traits = match (&self.origin, &self.talents) {
            (None, None) => None,
            (origin, talents) => Some(CharacterTraits {
                origin: origin.clone().unwrap_or_default(),
                talents: talents.clone().unwrap_or_default(),
            }),
        };
        NewSession {
            hero_name: self.hero_name.clone(),
            gender: self.gender.clone(),
            genre: self.genre.clone(),
            world: WorldSettings {
                world_context: self.world_context.clone(),
                plot_direction: self.plot_direction.clone(),
                major_factions: self.major_factions.clone(),
                key_npcs: self.key_npcs.clone(),
            },
            traits,
            avatar: None,
        }
    }
}
