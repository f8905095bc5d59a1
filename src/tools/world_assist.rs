//! MCP `world_assist` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use taleweave::story::types::CharacterTraits;
use taleweave::story::world::HeroSketch;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WorldAssistParams {
    #[schemars(description = "Genre tag, e.g. 'cultivation', 'fantasy', 'scifi', 'horror'")]
    pub genre: String,

    #[schemars(description = "Short idea to build the world from. Required unless 'field' is set.")]
    pub intent: Option<String>,

    #[schemars(
        description = "Write only this field: 'world_context', 'plot_direction', 'major_factions' or 'key_npcs'"
    )]
    pub field: Option<String>,

    #[schemars(description = "Existing setting text the single field should build on")]
    pub current_context: Option<String>,

    #[schemars(description = "Protagonist's name, if already chosen")]
    pub hero_name: Option<String>,

    #[schemars(description = "Protagonist's gender")]
    pub gender: Option<String>,

    #[schemars(description = "Protagonist's origin (bloodline, class, background)")]
    pub origin: Option<String>,

    #[schemars(description = "Protagonist's talents")]
    pub talents: Option<Vec<String>>,
}

impl WorldAssistParams {
    /// The protagonist as far as the caller described them, if at all.
    pub fn hero(&self) -> Option<HeroSketch> {
        if self.hero_name.is_none() && self.gender.is_none() && self.origin.is_none() && self.talents.is_none() {
            return None;
        }
        let traits = (self.origin.is_some() || self.talents.is_some()).then(|| CharacterTraits {
            origin: self.origin.clone().unwrap_or_default(),
            talents: self.talents.clone().unwrap_or_default(),
        });
        Some(HeroSketch {
            name: self.hero_name.clone().unwrap_or_default(),
            gender: self.gender.clone().unwrap_or_default(),
            traits,
        })
    }
}
