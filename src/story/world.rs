//! World-building assist.
//!
//! Drafts a new story's [`WorldSettings`] from a one-line intent, or writes a
//! single setting field, so a player does not have to author the whole world
//! up front. Prompts are built here; the engine sends them through the
//! generator.

use serde::Deserialize;

use crate::story::response::{parse_json_object, ResponseError};
use crate::story::types::{CharacterTraits, WorldSettings};

/// What is known about the protagonist before the story exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeroSketch {
    pub name: String,
    pub gender: String,
    pub traits: Option<CharacterTraits>,
}

/// One of the four world-setting fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldField {
    Context,
    Plot,
    Factions,
    Npcs,
}

impl WorldField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "world_context",
            Self::Plot => "plot_direction",
            Self::Factions => "major_factions",
            Self::Npcs => "key_npcs",
        }
    }

    /// Human-readable name used in the prompt.
    fn label(&self) -> &'static str {
        match self {
            Self::Context => "World setting (geography, era, power system)",
            Self::Plot => "Plot direction",
            Self::Factions => "Major factions",
            Self::Npcs => "Key NPCs",
        }
    }

    pub fn get<'a>(&self, world: &'a WorldSettings) -> &'a str {
        match self {
            Self::Context => &world.world_context,
            Self::Plot => &world.plot_direction,
            Self::Factions => &world.major_factions,
            Self::Npcs => &world.key_npcs,
        }
    }
}

impl std::fmt::Display for WorldField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorldField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "world_context" | "context" => Ok(Self::Context),
            "plot_direction" | "plot" => Ok(Self::Plot),
            "major_factions" | "factions" => Ok(Self::Factions),
            "key_npcs" | "npcs" => Ok(Self::Npcs),
            _ => Err(format!(
                "unknown world field: {s} (expected world_context, plot_direction, major_factions or key_npcs)"
            )),
        }
    }
}

pub fn assist_system_instruction(genre: &str) -> String {
    format!("You are a novelist who designs settings for {genre} interactive fiction.")
}

fn hero_lines(hero: &HeroSketch) -> String {
    let name = if hero.name.trim().is_empty() { "Nameless" } else { hero.name.as_str() };
    let mut out = format!("- Name: {name}\n- Gender: {}\n", hero.gender);
    if let Some(traits) = &hero.traits {
        out.push_str(&format!(
            "- Origin: {}\n- Talents: {}\n",
            traits.origin,
            traits.talents.join(", ")
        ));
    }
    out
}

/// Prompt asking for all four setting fields at once.
pub fn world_prompt(genre: &str, intent: &str, hero: Option<&HeroSketch>) -> String {
    let mut out = format!("Act as the author of a {genre} novel.\n\n");
    if let Some(hero) = hero {
        out.push_str("PROTAGONIST (the plot must revolve around this character):\n");
        out.push_str(&hero_lines(hero));
        out.push('\n');
    }
    out.push_str(&format!(
        "Core idea: \"{intent}\".\n\
         Create a detailed world setting (setting, plot direction, factions, key NPCs) \
         that suits the protagonist above. Keep the tone of the {genre} genre.\n"
    ));
    out
}

/// Prompt asking for a short plain-text passage for one field.
pub fn field_prompt(genre: &str, field: WorldField, current_context: &str, hero: Option<&HeroSketch>) -> String {
    let mut out = format!(
        "You help write a {genre} novel.\n\
         Write a short description (3-5 sentences) for: \"{}\".\n",
        field.label()
    );
    if !current_context.trim().is_empty() {
        out.push_str(&format!("Build on the current setting: \"{current_context}\".\n"));
    }
    if let Some(hero) = hero {
        out.push_str("The protagonist:\n");
        out.push_str(&hero_lines(hero));
    }
    out.push_str("Return plain text only, without Markdown.\n");
    out
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorldDraft {
    world_context: String,
    plot_direction: String,
    major_factions: String,
    key_npcs: String,
}

/// Validate a drafted world. All four fields must be present; a draft whose
/// fields are all blank is rejected.
pub fn parse_world_settings(raw: &str) -> Result<WorldSettings, ResponseError> {
    let draft: WorldDraft = parse_json_object(raw)?;
    let world = WorldSettings {
        world_context: draft.world_context.trim().to_string(),
        plot_direction: draft.plot_direction.trim().to_string(),
        major_factions: draft.major_factions.trim().to_string(),
        key_npcs: draft.key_npcs.trim().to_string(),
    };
    if world == WorldSettings::default() {
        return Err(ResponseError::Blank);
    }
    Ok(world)
}

/// Fill the blank fields of `given` from `draft`. Text the player wrote wins.
pub fn merge_world(given: WorldSettings, draft: WorldSettings) -> WorldSettings {
    let pick = |mine: String, theirs: String| if mine.trim().is_empty() { theirs } else { mine };
    WorldSettings {
        world_context: pick(given.world_context, draft.world_context),
        plot_direction: pick(given.plot_direction, draft.plot_direction),
        major_factions: pick(given.major_factions, draft.major_factions),
        key_npcs: pick(given.key_npcs, draft.key_npcs),
    }
}
