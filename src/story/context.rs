//! Context assembly for a generation request.
//!
//! Turns the stored history, recalled memories and the new prompt into the
//! ordered message sequence the generator receives. Assembly is pure and
//! deterministic; invoking the generator happens elsewhere.
//!
//! Model turns are replayed from their raw structured response together with
//! their continuity token, so the generator sees exactly what it emitted.

use serde::Serialize;

use crate::story::retrieval::ScoredTurn;
use crate::story::types::{LengthMode, Role, Session, Turn, TurnContent};

/// Header line of the memory preamble.
pub const MEMORY_HEADER: &str = "[RELEVANT MEMORIES]";

/// One role-tagged block sent to the generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextMessage {
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuity_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    /// History blocks in index order, then the final user block.
    pub messages: Vec<ContextMessage>,
}

impl AssembledContext {
    /// The final user block (preamble + prompt + length directive).
    pub fn final_prompt(&self) -> &str {
        self.messages.last().map(|m| m.text.as_str()).unwrap_or_default()
    }
}

pub fn assemble_context(
    history: &[Turn],
    memories: &[ScoredTurn],
    prompt: &str,
    length: LengthMode,
    excerpt_chars: usize,
) -> AssembledContext {
    let mut messages: Vec<ContextMessage> = history.iter().map(history_message).collect();

    let preamble = memory_preamble(memories, excerpt_chars);
    let mut final_text = String::new();
    if !preamble.is_empty() {
        final_text.push_str(&preamble);
        final_text.push_str("\n\n");
    }
    final_text.push_str(prompt);
    final_text.push('\n');
    final_text.push_str(length.directive());

    messages.push(ContextMessage {
        role: Role::User,
        text: final_text,
        continuity_token: None,
    });

    AssembledContext { messages }
}

fn history_message(turn: &Turn) -> ContextMessage {
    match &turn.content {
        TurnContent::User { prompt } => ContextMessage {
            role: Role::User,
            text: prompt.clone(),
            continuity_token: None,
        },
        TurnContent::Model {
            narrative,
            raw_response,
            continuity_token,
            ..
        } => ContextMessage {
            role: Role::Model,
            // Older imports may lack the raw response; the narrative is the next best thing.
            text: if raw_response.is_empty() {
                narrative.clone()
            } else {
                raw_response.clone()
            },
            continuity_token: continuity_token.clone(),
        },
    }
}

/// Render recalled memories, best first, or an empty string when there are none.
pub fn memory_preamble(memories: &[ScoredTurn], excerpt_chars: usize) -> String {
    if memories.is_empty() {
        return String::new();
    }

    let mut ordered: Vec<&ScoredTurn> = memories.iter().collect();
    ordered.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut out = String::from(MEMORY_HEADER);
    for memory in ordered {
        let narrative = memory.turn.narrative().unwrap_or_default();
        out.push_str("\n- ");
        out.push_str(excerpt(narrative, excerpt_chars));
        out.push_str("...");
    }
    out
}

/// At most `max_chars` characters of `text`, cut on a character boundary.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Tone and vocabulary notes for a genre tag. Unknown genres get a neutral
/// guide rather than borrowing another genre's terms.
pub fn style_guide(genre: &str) -> &'static str {
    match genre.trim().to_ascii_lowercase().as_str() {
        "slice_of_life" | "urban" => {
            "- Tone: modern urban life, campus youth, everyday drama.\n\
             - Vocabulary: contemporary slang and social terms.\n\
             - Avoid: cultivation or archaic court terms unless a character is joking or gaming.\n"
        }
        "fantasy" => {
            "- Tone: western high fantasy.\n\
             - Vocabulary: mages, knights, dragons, elves, dwarves, bards.\n\
             - Avoid: eastern martial terms such as inner energy or dantian.\n"
        }
        "scifi" | "sci-fi" | "post_apocalyptic" => {
            "- Tone: science fiction or apocalypse survival.\n\
             - Vocabulary: mecha, starships, implants, mutations, zombies, base camps.\n"
        }
        "historical" => {
            "- Tone: historical, military and court intrigue.\n\
             - Vocabulary: formal and archaic, with ranks and titles of the court and battlefield.\n"
        }
        "detective" | "horror" => {
            "- Tone: dark, suspenseful, investigative.\n\
             - Vocabulary: psychological detail, crime scenes, the supernatural.\n"
        }
        "cultivation" | "xianxia" => {
            "- Tone: eastern cultivation, mystical and archaic.\n\
             - Vocabulary: realms, tribulations, inner demons, fortuitous encounters.\n\
             - Address: formal archaic forms between seniors and juniors.\n"
        }
        _ => "- Tone: consistent with the setting above; keep vocabulary true to the world.\n",
    }
}

/// System instruction describing the story's fixed setting.
pub fn system_instruction(session: &Session) -> String {
    let mut out = format!(
        "# ROLE\nYou are the game master of an interactive {genre} text adventure.\n\n\
         # WORLD SETTINGS (follow strictly)\n\
         - Setting: {context}\n\
         - Factions: {factions}\n\
         - Key NPCs: {npcs}\n\
         - Plot direction: {plot}\n\n\
         # PROTAGONIST\n\
         - Name: {name}\n\
         - Gender: {gender}\n",
        genre = session.genre,
        context = session.world.world_context,
        factions = session.world.major_factions,
        npcs = session.world.key_npcs,
        plot = session.world.plot_direction,
        name = session.hero_name,
        gender = session.gender,
    );
    if let Some(traits) = &session.traits {
        out.push_str(&format!(
            "- Origin: {}\n- Talents: {}\n",
            traits.origin,
            traits.talents.join(", ")
        ));
    }
    out.push_str("\n# STYLE\n");
    out.push_str(style_guide(&session.genre));
    out.push_str(
        "\n# GAMEPLAY\n\
         1. Describe the current situation.\n\
         2. Offer 3-4 options that fit the setting.\n\
         3. Update the protagonist's stats, naming them in the genre's own terms.\n\n\
         # OUTPUT FORMAT\n\
         Return only JSON with the fields narrative, stats, options and isGameOver.\n",
    );
    out
}

/// First instruction of a new story.
pub fn opening_prompt(session: &Session) -> String {
    let traits = session
        .traits
        .as_ref()
        .map(|t| format!(" Origin: {}. Talents: {}.", t.origin, t.talents.join(", ")))
        .unwrap_or_default();
    format!(
        "[ACTION]: Create a {} character named {}.{} Begin the story following the provided world settings.",
        session.gender, session.hero_name, traits
    )
}
