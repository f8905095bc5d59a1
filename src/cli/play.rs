//! CLI story commands: `new`, `play`, `regenerate`, `retry`, `undo`.

use anyhow::{Context, Result};

use taleweave::story::lifecycle::StoryEngine;
use taleweave::story::types::{CharacterTraits, LengthMode, NewSession, WorldSettings};
use taleweave::story::world::{merge_world, HeroSketch};

use super::{print_state, print_turn};

/// Arguments of `taleweave new`, already parsed by clap.
pub struct NewStory {
    pub hero_name: String,
    pub gender: String,
    pub genre: String,
    pub world: WorldSettings,
    pub origin: Option<String>,
    pub talents: Vec<String>,
    pub avatar: Option<String>,
    /// Idea to draft blank world settings from.
    pub assist: Option<String>,
    pub begin: bool,
}

pub async fn new_story(engine: &StoryEngine, story: NewStory, length: LengthMode) -> Result<()> {
    let traits = (story.origin.is_some() || !story.talents.is_empty()).then(|| CharacterTraits {
        origin: story.origin.unwrap_or_default(),
        talents: story.talents,
    });
    let world = match story.assist.as_deref() {
        Some(intent) => {
            let hero = HeroSketch {
                name: story.hero_name.clone(),
                gender: story.gender.clone(),
                traits: traits.clone(),
            };
            let draft = engine
                .assist_world(&story.genre, intent, Some(&hero))
                .await
                .context("world assist failed")?;
            let world = merge_world(story.world, draft);
            print_world(&world);
            world
        }
        None => story.world,
    };

    let session = engine
        .create_session(NewSession {
            hero_name: story.hero_name,
            gender: story.gender,
            genre: story.genre,
            world,
            traits,
            avatar: story.avatar,
        })
        .await?;
    println!("Session {}", session.id);

    if story.begin {
        let result = engine.begin(&session.id, length).await?;
        print_turn(&result);
    }
    Ok(())
}

fn print_world(world: &WorldSettings) {
    println!("Setting:   {}", world.world_context);
    println!("Plot:      {}", world.plot_direction);
    println!("Factions:  {}", world.major_factions);
    println!("Key NPCs:  {}", world.key_npcs);
    println!();
}

/// Play `prompt`, or the action of option `option` (1-based) from the current state.
pub async fn play(
    engine: &StoryEngine,
    session_id: &str,
    prompt: Option<String>,
    option: Option<usize>,
    length: LengthMode,
) -> Result<()> {
    let prompt = match (prompt, option) {
        (Some(p), _) => p,
        (None, Some(n)) => {
            let loaded = engine.load_session(session_id).await?;
            let state = loaded
                .derived
                .context("no current options; pass a prompt instead")?;
            anyhow::ensure!(!state.is_game_over, "this story has ended");
            state
                .options
                .get(n.wrapping_sub(1))
                .map(|o| o.action.clone())
                .with_context(|| format!("option {n} does not exist ({} available)", state.options.len()))?
        }
        (None, None) => anyhow::bail!("pass a prompt or --option N"),
    };

    let result = engine.append(session_id, &prompt, length).await?;
    print_turn(&result);
    Ok(())
}

pub async fn regenerate(
    engine: &StoryEngine,
    session_id: &str,
    from_index: u32,
    prompt: &str,
    length: LengthMode,
) -> Result<()> {
    let result = engine.regenerate(session_id, from_index, prompt, length).await?;
    print_turn(&result);
    Ok(())
}

pub async fn retry(engine: &StoryEngine, session_id: &str, length: LengthMode) -> Result<()> {
    let result = engine.retry_last(session_id, length).await?;
    print_turn(&result);
    Ok(())
}

pub async fn undo(engine: &StoryEngine, session_id: &str) -> Result<()> {
    let outcome = engine.undo(session_id).await?;
    if outcome.removed == 0 {
        println!("Nothing to undo.");
        return Ok(());
    }
    println!(
        "Removed {} turn(s); {} remain.",
        outcome.removed,
        outcome.remaining.len()
    );
    match &outcome.derived {
        Some(state) => print_state(state),
        None => println!("(no reply left to restore state from)"),
    }
    Ok(())
}
