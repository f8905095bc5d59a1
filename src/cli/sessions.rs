//! CLI `sessions`, `show` and `delete` commands.

use anyhow::Result;

use taleweave::story::lifecycle::StoryEngine;
use taleweave::story::types::TurnContent;

use super::print_state;

pub async fn list(engine: &StoryEngine) -> Result<()> {
    let sessions = engine.list_sessions().await?;
    if sessions.is_empty() {
        println!("No stories yet. Start one with `taleweave new`.");
        return Ok(());
    }
    for s in sessions {
        println!("{}  {:<20} {:<14} {}", s.id, s.hero_name, s.genre, s.created_at);
    }
    Ok(())
}

pub async fn show(engine: &StoryEngine, session_id: &str, last: Option<usize>) -> Result<()> {
    let loaded = engine.load_session(session_id).await?;
    let session = &loaded.session;

    println!("{} ({}, {})", session.hero_name, session.gender, session.genre);
    println!("Created {}", session.created_at);
    if !session.world.world_context.is_empty() {
        println!("World: {}", session.world.world_context);
    }
    if let Some(traits) = &session.traits {
        println!("Origin: {} | Talents: {}", traits.origin, traits.talents.join(", "));
    }
    println!();

    let skip = last.map_or(0, |n| loaded.turns.len().saturating_sub(n));
    for turn in &loaded.turns[skip..] {
        match &turn.content {
            TurnContent::User { prompt } => println!("[{}] > {}", turn.sequence_index, prompt),
            TurnContent::Model { narrative, .. } => {
                println!("[{}] {}", turn.sequence_index, narrative);
                println!();
            }
        }
    }

    if let Some(state) = &loaded.derived {
        print_state(state);
    }
    Ok(())
}

pub async fn delete(engine: &StoryEngine, session_id: &str, confirm: bool) -> Result<()> {
    anyhow::ensure!(confirm, "deleting a story is permanent; pass --confirm to proceed");
    if engine.delete_session(session_id).await? {
        println!("Deleted {session_id}.");
    } else {
        println!("No session {session_id}.");
    }
    Ok(())
}
