//! CLI `recall` command: preview which passages a query would bring back.

use anyhow::Result;

use taleweave::story::context::excerpt;
use taleweave::story::lifecycle::StoryEngine;

pub async fn recall(engine: &StoryEngine, session_id: &str, query: &str, top_k: Option<usize>) -> Result<()> {
    let memories = engine.recall(session_id, query, top_k).await?;
    if memories.is_empty() {
        println!("No memories recalled (nothing embedded yet, or the query could not be embedded).");
        return Ok(());
    }
    for m in &memories {
        let narrative = m.turn.narrative().unwrap_or_default();
        println!(
            "[{}] {:.3}  {}...",
            m.turn.sequence_index,
            m.score,
            excerpt(narrative, engine.settings().excerpt_chars)
        );
    }
    Ok(())
}
