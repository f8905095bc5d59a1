//! CLI `re-embed` command: fill in or refresh narrative embeddings.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use taleweave::config::TaleConfig;
use taleweave::db;
use taleweave::story::lifecycle::StoryEngine;

/// Embed model turns that lack a vector, or all of them with `all`.
///
/// Without a session id every story is processed. A full refresh of every
/// story also records the configured model as the one behind stored vectors;
/// any failed batch aborts the run before that happens.
pub async fn re_embed(
    config: &TaleConfig,
    engine: &StoryEngine,
    session_id: Option<&str>,
    all: bool,
) -> Result<()> {
    let session_ids: Vec<String> = match session_id {
        Some(id) => vec![id.to_string()],
        None => engine.list_sessions().await?.into_iter().map(|s| s.id).collect(),
    };
    if session_ids.is_empty() {
        println!("No stories to re-embed.");
        return Ok(());
    }

    println!(
        "Embedding {} replies in {} stor{} with model '{}'...",
        if all { "all" } else { "missing" },
        session_ids.len(),
        if session_ids.len() == 1 { "y" } else { "ies" },
        config.embedding.model
    );

    let pb = ProgressBar::new(session_ids.len() as u64).with_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );

    let mut updated = 0;
    for id in &session_ids {
        match engine.backfill_embeddings(id, all).await {
            Ok(n) => updated += n,
            Err(e) => {
                pb.abandon();
                return Err(e).with_context(|| {
                    format!("re-embedding story {id} failed after {updated} updates; embedding model not recorded")
                });
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if all && session_id.is_none() {
        let conn = db::open_database(config.resolved_db_path()).context("failed to open database")?;
        db::migrations::set_embedding_model(&conn, &config.embedding.model)?;
    }

    println!("Updated {updated} embeddings.");
    Ok(())
}
