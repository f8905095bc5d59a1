//! CLI `export` command: write a session bundle as JSON.

use anyhow::{Context, Result};
use std::path::Path;

use taleweave::story::lifecycle::StoryEngine;
use taleweave::story::transfer;

/// Export one session to `out`, or to stdout when no path is given.
pub async fn export(engine: &StoryEngine, session_id: &str, out: Option<&Path>) -> Result<()> {
    let store = std::sync::Arc::clone(engine.store());
    let id = session_id.to_string();
    let bundle = tokio::task::spawn_blocking(move || transfer::export_session(store.as_ref(), &id))
        .await
        .context("export task failed")??;
    let json = transfer::to_json(&bundle)?;

    match out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Exported {} turns to {}.", bundle.turns.len(), path.display());
        }
        None => {
            println!("{json}");
            eprintln!("Exported {} turns.", bundle.turns.len());
        }
    }
    Ok(())
}
