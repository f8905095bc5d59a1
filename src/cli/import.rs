//! CLI `import` command: restore a bundle as a new session.

use anyhow::{Context, Result};
use std::path::Path;

use taleweave::story::lifecycle::StoryEngine;
use taleweave::story::transfer;

/// Restore the bundle in `file` under a new session id.
///
/// Stored embeddings are kept as-is; turns without one can be filled in
/// with `taleweave re-embed <session>`.
pub async fn import(engine: &StoryEngine, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;
    let bundle = transfer::from_json(&json)?;
    let turns = bundle.turns.len();
    let unembedded = bundle
        .turns
        .iter()
        .filter(|t| t.is_model() && t.embedding().is_none())
        .count();

    let store = std::sync::Arc::clone(engine.store());
    let session = tokio::task::spawn_blocking(move || transfer::import_bundle(store.as_ref(), bundle))
        .await
        .context("import task failed")??;

    println!("Imported {turns} turns as session {}.", session.id);
    if unembedded > 0 {
        println!(
            "{unembedded} replies have no embedding; run `taleweave re-embed {}` to make them recallable.",
            session.id
        );
    }
    Ok(())
}
