pub mod doctor;
pub mod export;
pub mod import;
pub mod play;
pub mod re_embed;
pub mod recall;
pub mod sessions;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use taleweave::config::EmbeddingConfig;
use taleweave::embedding::local::model_files;
use taleweave::story::lifecycle::TurnResult;
use taleweave::story::response::DerivedState;

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Download the ONNX embedding model and tokenizer into the cache directory.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let (model_path, tokenizer_path) = model_files(config);
    if let Some(dir) = model_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create cache dir: {}", dir.display()))?;
    }

    for (label, url, dest) in [
        ("model.onnx (~90MB)", MODEL_URL, &model_path),
        ("tokenizer.json", TOKENIZER_URL, &tokenizer_path),
    ] {
        if dest.exists() {
            println!("Already present: {}", dest.display());
            continue;
        }
        println!("Downloading {label}...");
        download_file(url, dest).await?;
        println!("Saved to {}", dest.display());
    }

    println!("Embedding model ready.");
    Ok(())
}

/// Stream `url` to `dest` with a progress bar, writing to a temp file first.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;
    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => ProgressBar::new(size).with_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")?
                .progress_chars("##-"),
        ),
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk).await.context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;
    pb.finish_and_clear();
    Ok(())
}

/// Print a generated turn the way a player reads it.
pub fn print_turn(result: &TurnResult) {
    println!();
    println!("{}", result.response.narrative);
    println!();
    if result.degraded {
        println!("(reply could not be parsed; showing a recovered excerpt)");
    }
    print_state(&DerivedState {
        stats: result.response.stats.clone(),
        options: result.response.options.clone(),
        is_game_over: result.response.is_game_over,
    });
    println!(
        "[turns {}-{} | {} memories recalled]",
        result.user_turn.sequence_index,
        result.model_turn.sequence_index,
        result.recalled.len()
    );
}

pub fn print_state(state: &DerivedState) {
    let stats = &state.stats;
    println!("{} | {} | {}", stats.name, stats.realm, stats.status);
    if !stats.inventory.is_empty() {
        println!("Inventory: {}", stats.inventory.join(", "));
    }
    if state.is_game_over {
        println!("*** THE END ***");
        return;
    }
    for (i, option) in state.options.iter().enumerate() {
        println!("  {}. {} ({:?})", i + 1, option.label, option.kind);
    }
}
