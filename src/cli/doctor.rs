//! CLI `doctor` command: database diagnostics.

use anyhow::{Context, Result};

use taleweave::config::TaleConfig;
use taleweave::db;
use taleweave::embedding::local::model_files;

pub fn doctor(config: &TaleConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("It is created on first use, e.g. `taleweave new`.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("taleweave health report");
    println!("=======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Stories:           {}", report.session_count);
    println!("Turns:             {}", report.turn_count);
    println!("Embedded replies:  {}", report.embedded_turn_count);
    println!();
    println!("Embedding model:");
    println!("  Stored:          {}", report.embedding_model.as_deref().unwrap_or("(not set)"));
    println!("  Configured:      {} ({})", config.embedding.model, config.embedding.provider);
    match &report.embedding_model {
        Some(stored) if stored != &config.embedding.model => {
            println!("  WARNING: model mismatch. Run `taleweave re-embed --all` to refresh vectors.");
        }
        Some(_) => println!("  Status:          OK (match)"),
        None => {}
    }
    if config.embedding.provider == "local" {
        let (model, tokenizer) = model_files(&config.embedding);
        if !model.exists() || !tokenizer.exists() {
            println!("  Model files missing. Run `taleweave model download`.");
        }
    }
    println!();
    println!("Generation:        {} via {}", config.generation.model, config.generation.provider);
    if std::env::var(&config.generation.api_key_env).is_err() {
        println!("  WARNING: {} is not set; new turns cannot be generated.", config.generation.api_key_env);
    }
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore the database file from a backup.");
        println!("  2. Or export each readable story and import it into a fresh database:");
        println!("     taleweave export <session> --out story.json");
        println!("     TALEWEAVE_DB=/path/to/new.db taleweave import story.json");
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
