//! Text-to-vector embedding for narrative recall.
//!
//! Model narratives and player prompts are embedded with the same provider
//! so they share one vector space. [`create_provider`] picks the provider
//! from configuration: the local ONNX model, or `"none"` to run without
//! recall.

pub mod local;

use anyhow::Result;

/// Number of dimensions produced by all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

/// Synchronous text embedder.
///
/// Callers in async contexts go through `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Provider that never produces a vector. Turns are stored unembedded and
/// retrieval always comes back empty.
pub struct NoopProvider;

impl EmbeddingProvider for NoopProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(Vec::new())
    }

    fn dimensions(&self) -> usize {
        0
    }
}

/// Create an embedding provider from config.
///
/// `"local"` needs the model files on disk (`taleweave model download`).
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => Ok(Box::new(local::LocalEmbeddingProvider::new(config)?)),
        "none" => {
            tracing::warn!("embedding provider disabled; memories will not be recalled");
            Ok(Box::new(NoopProvider))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local, none"),
    }
}
