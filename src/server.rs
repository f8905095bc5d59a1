//! Engine wiring and the MCP server entry points.
//!
//! [`build_engine`] opens the database and creates the embedding and
//! generation backends; the CLI and both MCP transports share it.

use anyhow::{Context, Result};
use rmcp::ServiceExt;
use std::sync::Arc;

use taleweave::config::TaleConfig;
use taleweave::db;
use taleweave::embedding::{self, EmbeddingProvider};
use taleweave::generation::{self, Generator, UnconfiguredGenerator};
use taleweave::story::lifecycle::{EngineSettings, StoryEngine};
use taleweave::story::store::{SqliteTurnStore, TurnStore};

use crate::tools::TaleTools;

/// Open the store and construct the engine from config.
///
/// A generator that cannot be built (no API key, unknown provider) is
/// replaced by one that fails on use, so read-only commands still run.
pub fn build_engine(config: &TaleConfig) -> Result<StoryEngine> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path).context("failed to open database")?;
    tracing::info!(db = %db_path.display(), "database ready");

    if let Ok(Some(stored_model)) = db::migrations::get_embedding_model(&conn) {
        if stored_model != config.embedding.model {
            tracing::warn!(
                stored = %stored_model,
                configured = %config.embedding.model,
                "embedding model changed; run `taleweave re-embed --all` to refresh stored vectors"
            );
        }
    }
    let store: Arc<dyn TurnStore> = Arc::new(SqliteTurnStore::new(conn));

    let embedder: Arc<dyn EmbeddingProvider> = Arc::from(
        embedding::create_provider(&config.embedding).context("failed to create embedding provider")?,
    );
    tracing::info!(provider = %config.embedding.provider, "embedding provider ready");

    let generator: Arc<dyn Generator> = match generation::create_generator(&config.generation) {
        Ok(g) => {
            tracing::info!(model = %config.generation.model, "generator ready");
            Arc::from(g)
        }
        Err(e) => {
            tracing::warn!(error = %e, "generator unavailable; turns cannot be generated");
            Arc::new(UnconfiguredGenerator::new(e.to_string()))
        }
    };

    Ok(StoryEngine::new(
        store,
        embedder,
        generator,
        EngineSettings::from_config(config),
    ))
}

/// Start the MCP server over stdio.
pub async fn serve_stdio(config: TaleConfig) -> Result<()> {
    tracing::info!("starting taleweave MCP server on stdio");
    let engine = Arc::new(build_engine(&config)?);

    let server = TaleTools::new(engine).serve(rmcp::transport::stdio()).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");
    Ok(())
}

/// Start the MCP server over Streamable HTTP at `/mcp`.
pub async fn serve_http(config: TaleConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting taleweave MCP server on HTTP");

    let engine = Arc::new(build_engine(&config)?);
    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(TaleTools::new(Arc::clone(&engine))),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );
    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;
    Ok(())
}
