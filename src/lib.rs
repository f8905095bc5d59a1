//! Interactive narrative engine with causal, retrieval-augmented memory.
//!
//! A story is a [`story::types::Session`] plus an ordered transcript of
//! turns. Each player instruction is answered by a generated reply whose
//! narrative is embedded, so later prompts can recall relevant earlier
//! passages. Recall is causal: a request only ever sees turns that come
//! before the point being generated, even while a regenerate is replacing
//! later history.
//!
//! # Architecture
//!
//! - **Storage**: SQLite, one row per turn, embeddings as `f32` BLOBs
//! - **Embeddings**: local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions)
//! - **Retrieval**: cosine top-K over a session's embedded model turns
//! - **Generation**: Gemini `generateContent` with structured JSON output
//! - **Transport**: CLI, or MCP over stdio / Streamable HTTP
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, health checks
//! - [`embedding`]: text-to-vector providers
//! - [`generation`]: generative backends
//! - [`story`]: turn store, retrieval, context assembly, lifecycle, import/export
//! - [`error`]: error types shared by the above

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod story;
