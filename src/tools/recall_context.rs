//! MCP `recall_context` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Preview which earlier passages a prompt would bring back.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecallContextParams {
    #[schemars(description = "Session to search")]
    pub session_id: String,

    #[schemars(description = "Text to match against earlier narrative")]
    pub query: String,

    #[schemars(description = "Maximum number of passages (1-20). Defaults to the configured top_k.")]
    pub top_k: Option<usize>,
}
