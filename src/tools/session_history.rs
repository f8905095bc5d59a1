//! MCP `list_sessions` and `session_history` tool parameter definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `list_sessions` takes no arguments.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListSessionsParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SessionHistoryParams {
    #[schemars(description = "Session to show")]
    pub session_id: String,

    /// Only the last N turns. Omit for the whole transcript.
    #[schemars(description = "Return only the last N turns. Omit for the full transcript.")]
    pub last: Option<usize>,
}
