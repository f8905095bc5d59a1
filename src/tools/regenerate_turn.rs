//! MCP `regenerate_turn` and `retry_turn` tool parameter definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for `regenerate_turn`.
///
/// Every turn at or after `from_index` is discarded before the new prompt is played.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RegenerateTurnParams {
    #[schemars(description = "Session to rewrite")]
    pub session_id: String,

    #[schemars(
        description = "Index of the user turn to replace. It and every later turn are discarded."
    )]
    pub from_index: u32,

    #[schemars(description = "Replacement instruction played at from_index")]
    pub prompt: String,

    #[schemars(description = "Narrative length: 'short', 'medium' (default) or 'long'")]
    pub length: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RetryTurnParams {
    #[schemars(description = "Session whose last user instruction should be replayed")]
    pub session_id: String,

    #[schemars(description = "Narrative length: 'short', 'medium' (default) or 'long'")]
    pub length: Option<String>,
}
