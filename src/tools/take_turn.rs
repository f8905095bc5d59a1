//! MCP `take_turn` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TakeTurnParams {
    #[schemars(description = "Session to continue")]
    pub session_id: String,

    /// The player's instruction, usually one of the offered option actions.
    #[schemars(description = "The player's instruction, e.g. the 'action' of an offered option")]
    pub prompt: String,

    #[schemars(description = "Narrative length: 'short', 'medium' (default) or 'long'")]
    pub length: Option<String>,
}
