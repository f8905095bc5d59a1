//! MCP `undo_turn` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UndoTurnParams {
    #[schemars(
        description = "Session to roll back. Removes the last reply and its instruction, or a dangling instruction on its own."
    )]
    pub session_id: String,
}
