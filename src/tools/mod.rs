pub mod create_session;
pub mod recall_context;
pub mod regenerate_turn;
pub mod session_history;
pub mod take_turn;
pub mod undo_turn;
pub mod world_assist;

use create_session::CreateSessionParams;
use recall_context::RecallContextParams;
use regenerate_turn::{RegenerateTurnParams, RetryTurnParams};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde::Serialize;
use session_history::{ListSessionsParams, SessionHistoryParams};
use std::sync::Arc;
use take_turn::TakeTurnParams;
use undo_turn::UndoTurnParams;
use world_assist::WorldAssistParams;

use taleweave::error::EngineError;
use taleweave::story::lifecycle::{StoryEngine, TurnResult};
use taleweave::story::response::{DerivedState, StoryOption};
use taleweave::story::retrieval::RecalledMemory;
use taleweave::story::types::{LengthMode, Role, Turn};
use taleweave::story::world::WorldField;

const MAX_RECALL: usize = 20;

/// MCP tool handler over a shared [`StoryEngine`].
#[derive(Clone)]
pub struct TaleTools {
    tool_router: ToolRouter<Self>,
    engine: Arc<StoryEngine>,
}

/// Compact transcript entry. Embeddings and raw responses stay server-side.
#[derive(Debug, Serialize)]
struct TurnView<'a> {
    index: u32,
    role: Role,
    text: &'a str,
    embedded: bool,
}

impl<'a> From<&'a Turn> for TurnView<'a> {
    fn from(turn: &'a Turn) -> Self {
        Self {
            index: turn.sequence_index,
            role: turn.role(),
            text: turn.user_prompt().or(turn.narrative()).unwrap_or_default(),
            embedded: turn.embedding().is_some(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TurnReply<'a> {
    session_id: &'a str,
    user_index: u32,
    model_index: u32,
    narrative: &'a str,
    stats: &'a taleweave::story::response::Stats,
    options: &'a [StoryOption],
    is_game_over: bool,
    degraded: bool,
    recalled: &'a [RecalledMemory],
}

impl<'a> From<&'a TurnResult> for TurnReply<'a> {
    fn from(r: &'a TurnResult) -> Self {
        Self {
            session_id: &r.model_turn.session_id,
            user_index: r.user_turn.sequence_index,
            model_index: r.model_turn.sequence_index,
            narrative: &r.response.narrative,
            stats: &r.response.stats,
            options: &r.response.options,
            is_game_over: r.response.is_game_over,
            degraded: r.degraded,
            recalled: &r.recalled,
        }
    }
}

fn parse_length(length: Option<&str>) -> Result<LengthMode, String> {
    length.map_or(Ok(LengthMode::default()), str::parse)
}

fn engine_error(e: EngineError) -> String {
    if e.is_retryable() {
        format!("{e} (temporary, try again)")
    } else {
        e.to_string()
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

fn turn_reply(result: &TurnResult) -> Result<String, String> {
    to_json(&TurnReply::from(result))
}

#[tool_router]
impl TaleTools {
    pub fn new(engine: Arc<StoryEngine>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engine,
        }
    }

    #[tool(description = "Start a new story with a protagonist and world settings. By default also generates the opening scene.")]
    async fn create_session(
        &self,
        Parameters(params): Parameters<CreateSessionParams>,
    ) -> Result<String, String> {
        if params.hero_name.trim().is_empty() {
            return Err("hero_name must not be empty".into());
        }
        let length = parse_length(params.length.as_deref())?;
        tracing::info!(hero = %params.hero_name, genre = %params.genre, "create_session called");

        let session = self
            .engine
            .create_session(params.to_new_session())
            .await
            .map_err(engine_error)?;

        if !params.begin.unwrap_or(true) {
            return to_json(&serde_json::json!({ "session_id": session.id }));
        }
        let result = self
            .engine
            .begin(&session.id, length)
            .await
            .map_err(engine_error)?;
        turn_reply(&result)
    }

    #[tool(description = "Continue a story with the player's instruction. Returns the narrative, updated stats and the next options.")]
    async fn take_turn(
        &self,
        Parameters(params): Parameters<TakeTurnParams>,
    ) -> Result<String, String> {
        if params.prompt.trim().is_empty() {
            return Err("prompt must not be empty".into());
        }
        let length = parse_length(params.length.as_deref())?;
        tracing::info!(session_id = %params.session_id, %length, "take_turn called");

        let result = self
            .engine
            .append(&params.session_id, &params.prompt, length)
            .await
            .map_err(engine_error)?;
        turn_reply(&result)
    }

    #[tool(description = "Rewrite history: discard the turn at from_index and everything after it, then play a new instruction there.")]
    async fn regenerate_turn(
        &self,
        Parameters(params): Parameters<RegenerateTurnParams>,
    ) -> Result<String, String> {
        if params.prompt.trim().is_empty() {
            return Err("prompt must not be empty".into());
        }
        let length = parse_length(params.length.as_deref())?;
        tracing::info!(
            session_id = %params.session_id,
            from_index = params.from_index,
            "regenerate_turn called"
        );

        let result = self
            .engine
            .regenerate(&params.session_id, params.from_index, &params.prompt, length)
            .await
            .map_err(engine_error)?;
        turn_reply(&result)
    }

    #[tool(description = "Replay the last player instruction to get a different reply.")]
    async fn retry_turn(
        &self,
        Parameters(params): Parameters<RetryTurnParams>,
    ) -> Result<String, String> {
        let length = parse_length(params.length.as_deref())?;
        tracing::info!(session_id = %params.session_id, "retry_turn called");

        let result = self
            .engine
            .retry_last(&params.session_id, length)
            .await
            .map_err(engine_error)?;
        turn_reply(&result)
    }

    #[tool(description = "Undo the last exchange (reply plus its instruction). Returns the restored stats and options, if any.")]
    async fn undo_turn(
        &self,
        Parameters(params): Parameters<UndoTurnParams>,
    ) -> Result<String, String> {
        tracing::info!(session_id = %params.session_id, "undo_turn called");
        let outcome = self
            .engine
            .undo(&params.session_id)
            .await
            .map_err(engine_error)?;

        #[derive(Serialize)]
        struct UndoReply<'a> {
            removed: usize,
            remaining: usize,
            state: Option<&'a DerivedState>,
        }
        to_json(&UndoReply {
            removed: outcome.removed,
            remaining: outcome.remaining.len(),
            state: outcome.derived.as_ref(),
        })
    }

    #[tool(description = "List stories, newest first.")]
    async fn list_sessions(
        &self,
        Parameters(_params): Parameters<ListSessionsParams>,
    ) -> Result<String, String> {
        let sessions = self.engine.list_sessions().await.map_err(engine_error)?;
        let summaries: Vec<serde_json::Value> = sessions
            .iter()
            .map(|s| {
                serde_json::json!({
                    "session_id": s.id,
                    "hero_name": s.hero_name,
                    "genre": s.genre,
                    "created_at": s.created_at,
                })
            })
            .collect();
        to_json(&summaries)
    }

    #[tool(description = "Show a story's settings, transcript and current stats/options.")]
    async fn session_history(
        &self,
        Parameters(params): Parameters<SessionHistoryParams>,
    ) -> Result<String, String> {
        let loaded = self
            .engine
            .load_session(&params.session_id)
            .await
            .map_err(engine_error)?;

        let skip = params
            .last
            .map_or(0, |n| loaded.turns.len().saturating_sub(n));
        let turns: Vec<TurnView<'_>> = loaded.turns[skip..].iter().map(TurnView::from).collect();
        to_json(&serde_json::json!({
            "session": loaded.session,
            "turn_count": loaded.turns.len(),
            "turns": turns,
            "state": loaded.derived,
        }))
    }

    #[tool(description = "Draft world settings for a new story from a short idea, or write a single setting field. Nothing is saved; pass the result to create_session.")]
    async fn world_assist(
        &self,
        Parameters(params): Parameters<WorldAssistParams>,
    ) -> Result<String, String> {
        let hero = params.hero();
        if let Some(field) = params.field.as_deref() {
            let field: WorldField = field.parse()?;
            tracing::info!(genre = %params.genre, %field, "world_assist called for one field");
            let text = self
                .engine
                .assist_world_field(
                    &params.genre,
                    field,
                    params.current_context.as_deref().unwrap_or_default(),
                    hero.as_ref(),
                )
                .await
                .map_err(engine_error)?;
            return to_json(&serde_json::json!({ field.as_str(): text }));
        }

        let intent = params.intent.as_deref().unwrap_or_default();
        if intent.trim().is_empty() {
            return Err("intent must not be empty unless field is set".into());
        }
        tracing::info!(genre = %params.genre, "world_assist called");
        let world = self
            .engine
            .assist_world(&params.genre, intent, hero.as_ref())
            .await
            .map_err(engine_error)?;
        to_json(&world)
    }

    #[tool(description = "Preview which earlier passages a query would recall from a story.")]
    async fn recall_context(
        &self,
        Parameters(params): Parameters<RecallContextParams>,
    ) -> Result<String, String> {
        if params.query.trim().is_empty() {
            return Err("query must not be empty".into());
        }
        let top_k = params.top_k.map(|k| k.clamp(1, MAX_RECALL));
        let memories = self
            .engine
            .recall(&params.session_id, &params.query, top_k)
            .await
            .map_err(engine_error)?;

        let results: Vec<serde_json::Value> = memories
            .iter()
            .map(|m| {
                serde_json::json!({
                    "index": m.turn.sequence_index,
                    "score": m.score,
                    "narrative": m.turn.narrative().unwrap_or_default(),
                })
            })
            .collect();
        to_json(&results)
    }
}

#[tool_handler]
impl ServerHandler for TaleTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "taleweave runs interactive stories. Use world_assist to draft a setting, \
                 create_session to start a story, take_turn to continue, regenerate_turn/retry_turn/undo_turn to rewrite history and \
                 session_history to read it back."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
