//! Session and turn lifecycle.
//!
//! [`StoryEngine`] owns the append / regenerate / undo state machine over a
//! session's transcript. Every mutating operation holds the session's lock
//! from the moment it reads the history length until its last write, so the
//! derived indices can never race.
//!
//! A turn runs as a fixed pipeline:
//!
//! 1. persist the user turn at index `N` (it survives a failed generation)
//! 2. embed the prompt and recall memories strictly below `N`
//! 3. assemble the context and call the generator under a timeout
//! 4. validate the structured reply (or degrade, if configured)
//! 5. embed the narrative and persist the model turn at `N + 1`

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::config::TaleConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{EngineError, StoreError};
use crate::generation::{GeneratedReply, GenerationError, GenerationRequest, Generator, ResponseFormat};
use crate::story::context::{assemble_context, opening_prompt, system_instruction, ContextMessage};
use crate::story::locks::SessionLocks;
use crate::story::response::{
    derived_state, fallback_response, parse_story_response, DerivedState, ResponseError, StoryResponse,
};
use crate::story::retrieval::{find_relevant_context, RecalledMemory, ScoredTurn, DEFAULT_TOP_K};
use crate::story::store::TurnStore;
use crate::story::types::{LengthMode, NewSession, NewTurn, Role, Session, Turn, TurnContent, WorldSettings};
use crate::story::world::{
    assist_system_instruction, field_prompt, parse_world_settings, world_prompt, HeroSketch, WorldField,
};

const BACKFILL_BATCH: usize = 32;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub top_k: usize,
    pub excerpt_chars: usize,
    pub generation_timeout: Duration,
    pub embedding_timeout: Duration,
    pub fallback_on_malformed: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            excerpt_chars: 150,
            generation_timeout: Duration::from_secs(120),
            embedding_timeout: Duration::from_secs(30),
            fallback_on_malformed: true,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &TaleConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            excerpt_chars: config.retrieval.excerpt_chars,
            generation_timeout: config.generation.timeout(),
            embedding_timeout: config.embedding.timeout(),
            fallback_on_malformed: config.generation.fallback_on_malformed,
        }
    }
}

/// Outcome of a completed append, regenerate or retry.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub user_turn: Turn,
    pub model_turn: Turn,
    pub response: StoryResponse,
    /// The model turn holds fallback content built from an unparseable reply.
    pub degraded: bool,
    pub recalled: Vec<RecalledMemory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UndoOutcome {
    pub removed: usize,
    pub remaining: Vec<Turn>,
    pub derived: Option<DerivedState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadedSession {
    pub session: Session,
    pub turns: Vec<Turn>,
    pub derived: Option<DerivedState>,
}

pub struct StoryEngine {
    store: Arc<dyn TurnStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    settings: EngineSettings,
    locks: SessionLocks,
}

impl StoryEngine {
    pub fn new(
        store: Arc<dyn TurnStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            settings,
            locks: SessionLocks::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn TurnStore> {
        &self.store
    }

    // --- session catalogue ---

    pub async fn create_session(&self, new: NewSession) -> Result<Session, EngineError> {
        let session = self.with_store(move |s| s.create_session(&new)).await?;
        info!(session_id = %session.id, hero = %session.hero_name, "session created");
        Ok(session)
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, EngineError> {
        Ok(self.with_store(|s| s.list_sessions()).await?)
    }

    /// Session, transcript and the state shown after its last model turn.
    pub async fn load_session(&self, session_id: &str) -> Result<LoadedSession, EngineError> {
        let session = self.require_session(session_id).await?;
        let turns = self.history(session_id).await?;
        let derived = derived_state(&turns);
        Ok(LoadedSession {
            session,
            turns,
            derived,
        })
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool, EngineError> {
        let _guard = self.locks.acquire(session_id).await;
        let id = session_id.to_string();
        let deleted = self.with_store(move |s| s.delete_session(&id)).await?;
        self.locks.forget(session_id);
        if deleted {
            info!(session_id, "session deleted");
        }
        Ok(deleted)
    }

    // --- transcript operations ---

    /// Play the opening instruction built from the session's character sheet.
    pub async fn begin(&self, session_id: &str, length: LengthMode) -> Result<TurnResult, EngineError> {
        let session = self.require_session(session_id).await?;
        self.append(session_id, &opening_prompt(&session), length).await
    }

    /// Normal play: the user turn goes at the current length `N`, the model
    /// turn at `N + 1`.
    pub async fn append(
        &self,
        session_id: &str,
        prompt: &str,
        length: LengthMode,
    ) -> Result<TurnResult, EngineError> {
        let (_guard, session) = self.lock_session(session_id).await?;
        let history = self.history(session_id).await?;
        self.run_turn(&session, history, prompt, length).await
    }

    /// Drop every turn at or after `from_index`, then play `prompt` there.
    ///
    /// Recall is limited to turns below `from_index` regardless of what is
    /// still in storage.
    pub async fn regenerate(
        &self,
        session_id: &str,
        from_index: u32,
        prompt: &str,
        length: LengthMode,
    ) -> Result<TurnResult, EngineError> {
        let (_guard, session) = self.lock_session(session_id).await?;
        let history = self.history(session_id).await?;
        self.regenerate_locked(&session, history, from_index, prompt, length)
            .await
    }

    /// Regenerate from the last user turn, reusing its prompt.
    pub async fn retry_last(&self, session_id: &str, length: LengthMode) -> Result<TurnResult, EngineError> {
        let (_guard, session) = self.lock_session(session_id).await?;
        let history = self.history(session_id).await?;

        let (index, prompt) = history
            .iter()
            .rev()
            .find_map(|t| t.user_prompt().map(|p| (t.sequence_index, p.to_string())))
            .ok_or(EngineError::NothingToRetry)?;
        debug!(session_id, index, "retrying last user turn");
        self.regenerate_locked(&session, history, index, &prompt, length)
            .await
    }

    /// Roll back the last exchange: a model turn goes together with the user
    /// turn before it, a dangling user turn goes alone. Empty history is a no-op.
    pub async fn undo(&self, session_id: &str) -> Result<UndoOutcome, EngineError> {
        let (_guard, _session) = self.lock_session(session_id).await?;
        let mut history = self.history(session_id).await?;

        if history.is_empty() {
            return Ok(UndoOutcome {
                removed: 0,
                remaining: history,
                derived: None,
            });
        }
        let last_is_model = history.last().is_some_and(Turn::is_model);
        let drop_count = if last_is_model { history.len().min(2) } else { 1 };
        let cutoff = (history.len() - drop_count) as u32;

        let id = session_id.to_string();
        let removed = self.with_store(move |s| s.delete_from(&id, cutoff)).await?;
        history.truncate(cutoff as usize);
        let derived = derived_state(&history);
        info!(session_id, removed, remaining = history.len(), "undo");

        Ok(UndoOutcome {
            removed,
            remaining: history,
            derived,
        })
    }

    /// Memories `query` would recall against the full current history.
    pub async fn recall(
        &self,
        session_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<ScoredTurn>, EngineError> {
        self.require_session(session_id).await?;
        let vector = self.embed_text(query).await;
        let top_k = top_k.unwrap_or(self.settings.top_k);
        let id = session_id.to_string();
        let memories = self
            .with_store(move |s| {
                let cutoff = s.count(&id)?;
                find_relevant_context(s, &id, &vector, cutoff, top_k)
            })
            .await?;
        Ok(memories)
    }

    /// Embed model turns that have no vector (or every model turn when `all`).
    /// Returns the number of turns updated.
    ///
    /// Stops at the first batch that fails or comes back short, returning
    /// [`EngineError::Embedding`]. Batches written before it are kept.
    pub async fn backfill_embeddings(&self, session_id: &str, all: bool) -> Result<usize, EngineError> {
        let (_guard, _session) = self.lock_session(session_id).await?;
        let history = self.history(session_id).await?;
        let pending: Vec<(u32, String)> = history
            .iter()
            .filter(|t| all || t.embedding().is_none())
            .filter_map(|t| match t.narrative() {
                Some(n) if !n.is_empty() => Some((t.sequence_index, n.to_string())),
                _ => None,
            })
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let mut updated = 0;
        for chunk in pending.chunks(BACKFILL_BATCH) {
            let (indices, texts): (Vec<u32>, Vec<String>) = chunk.iter().cloned().unzip();
            let first = indices[0];
            let embedder = Arc::clone(&self.embedder);
            let vectors = tokio::task::spawn_blocking(move || {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                embedder.embed_batch(&refs)
            })
            .await
            .map_err(|e| EngineError::Embedding(format!("embedding task failed: {e}")))?
            .map_err(|e| EngineError::Embedding(format!("batch starting at turn {first}: {e}")))?;

            let usable = vectors.iter().filter(|v| !v.is_empty()).count();
            if vectors.len() != indices.len() || usable != indices.len() {
                return Err(EngineError::Embedding(format!(
                    "batch starting at turn {first}: expected {} vectors, got {usable} usable of {}",
                    indices.len(),
                    vectors.len()
                )));
            }

            let writes: Vec<(u32, Vec<f32>)> = indices.into_iter().zip(vectors).collect();
            let id = session_id.to_string();
            updated += self
                .with_store(move |s| {
                    for (index, vector) in &writes {
                        s.set_embedding(&id, *index, vector)?;
                    }
                    Ok(writes.len())
                })
                .await?;
        }
        info!(session_id, updated, "embeddings backfilled");
        Ok(updated)
    }

    // --- world building ---

    /// Draft all four world-setting fields from a short intent.
    pub async fn assist_world(
        &self,
        genre: &str,
        intent: &str,
        hero: Option<&HeroSketch>,
    ) -> Result<WorldSettings, EngineError> {
        let request = Self::single_prompt(
            assist_system_instruction(genre),
            world_prompt(genre, intent, hero),
            ResponseFormat::WorldSettings,
        );
        let reply = self.generate(&request).await.inspect_err(|e| {
            warn!(genre, error = %e, "world assist failed");
        })?;
        let world = parse_world_settings(&reply.text)?;
        info!(genre, "world settings drafted");
        Ok(world)
    }

    /// Write one world-setting field as plain text, building on `current_context`.
    pub async fn assist_world_field(
        &self,
        genre: &str,
        field: WorldField,
        current_context: &str,
        hero: Option<&HeroSketch>,
    ) -> Result<String, EngineError> {
        let request = Self::single_prompt(
            assist_system_instruction(genre),
            field_prompt(genre, field, current_context, hero),
            ResponseFormat::PlainText,
        );
        let reply = self.generate(&request).await.inspect_err(|e| {
            warn!(genre, %field, error = %e, "world field assist failed");
        })?;
        let text = reply.text.trim();
        if text.is_empty() {
            return Err(ResponseError::Blank.into());
        }
        debug!(genre, %field, chars = text.len(), "world field drafted");
        Ok(text.to_string())
    }

    // --- pipeline ---

    async fn regenerate_locked(
        &self,
        session: &Session,
        mut history: Vec<Turn>,
        from_index: u32,
        prompt: &str,
        length: LengthMode,
    ) -> Result<TurnResult, EngineError> {
        if from_index as usize > history.len() {
            return Err(EngineError::IndexOutOfRange {
                index: from_index,
                len: history.len(),
            });
        }

        // Nothing may be inserted until the suffix is gone.
        let id = session.id.clone();
        let removed = self
            .with_store(move |s| s.delete_from(&id, from_index))
            .await?;
        history.truncate(from_index as usize);
        debug!(session_id = %session.id, from_index, removed, "history truncated for regenerate");

        self.run_turn(session, history, prompt, length).await
    }

    async fn run_turn(
        &self,
        session: &Session,
        history: Vec<Turn>,
        prompt: &str,
        length: LengthMode,
    ) -> Result<TurnResult, EngineError> {
        let started = Instant::now();
        let cutoff = history.len() as u32;

        let user_turn = self
            .persist(NewTurn {
                session_id: session.id.clone(),
                sequence_index: cutoff,
                content: TurnContent::User {
                    prompt: prompt.to_string(),
                },
            })
            .await?;

        let query = self.embed_text(prompt).await;
        let memories = self.recall_below(&session.id, query, cutoff).await?;
        let recalled: Vec<RecalledMemory> = memories.iter().map(RecalledMemory::from).collect();

        let context = assemble_context(&history, &memories, prompt, length, self.settings.excerpt_chars);
        let request = GenerationRequest {
            system_instruction: system_instruction(session),
            messages: context.messages,
            length,
            format: ResponseFormat::Story,
        };

        let reply = match self.generate(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(session_id = %session.id, index = cutoff, error = %e, "generation failed; user turn kept");
                return Err(e.into());
            }
        };

        let (mut response, degraded) = match parse_story_response(&reply.text) {
            Ok(parsed) => (parsed, false),
            Err(e) if self.settings.fallback_on_malformed && !reply.text.trim().is_empty() => {
                warn!(session_id = %session.id, error = %e, "malformed reply; storing degraded turn");
                (fallback_response(&reply.text, session), true)
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "malformed reply; no model turn written");
                return Err(e.into());
            }
        };
        response.merge_traits(session.traits.as_ref());

        let narrative_vector = self.embed_text(&response.narrative).await;
        let model_turn = self
            .persist(NewTurn {
                session_id: session.id.clone(),
                sequence_index: cutoff + 1,
                content: TurnContent::Model {
                    narrative: response.narrative.clone(),
                    raw_response: reply.text,
                    embedding: (!narrative_vector.is_empty()).then_some(narrative_vector),
                    continuity_token: reply.continuity_token,
                },
            })
            .await?;

        info!(
            session_id = %session.id,
            user_index = user_turn.sequence_index,
            model_index = model_turn.sequence_index,
            recalled = recalled.len(),
            degraded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn complete"
        );

        Ok(TurnResult {
            user_turn,
            model_turn,
            response,
            degraded,
            recalled,
        })
    }

    /// Retrieval with an explicit cutoff that must lie inside the live history.
    async fn recall_below(
        &self,
        session_id: &str,
        query: Vec<f32>,
        cutoff: u32,
    ) -> Result<Vec<ScoredTurn>, EngineError> {
        let id = session_id.to_string();
        let top_k = self.settings.top_k;
        let (live, memories) = self
            .with_store(move |s| {
                let live = s.count(&id)?;
                let memories = find_relevant_context(s, &id, &query, cutoff, top_k)?;
                Ok((live, memories))
            })
            .await?;

        if cutoff >= live {
            debug_assert!(cutoff < live, "retrieval cutoff {cutoff} at or past live count {live}");
            return Err(EngineError::CausalViolation {
                cutoff,
                live: live as usize,
            });
        }
        Ok(memories)
    }

    // --- helpers ---

    /// Take the session's lock and load it. Unknown ids leave no lock entry behind.
    async fn lock_session(&self, session_id: &str) -> Result<(OwnedMutexGuard<()>, Session), EngineError> {
        let guard = self.locks.acquire(session_id).await;
        match self.require_session(session_id).await {
            Ok(session) => Ok((guard, session)),
            Err(e) => {
                drop(guard);
                if matches!(e, EngineError::SessionNotFound(_)) {
                    self.locks.forget(session_id);
                }
                Err(e)
            }
        }
    }

    /// Call the generator, bounded by the configured timeout.
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedReply, GenerationError> {
        tokio::time::timeout(self.settings.generation_timeout, self.generator.generate(request))
            .await
            .unwrap_or(Err(GenerationError::Timeout(self.settings.generation_timeout)))
    }

    fn single_prompt(system_instruction: String, text: String, format: ResponseFormat) -> GenerationRequest {
        GenerationRequest {
            system_instruction,
            messages: vec![ContextMessage {
                role: Role::User,
                text,
                continuity_token: None,
            }],
            length: LengthMode::Medium,
            format,
        }
    }

    async fn require_session(&self, session_id: &str) -> Result<Session, EngineError> {
        let id = session_id.to_string();
        self.with_store(move |s| s.get_session(&id))
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Turn>, EngineError> {
        let id = session_id.to_string();
        Ok(self.with_store(move |s| s.list_by_session(&id)).await?)
    }

    async fn persist(&self, turn: NewTurn) -> Result<Turn, EngineError> {
        Ok(self.with_store(move |s| s.append(turn)).await?)
    }

    /// Run a store call on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TurnStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }

    /// Embed `text`, or return an empty vector if the provider fails or stalls.
    async fn embed_text(&self, text: &str) -> Vec<f32> {
        let embedder = Arc::clone(&self.embedder);
        let owned = text.to_string();
        let task = tokio::task::spawn_blocking(move || embedder.embed(&owned));

        match tokio::time::timeout(self.settings.embedding_timeout, task).await {
            Ok(Ok(Ok(vector))) => vector,
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "embedding failed; continuing without vector");
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "embedding task panicked; continuing without vector");
                Vec::new()
            }
            Err(_) => {
                warn!(timeout = ?self.settings.embedding_timeout, "embedding timed out; continuing without vector");
                Vec::new()
            }
        }
    }
}
