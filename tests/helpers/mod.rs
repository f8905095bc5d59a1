#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taleweave::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use taleweave::error::StoreError;
use taleweave::generation::{GeneratedReply, GenerationError, GenerationRequest, Generator};
use taleweave::story::lifecycle::{EngineSettings, StoryEngine};
use taleweave::story::store::{SqliteTurnStore, TurnStore};
use taleweave::story::types::{
    CharacterTraits, NewSession, NewTurn, Session, SessionBundle, Turn, TurnContent, WorldSettings,
};

/// Fresh migrated in-memory store.
pub fn test_store() -> Arc<SqliteTurnStore> {
    Arc::new(SqliteTurnStore::in_memory().unwrap())
}

pub fn new_session() -> NewSession {
    NewSession {
        hero_name: "Lin Feng".into(),
        gender: "male".into(),
        genre: "cultivation".into(),
        world: WorldSettings {
            world_context: "The Azure Sky continent".into(),
            plot_direction: "Rise from outer disciple to sect master".into(),
            major_factions: "Azure Cloud Sect, Blood Demon Valley".into(),
            key_npcs: "Elder Mo".into(),
        },
        traits: Some(CharacterTraits {
            origin: "Thunder root".into(),
            talents: vec!["Swordsmanship".into()],
        }),
        avatar: None,
    }
}

/// Deterministic `EMBEDDING_DIM` vector with a spike at `seed`.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[seed % EMBEDDING_DIM] = 1.0;
    v
}

/// Mostly `base`, with a little of `other` mixed in.
pub fn blend(base: &[f32], other: &[f32], weight: f32) -> Vec<f32> {
    base.iter().zip(other).map(|(a, b)| a + weight * b).collect()
}

/// A valid structured reply whose stats realm is `realm`.
pub fn story_json(narrative: &str, realm: &str) -> String {
    serde_json::json!({
        "narrative": narrative,
        "stats": {"name": "Lin Feng", "realm": realm, "status": "Healthy", "inventory": []},
        "options": [
            {"label": "Press on", "action": "Press on", "type": "risky"},
            {"label": "Rest", "action": "Rest", "type": "safe"}
        ],
        "isGameOver": false
    })
    .to_string()
}

pub fn reply(narrative: &str) -> Result<GeneratedReply, GenerationError> {
    Ok(GeneratedReply {
        text: story_json(narrative, "Qi Refining"),
        continuity_token: Some(format!("sig:{narrative}")),
    })
}

/// Append raw turns straight into the store, bypassing the engine.
pub fn seed_turns(store: &dyn TurnStore, session_id: &str, turns: Vec<TurnContent>) -> Vec<Turn> {
    let start = store.count(session_id).unwrap();
    turns
        .into_iter()
        .enumerate()
        .map(|(i, content)| {
            store
                .append(NewTurn {
                    session_id: session_id.into(),
                    sequence_index: start + i as u32,
                    content,
                })
                .unwrap()
        })
        .collect()
}

pub fn user(prompt: &str) -> TurnContent {
    TurnContent::User {
        prompt: prompt.into(),
    }
}

pub fn model(narrative: &str, embedding: Option<Vec<f32>>) -> TurnContent {
    TurnContent::Model {
        narrative: narrative.into(),
        raw_response: story_json(narrative, "Qi Refining"),
        embedding,
        continuity_token: None,
    }
}

// --- embedding doubles ---

/// Looks texts up in a table; unknown text gets `fallback`.
pub struct MappedEmbedder {
    table: Mutex<HashMap<String, Vec<f32>>>,
    fallback: Vec<f32>,
}

impl MappedEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            fallback,
        }
    }

    pub fn with(self, text: &str, vector: Vec<f32>) -> Self {
        self.table.lock().unwrap().insert(text.into(), vector);
        self
    }
}

impl EmbeddingProvider for MappedEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self
            .table
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

pub struct FailingEmbedder;

impl EmbeddingProvider for FailingEmbedder {
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding backend offline")
    }
}

// --- generation doubles ---

/// Replays queued replies in order and records every request. When the
/// queue runs dry it answers with a generic valid reply.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<GeneratedReply, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: Result<GeneratedReply, GenerationError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> GenerationRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedReply, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| reply("The wind carries on."))
    }
}

/// Never answers within any reasonable timeout.
pub struct StalledGenerator;

#[async_trait]
impl Generator for StalledGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedReply, GenerationError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        reply("too late")
    }
}

// --- store double ---

/// Delegates to an in-memory store but can be told to fail `delete_from`.
pub struct FlakyStore {
    inner: SqliteTurnStore,
    pub fail_deletes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteTurnStore::in_memory().unwrap(),
            fail_deletes: AtomicBool::new(false),
        }
    }
}

impl TurnStore for FlakyStore {
    fn create_session(&self, new: &NewSession) -> Result<Session, StoreError> {
        self.inner.create_session(new)
    }
    fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        self.inner.get_session(session_id)
    }
    fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        self.inner.list_sessions()
    }
    fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        self.inner.delete_session(session_id)
    }
    fn append(&self, turn: NewTurn) -> Result<Turn, StoreError> {
        self.inner.append(turn)
    }
    fn list_by_session(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        self.inner.list_by_session(session_id)
    }
    fn delete_from(&self, session_id: &str, cutoff: u32) -> Result<usize, StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk I/O error".into()));
        }
        self.inner.delete_from(session_id, cutoff)
    }
    fn get(&self, session_id: &str, sequence_index: u32) -> Result<Option<Turn>, StoreError> {
        self.inner.get(session_id, sequence_index)
    }
    fn count(&self, session_id: &str) -> Result<u32, StoreError> {
        self.inner.count(session_id)
    }
    fn set_embedding(&self, session_id: &str, sequence_index: u32, embedding: &[f32]) -> Result<(), StoreError> {
        self.inner.set_embedding(session_id, sequence_index, embedding)
    }
    fn insert_bundle(&self, bundle: &SessionBundle) -> Result<(), StoreError> {
        self.inner.insert_bundle(bundle)
    }
}

// --- engine ---

pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        generation_timeout: Duration::from_secs(5),
        embedding_timeout: Duration::from_secs(5),
        ..EngineSettings::default()
    }
}

pub fn engine_with(
    store: Arc<dyn TurnStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    settings: EngineSettings,
) -> StoryEngine {
    StoryEngine::new(store, embedder, generator, settings)
}

/// Engine over a fresh store whose embedder maps every text to spike 0.
pub fn scripted_engine() -> (StoryEngine, Arc<ScriptedGenerator>) {
    let generator = Arc::new(ScriptedGenerator::new());
    let engine = engine_with(
        test_store(),
        Arc::new(MappedEmbedder::new(test_embedding(0))),
        generator.clone(),
        fast_settings(),
    );
    (engine, generator)
}

pub fn indices(turns: &[Turn]) -> Vec<u32> {
    turns.iter().map(|t| t.sequence_index).collect()
}
