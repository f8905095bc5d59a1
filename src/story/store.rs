//! Durable storage for sessions and their ordered turns.
//!
//! [`TurnStore`] is the seam the engine depends on; [`SqliteTurnStore`] is the
//! production implementation. Appends are validated against the current turn
//! count inside a transaction, so a session's indices stay contiguous from 0.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::story::types::{
    CharacterTraits, NewSession, NewTurn, Role, Session, SessionBundle, Turn, TurnContent,
    WorldSettings,
};
use crate::story::{bytes_to_embedding, embedding_to_bytes};

pub trait TurnStore: Send + Sync {
    fn create_session(&self, new: &NewSession) -> Result<Session, StoreError>;

    fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// All sessions, newest first.
    fn list_sessions(&self) -> Result<Vec<Session>, StoreError>;

    /// Delete a session and all of its turns. Returns `false` if it did not exist.
    fn delete_session(&self, session_id: &str) -> Result<bool, StoreError>;

    /// Insert a turn. `sequence_index` must equal the session's current count.
    fn append(&self, turn: NewTurn) -> Result<Turn, StoreError>;

    /// Turns of a session in ascending `sequence_index` order.
    fn list_by_session(&self, session_id: &str) -> Result<Vec<Turn>, StoreError>;

    /// Remove every turn with `sequence_index >= cutoff`. Returns the number removed.
    fn delete_from(&self, session_id: &str, cutoff: u32) -> Result<usize, StoreError>;

    fn get(&self, session_id: &str, sequence_index: u32) -> Result<Option<Turn>, StoreError>;

    fn count(&self, session_id: &str) -> Result<u32, StoreError>;

    /// Replace the embedding of an existing model turn.
    fn set_embedding(
        &self,
        session_id: &str,
        sequence_index: u32,
        embedding: &[f32],
    ) -> Result<(), StoreError>;

    /// Write a whole session and its turns atomically. The bundle must already
    /// carry fresh identifiers and contiguous indices.
    fn insert_bundle(&self, bundle: &SessionBundle) -> Result<(), StoreError>;
}

/// [`TurnStore`] over a single SQLite connection.
pub struct SqliteTurnStore {
    conn: Mutex<Connection>,
}

const TURN_COLUMNS: &str = "id, session_id, turn_index, role, user_prompt, narrative, \
                            raw_response, embedding, continuity_token";

const SESSION_COLUMNS: &str =
    "id, hero_name, gender, genre, world_settings, character_traits, avatar, created_at";

impl SqliteTurnStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open a migrated in-memory store.
    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(crate::db::open_in_memory()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("db lock poisoned: {e}")))
    }

    /// Run `f` with exclusive access to the underlying connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.lock()?;
        f(&mut conn)
    }
}

impl TurnStore for SqliteTurnStore {
    fn create_session(&self, new: &NewSession) -> Result<Session, StoreError> {
        let session = Session {
            id: uuid::Uuid::now_v7().to_string(),
            hero_name: new.hero_name.clone(),
            gender: new.gender.clone(),
            genre: new.genre.clone(),
            world: new.world.clone(),
            traits: new.traits.clone(),
            avatar: new.avatar.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let conn = self.lock()?;
        insert_session(&conn, &session)?;
        tracing::debug!(session_id = %session.id, "session created");
        Ok(session)
    }

    fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![session_id],
                read_session_row,
            )
            .optional()?;
        row.map(SessionRow::into_session).transpose()
    }

    fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map([], read_session_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(SessionRow::into_session).collect()
    }

    fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        // Explicit turn delete keeps this correct even if foreign keys are off.
        let turns = tx.execute("DELETE FROM turns WHERE session_id = ?1", params![session_id])?;
        let sessions = tx.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        tx.commit()?;
        tracing::debug!(session_id, turns, "session deleted");
        Ok(sessions > 0)
    }

    fn append(&self, turn: NewTurn) -> Result<Turn, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM sessions WHERE id = ?1",
            params![turn.session_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::SessionNotFound(turn.session_id));
        }

        let expected = count_turns(&tx, &turn.session_id)?;
        if turn.sequence_index != expected {
            return Err(StoreError::IndexConflict {
                session_id: turn.session_id,
                expected,
                actual: turn.sequence_index,
            });
        }

        let stored = Turn {
            id: uuid::Uuid::now_v7().to_string(),
            session_id: turn.session_id,
            sequence_index: turn.sequence_index,
            content: turn.content,
        };
        insert_turn(&tx, &stored)?;
        tx.commit()?;
        Ok(stored)
    }

    fn list_by_session(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TURN_COLUMNS} FROM turns WHERE session_id = ?1 ORDER BY turn_index"
        ))?;
        let turns = stmt
            .query_map(params![session_id], read_turn_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(turns)
    }

    fn delete_from(&self, session_id: &str, cutoff: u32) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM turns WHERE session_id = ?1 AND turn_index >= ?2",
            params![session_id, cutoff],
        )?;
        Ok(removed)
    }

    fn get(&self, session_id: &str, sequence_index: u32) -> Result<Option<Turn>, StoreError> {
        let conn = self.lock()?;
        let turn = conn
            .query_row(
                &format!("SELECT {TURN_COLUMNS} FROM turns WHERE session_id = ?1 AND turn_index = ?2"),
                params![session_id, sequence_index],
                read_turn_row,
            )
            .optional()?;
        Ok(turn)
    }

    fn count(&self, session_id: &str) -> Result<u32, StoreError> {
        let conn = self.lock()?;
        count_turns(&conn, session_id)
    }

    fn set_embedding(
        &self,
        session_id: &str,
        sequence_index: u32,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let blob = (!embedding.is_empty()).then(|| embedding_to_bytes(embedding));
        conn.execute(
            "UPDATE turns SET embedding = ?1 \
             WHERE session_id = ?2 AND turn_index = ?3 AND role = 'model'",
            params![blob, session_id, sequence_index],
        )?;
        Ok(())
    }

    fn insert_bundle(&self, bundle: &SessionBundle) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        insert_session(&tx, &bundle.session)?;
        for (expected, turn) in bundle.turns.iter().enumerate() {
            if turn.sequence_index as usize != expected || turn.session_id != bundle.session.id {
                return Err(StoreError::IndexConflict {
                    session_id: bundle.session.id.clone(),
                    expected: expected as u32,
                    actual: turn.sequence_index,
                });
            }
            insert_turn(&tx, turn)?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn count_turns(conn: &Connection, session_id: &str) -> Result<u32, StoreError> {
    let n: u32 = conn.query_row(
        "SELECT COUNT(*) FROM turns WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    Ok(n)
}

fn insert_session(conn: &Connection, session: &Session) -> Result<(), StoreError> {
    let world = serde_json::to_string(&session.world)?;
    let traits = session
        .traits
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        &format!("INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            session.id,
            session.hero_name,
            session.gender,
            session.genre,
            world,
            traits,
            session.avatar,
            session.created_at,
        ],
    )?;
    Ok(())
}

fn insert_turn(conn: &Connection, turn: &Turn) -> Result<(), StoreError> {
    let now = chrono::Utc::now().to_rfc3339();
    match &turn.content {
        TurnContent::User { prompt } => {
            conn.execute(
                "INSERT INTO turns (id, session_id, turn_index, role, user_prompt, created_at) \
                 VALUES (?1, ?2, ?3, 'user', ?4, ?5)",
                params![turn.id, turn.session_id, turn.sequence_index, prompt, now],
            )?;
        }
        TurnContent::Model {
            narrative,
            raw_response,
            embedding,
            continuity_token,
        } => {
            let blob = embedding
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(embedding_to_bytes);
            conn.execute(
                "INSERT INTO turns (id, session_id, turn_index, role, narrative, raw_response, \
                 embedding, continuity_token, created_at) \
                 VALUES (?1, ?2, ?3, 'model', ?4, ?5, ?6, ?7, ?8)",
                params![
                    turn.id,
                    turn.session_id,
                    turn.sequence_index,
                    narrative,
                    raw_response,
                    blob,
                    continuity_token,
                    now,
                ],
            )?;
        }
    }
    Ok(())
}

fn read_turn_row(row: &Row<'_>) -> rusqlite::Result<Turn> {
    let role_str: String = row.get(3)?;
    let role: Role = role_str.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    let content = match role {
        Role::User => TurnContent::User {
            prompt: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        },
        Role::Model => TurnContent::Model {
            narrative: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            raw_response: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            embedding: row
                .get::<_, Option<Vec<u8>>>(7)?
                .map(|b| bytes_to_embedding(&b)),
            continuity_token: row.get(8)?,
        },
    };
    Ok(Turn {
        id: row.get(0)?,
        session_id: row.get(1)?,
        sequence_index: row.get(2)?,
        content,
    })
}

/// Raw session columns; JSON fields are decoded outside the row closure so
/// decoding errors surface as [`StoreError::Serialization`].
struct SessionRow {
    id: String,
    hero_name: String,
    gender: String,
    genre: String,
    world: String,
    traits: Option<String>,
    avatar: Option<String>,
    created_at: String,
}

fn read_session_row(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        hero_name: row.get(1)?,
        gender: row.get(2)?,
        genre: row.get(3)?,
        world: row.get(4)?,
        traits: row.get(5)?,
        avatar: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl SessionRow {
    fn into_session(self) -> Result<Session, StoreError> {
        let world: WorldSettings = serde_json::from_str(&self.world)?;
        let traits: Option<CharacterTraits> = self
            .traits
            .map(|t| serde_json::from_str(&t))
            .transpose()?;
        Ok(Session {
            id: self.id,
            hero_name: self.hero_name,
            gender: self.gender,
            genre: self.genre,
            world,
            traits,
            avatar: self.avatar,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session() -> NewSession {
        NewSession {
            hero_name: "Lin Mo".into(),
            gender: "male".into(),
            genre: "cultivation".into(),
            world: WorldSettings {
                world_context: "Nine continents".into(),
                ..Default::default()
            },
            traits: Some(CharacterTraits {
                origin: "Fire root".into(),
                talents: vec!["Alchemy".into()],
            }),
            avatar: None,
        }
    }

    fn user(session_id: &str, index: u32, prompt: &str) -> NewTurn {
        NewTurn {
            session_id: session_id.into(),
            sequence_index: index,
            content: TurnContent::User {
                prompt: prompt.into(),
            },
        }
    }

    fn model(session_id: &str, index: u32, narrative: &str, embedding: Vec<f32>) -> NewTurn {
        NewTurn {
            session_id: session_id.into(),
            sequence_index: index,
            content: TurnContent::Model {
                narrative: narrative.into(),
                raw_response: format!("{{\"narrative\":\"{narrative}\"}}"),
                embedding: Some(embedding),
                continuity_token: Some(format!("sig-{index}")),
            },
        }
    }

    #[test]
    fn session_round_trips_through_sqlite() {
        let store = SqliteTurnStore::in_memory().unwrap();
        let created = store.create_session(&new_session()).unwrap();
        let loaded = store.get_session(&created.id).unwrap().unwrap();
        assert_eq!(loaded, created);
        assert!(store.get_session("missing").unwrap().is_none());
    }

    #[test]
    fn append_assigns_contiguous_indices() {
        let store = SqliteTurnStore::in_memory().unwrap();
        let s = store.create_session(&new_session()).unwrap();

        store.append(user(&s.id, 0, "look around")).unwrap();
        store.append(model(&s.id, 1, "A misty valley.", vec![1.0, 0.0])).unwrap();

        let turns = store.list_by_session(&s.id).unwrap();
        let indices: Vec<u32> = turns.iter().map(|t| t.sequence_index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(turns[0].user_prompt(), Some("look around"));
        assert_eq!(turns[1].embedding(), Some(&[1.0f32, 0.0][..]));
        assert_eq!(turns[1].continuity_token(), Some("sig-1"));
    }

    #[test]
    fn append_rejects_gaps_and_duplicates() {
        let store = SqliteTurnStore::in_memory().unwrap();
        let s = store.create_session(&new_session()).unwrap();
        store.append(user(&s.id, 0, "a")).unwrap();

        let gap = store.append(user(&s.id, 2, "b")).unwrap_err();
        assert!(matches!(gap, StoreError::IndexConflict { expected: 1, actual: 2, .. }));

        let dup = store.append(user(&s.id, 0, "c")).unwrap_err();
        assert!(matches!(dup, StoreError::IndexConflict { expected: 1, actual: 0, .. }));
    }

    #[test]
    fn append_to_unknown_session_fails() {
        let store = SqliteTurnStore::in_memory().unwrap();
        let err = store.append(user("nope", 0, "a")).unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[test]
    fn delete_from_removes_suffix_only() {
        let store = SqliteTurnStore::in_memory().unwrap();
        let s = store.create_session(&new_session()).unwrap();
        for i in 0..6 {
            store.append(user(&s.id, i, "x")).unwrap();
        }

        assert_eq!(store.delete_from(&s.id, 4).unwrap(), 2);
        assert_eq!(store.count(&s.id).unwrap(), 4);
        assert!(store.get(&s.id, 3).unwrap().is_some());
        assert!(store.get(&s.id, 4).unwrap().is_none());
        // cutoff past the end is a no-op
        assert_eq!(store.delete_from(&s.id, 10).unwrap(), 0);
    }

    #[test]
    fn empty_embedding_is_stored_as_null() {
        let store = SqliteTurnStore::in_memory().unwrap();
        let s = store.create_session(&new_session()).unwrap();
        store.append(user(&s.id, 0, "a")).unwrap();
        store.append(model(&s.id, 1, "b", vec![])).unwrap();

        let turn = store.get(&s.id, 1).unwrap().unwrap();
        assert!(turn.embedding().is_none());

        store.set_embedding(&s.id, 1, &[0.0, 1.0]).unwrap();
        let turn = store.get(&s.id, 1).unwrap().unwrap();
        assert_eq!(turn.embedding(), Some(&[0.0f32, 1.0][..]));
    }

    #[test]
    fn delete_session_cascades_turns() {
        let store = SqliteTurnStore::in_memory().unwrap();
        let s = store.create_session(&new_session()).unwrap();
        store.append(user(&s.id, 0, "a")).unwrap();

        assert!(store.delete_session(&s.id).unwrap());
        assert!(store.list_by_session(&s.id).unwrap().is_empty());
        assert!(!store.delete_session(&s.id).unwrap());
    }

    #[test]
    fn sessions_list_newest_first() {
        let store = SqliteTurnStore::in_memory().unwrap();
        let first = store.create_session(&new_session()).unwrap();
        let second = store.create_session(&new_session()).unwrap();
        let ids: Vec<String> = store.list_sessions().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
