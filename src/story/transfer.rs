//! Export and restore of whole sessions.
//!
//! A restored session never collides with the one it came from: it gets a
//! fresh session id, fresh turn ids and a new creation timestamp. Turn
//! payloads (narrative, raw response, embedding, continuity token) are kept
//! verbatim and the original ordering is preserved.

use anyhow::{Context, Result};

use crate::error::StoreError;
use crate::story::store::TurnStore;
use crate::story::types::{Session, SessionBundle, Turn};

/// Snapshot a session and its turns.
pub fn export_session(store: &dyn TurnStore, session_id: &str) -> Result<SessionBundle, StoreError> {
    let session = store
        .get_session(session_id)?
        .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
    let turns = store.list_by_session(session_id)?;
    Ok(SessionBundle { session, turns })
}

pub fn to_json(bundle: &SessionBundle) -> Result<String> {
    serde_json::to_string_pretty(bundle).context("failed to serialize session bundle")
}

pub fn from_json(json: &str) -> Result<SessionBundle> {
    serde_json::from_str(json).context("failed to parse session bundle JSON")
}

/// Re-key a bundle for insertion as a new session.
///
/// Turns are ordered by their original index and renumbered from 0, so a
/// bundle with gaps (hand-edited, or from an older export) still restores
/// to a contiguous transcript.
pub fn rekey_bundle(bundle: SessionBundle) -> SessionBundle {
    let session_id = uuid::Uuid::now_v7().to_string();
    let session = Session {
        id: session_id.clone(),
        created_at: chrono::Utc::now().to_rfc3339(),
        ..bundle.session
    };

    let mut turns = bundle.turns;
    turns.sort_by_key(|t| t.sequence_index);
    let turns = turns
        .into_iter()
        .enumerate()
        .map(|(i, t)| Turn {
            id: uuid::Uuid::now_v7().to_string(),
            session_id: session_id.clone(),
            sequence_index: i as u32,
            content: t.content,
        })
        .collect();

    SessionBundle { session, turns }
}

/// Restore a bundle under a new identity. Returns the created session.
pub fn import_bundle(store: &dyn TurnStore, bundle: SessionBundle) -> Result<Session, StoreError> {
    let original_id = bundle.session.id.clone();
    let rekeyed = rekey_bundle(bundle);
    store.insert_bundle(&rekeyed)?;
    tracing::info!(
        from = %original_id,
        session_id = %rekeyed.session.id,
        turns = rekeyed.turns.len(),
        "session imported"
    );
    Ok(rekeyed.session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::types::{TurnContent, WorldSettings};

    fn foreign_bundle() -> SessionBundle {
        let turn = |id: &str, index: u32, content: TurnContent| Turn {
            id: id.into(),
            session_id: "foreign".into(),
            sequence_index: index,
            content,
        };
        SessionBundle {
            session: Session {
                id: "foreign".into(),
                hero_name: "Mei".into(),
                gender: "female".into(),
                genre: "horror".into(),
                world: WorldSettings::default(),
                traits: None,
                avatar: None,
                created_at: "2023-05-01T00:00:00Z".into(),
            },
            // out of order, starting at 3
            turns: vec![
                turn(
                    "b",
                    4,
                    TurnContent::Model {
                        narrative: "The door creaks.".into(),
                        raw_response: "{\"narrative\":\"The door creaks.\"}".into(),
                        embedding: Some(vec![0.1, 0.2]),
                        continuity_token: Some("sig".into()),
                    },
                ),
                turn("a", 3, TurnContent::User { prompt: "knock".into() }),
            ],
        }
    }

    #[test]
    fn rekey_assigns_fresh_ids_and_contiguous_indices() {
        let rekeyed = rekey_bundle(foreign_bundle());
        assert_ne!(rekeyed.session.id, "foreign");
        assert_ne!(rekeyed.session.created_at, "2023-05-01T00:00:00Z");
        assert_eq!(rekeyed.session.hero_name, "Mei");

        let indices: Vec<u32> = rekeyed.turns.iter().map(|t| t.sequence_index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(rekeyed.turns[0].user_prompt(), Some("knock"));
        assert_eq!(rekeyed.turns[1].continuity_token(), Some("sig"));
        assert!(rekeyed
            .turns
            .iter()
            .all(|t| t.session_id == rekeyed.session.id && t.id != "a" && t.id != "b"));
    }

    #[test]
    fn json_round_trip_keeps_payload() {
        let bundle = foreign_bundle();
        let back = from_json(&to_json(&bundle).unwrap()).unwrap();
        assert_eq!(back, bundle);
    }

    #[test]
    fn garbage_json_is_an_error() {
        assert!(from_json("{\"session\": 3}").is_err());
    }
}
