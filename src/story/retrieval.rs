//! Causal top-K retrieval over a session's embedded turns.
//!
//! Only turns strictly below the caller-supplied cutoff are eligible. The
//! cutoff is the length of the history being sent to the generator, never the
//! number of rows currently in storage: a regenerate that has not yet
//! physically removed later turns must still not see them.

use serde::Serialize;

use crate::error::StoreError;
use crate::story::similarity::{cosine_similarity, is_scorable};
use crate::story::store::TurnStore;
use crate::story::types::Turn;

/// Default number of memories recalled per request.
pub const DEFAULT_TOP_K: usize = 3;

/// A recalled turn with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTurn {
    pub turn: Turn,
    pub score: f64,
}

/// Compact record of a recalled memory, for logs and tool output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecalledMemory {
    pub sequence_index: u32,
    pub score: f64,
}

impl From<&ScoredTurn> for RecalledMemory {
    fn from(s: &ScoredTurn) -> Self {
        Self {
            sequence_index: s.turn.sequence_index,
            score: s.score,
        }
    }
}

/// Fetch a session's turns and rank them against `query`.
///
/// Returns at most `top_k` turns with index `< causal_cutoff`, best first.
/// An empty or zero-magnitude query yields an empty result.
pub fn find_relevant_context(
    store: &dyn TurnStore,
    session_id: &str,
    query: &[f32],
    causal_cutoff: u32,
    top_k: usize,
) -> Result<Vec<ScoredTurn>, StoreError> {
    if top_k == 0 || !is_scorable(query) {
        tracing::debug!(session_id, top_k, "retrieval skipped: no usable query");
        return Ok(Vec::new());
    }
    let turns = store.list_by_session(session_id)?;
    Ok(rank_turns(&turns, query, causal_cutoff, top_k))
}

/// Score and order already-fetched turns. Pure; see [`find_relevant_context`].
///
/// Ties keep their original order.
pub fn rank_turns(turns: &[Turn], query: &[f32], causal_cutoff: u32, top_k: usize) -> Vec<ScoredTurn> {
    if top_k == 0 || !is_scorable(query) {
        return Vec::new();
    }

    let mut scored: Vec<ScoredTurn> = turns
        .iter()
        .filter(|t| t.sequence_index < causal_cutoff)
        .filter(|t| t.narrative().is_some_and(|n| !n.is_empty()))
        .filter_map(|t| {
            let embedding = t.embedding()?;
            if embedding.len() != query.len() {
                tracing::warn!(
                    sequence_index = t.sequence_index,
                    stored = embedding.len(),
                    query = query.len(),
                    "skipping turn with mismatched embedding dimension"
                );
                return None;
            }
            if !is_scorable(embedding) {
                return None;
            }
            Some(ScoredTurn {
                turn: t.clone(),
                score: cosine_similarity(query, embedding),
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);

    for s in &scored {
        tracing::debug!(sequence_index = s.turn.sequence_index, score = s.score, "recalled memory");
    }
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::types::TurnContent;

    fn model_turn(index: u32, embedding: Option<Vec<f32>>, narrative: &str) -> Turn {
        Turn {
            id: format!("t{index}"),
            session_id: "s".into(),
            sequence_index: index,
            content: TurnContent::Model {
                narrative: narrative.into(),
                raw_response: "{}".into(),
                embedding,
                continuity_token: None,
            },
        }
    }

    fn user_turn(index: u32) -> Turn {
        Turn {
            id: format!("t{index}"),
            session_id: "s".into(),
            sequence_index: index,
            content: TurnContent::User {
                prompt: "go".into(),
            },
        }
    }

    fn indices(results: &[ScoredTurn]) -> Vec<u32> {
        results.iter().map(|s| s.turn.sequence_index).collect()
    }

    #[test]
    fn results_are_sorted_and_truncated() {
        let turns = vec![
            user_turn(0),
            model_turn(1, Some(vec![0.0, 1.0]), "orthogonal"),
            user_turn(2),
            model_turn(3, Some(vec![1.0, 0.0]), "identical"),
            user_turn(4),
            model_turn(5, Some(vec![1.0, 1.0]), "halfway"),
        ];
        let results = rank_turns(&turns, &[1.0, 0.0], 6, 2);
        assert_eq!(indices(&results), vec![3, 5]);
        assert!((results[0].score - 1.0).abs() < 1e-9);
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn fewer_than_top_k_returns_all_that_qualify() {
        let turns = vec![user_turn(0), model_turn(1, Some(vec![1.0, 0.0]), "only one")];
        let results = rank_turns(&turns, &[1.0, 0.0], 2, 3);
        assert_eq!(indices(&results), vec![1]);
    }

    #[test]
    fn cutoff_excludes_future_turns() {
        let turns = vec![
            model_turn(1, Some(vec![1.0, 0.0]), "past"),
            model_turn(3, Some(vec![1.0, 0.0]), "boundary"),
            model_turn(5, Some(vec![1.0, 0.0]), "future"),
        ];
        let results = rank_turns(&turns, &[1.0, 0.0], 3, 10);
        assert_eq!(indices(&results), vec![1]);
    }

    #[test]
    fn turns_without_embedding_or_narrative_are_excluded() {
        let turns = vec![
            model_turn(1, None, "no vector"),
            model_turn(3, Some(vec![]), "empty vector"),
            model_turn(5, Some(vec![1.0, 0.0]), ""),
            model_turn(7, Some(vec![0.0, 0.0]), "zero vector"),
            model_turn(9, Some(vec![1.0, 0.0, 0.0]), "wrong dimension"),
        ];
        assert!(rank_turns(&turns, &[1.0, 0.0], 100, 3).is_empty());
    }

    #[test]
    fn empty_or_zero_query_returns_nothing() {
        let turns = vec![model_turn(1, Some(vec![1.0, 0.0]), "x")];
        assert!(rank_turns(&turns, &[], 10, 3).is_empty());
        assert!(rank_turns(&turns, &[0.0, 0.0], 10, 3).is_empty());
        assert!(rank_turns(&turns, &[1.0, 0.0], 10, 0).is_empty());
    }

    #[test]
    fn ties_keep_original_order() {
        let turns = vec![
            model_turn(1, Some(vec![1.0, 0.0]), "first"),
            model_turn(3, Some(vec![2.0, 0.0]), "second"),
            model_turn(5, Some(vec![3.0, 0.0]), "third"),
        ];
        let results = rank_turns(&turns, &[1.0, 0.0], 10, 3);
        assert_eq!(indices(&results), vec![1, 3, 5]);
    }
}
