//! SQL DDL for the story tables.
//!
//! Defines `sessions`, `turns` and `schema_meta`. Turns are unique per
//! `(session_id, turn_index)` and cascade-deleted with their session. All DDL
//! uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    hero_name TEXT NOT NULL,
    gender TEXT NOT NULL,
    genre TEXT NOT NULL,
    world_settings TEXT NOT NULL,
    character_traits TEXT,
    avatar TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at);

CREATE TABLE IF NOT EXISTS turns (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    turn_index INTEGER NOT NULL CHECK(turn_index >= 0),
    role TEXT NOT NULL CHECK(role IN ('user','model')),
    user_prompt TEXT,
    narrative TEXT,
    raw_response TEXT,
    embedding BLOB,
    continuity_token TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(session_id, turn_index)
);

CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, turn_index);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;
    Ok(())
}
