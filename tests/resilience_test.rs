mod helpers;

use helpers::{model, new_session, seed_turns, test_embedding, user};
use taleweave::db;
use taleweave::story::store::{SqliteTurnStore, TurnStore};
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("stories.db");
    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();

    assert!(db_path.exists());
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn busy_timeout_is_set() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("test.db")).unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
}

#[test]
fn sessions_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("stories.db");

    let session_id = {
        let store = SqliteTurnStore::new(db::open_database(&db_path).unwrap());
        let session = store.create_session(&new_session()).unwrap();
        seed_turns(
            &store,
            &session.id,
            vec![user("enter"), model("The hall is silent.", Some(test_embedding(2)))],
        );
        session.id
    };

    let store = SqliteTurnStore::new(db::open_database(&db_path).unwrap());
    let turns = store.list_by_session(&session_id).unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].narrative(), Some("The hall is silent."));
    assert_eq!(turns[1].embedding(), Some(test_embedding(2).as_slice()));
    assert_eq!(store.get_session(&session_id).unwrap().unwrap().hero_name, "Lin Feng");
}

#[test]
fn health_report_counts_rows() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("stories.db");
    let store = SqliteTurnStore::new(db::open_database(&db_path).unwrap());
    let session = store.create_session(&new_session()).unwrap();
    seed_turns(
        &store,
        &session.id,
        vec![
            user("a"),
            model("first", Some(test_embedding(1))),
            user("b"),
            model("second", None),
        ],
    );

    let conn = db::open_database(&db_path).unwrap();
    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.session_count, 1);
    assert_eq!(report.turn_count, 4);
    assert_eq!(report.embedded_turn_count, 1);
    assert_eq!(report.embedding_model.as_deref(), Some("all-MiniLM-L6-v2"));
}
