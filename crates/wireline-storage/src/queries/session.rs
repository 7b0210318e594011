// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session singleton operations.
//!
//! The session row is created lazily on first reference and never deleted.

use rusqlite::{params, OptionalExtension};
use wireline_core::WirelineError;

use crate::database::{map_tr_err, now_ms, Database};
use crate::models::SessionRecord;

/// Get the session for `phone`, creating a default row if missing.
pub async fn get_or_create(
    db: &Database,
    phone: &str,
    default_model: &str,
) -> Result<SessionRecord, WirelineError> {
    let phone = phone.to_string();
    let default_model = default_model.to_string();
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO sessions (phone_number, thread_id, active_turn_id, model, updated_at_ms)
                 VALUES (?1, NULL, NULL, ?2, ?3)",
                params![phone, default_model, now],
            )?;
            let session = conn.query_row(
                "SELECT phone_number, thread_id, active_turn_id, model, updated_at_ms
                 FROM sessions WHERE phone_number = ?1",
                params![phone],
                |row| {
                    Ok(SessionRecord {
                        phone_number: row.get(0)?,
                        thread_id: row.get(1)?,
                        active_turn_id: row.get(2)?,
                        model: row.get(3)?,
                        updated_at_ms: row.get(4)?,
                    })
                },
            )?;
            Ok(session)
        })
        .await
        .map_err(map_tr_err)
}

/// Set or clear the session's current thread id.
pub async fn set_thread(
    db: &Database,
    phone: &str,
    thread_id: Option<&str>,
) -> Result<(), WirelineError> {
    let phone = phone.to_string();
    let thread_id = thread_id.map(|s| s.to_string());
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET thread_id = ?1, updated_at_ms = ?2 WHERE phone_number = ?3",
                params![thread_id, now, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record the active turn id.
pub async fn set_active_turn(
    db: &Database,
    phone: &str,
    turn_id: &str,
) -> Result<(), WirelineError> {
    let phone = phone.to_string();
    let turn_id = turn_id.to_string();
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET active_turn_id = ?1, updated_at_ms = ?2 WHERE phone_number = ?3",
                params![turn_id, now, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Clear the active turn id (terminal turn event).
pub async fn clear_active_turn(db: &Database, phone: &str) -> Result<(), WirelineError> {
    let phone = phone.to_string();
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET active_turn_id = NULL, updated_at_ms = ?1 WHERE phone_number = ?2",
                params![now, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Persist the session model.
pub async fn set_model(db: &Database, phone: &str, model: &str) -> Result<(), WirelineError> {
    let phone = phone.to_string();
    let model = model.to_string();
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET model = ?1, updated_at_ms = ?2 WHERE phone_number = ?3",
                params![model, now, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Clear thread and active turn atomically.
pub async fn reset(db: &Database, phone: &str) -> Result<(), WirelineError> {
    let phone = phone.to_string();
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET thread_id = NULL, active_turn_id = NULL, updated_at_ms = ?1
                 WHERE phone_number = ?2",
                params![now, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch the session without creating it.
pub async fn get(db: &Database, phone: &str) -> Result<Option<SessionRecord>, WirelineError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let session = conn
                .query_row(
                    "SELECT phone_number, thread_id, active_turn_id, model, updated_at_ms
                     FROM sessions WHERE phone_number = ?1",
                    params![phone],
                    |row| {
                        Ok(SessionRecord {
                            phone_number: row.get(0)?,
                            thread_id: row.get(1)?,
                            active_turn_id: row.get(2)?,
                            model: row.get(3)?,
                            updated_at_ms: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(session)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    const PHONE: &str = "+15550001111";

    #[tokio::test]
    async fn get_or_create_inserts_defaults_once() {
        let (db, _dir) = setup_db().await;

        let session = get_or_create(&db, PHONE, "gpt-5.3-codex").await.unwrap();
        assert_eq!(session.phone_number, PHONE);
        assert_eq!(session.model, "gpt-5.3-codex");
        assert!(session.thread_id.is_none());
        assert!(session.active_turn_id.is_none());

        // Second call returns the same row, not a re-defaulted one.
        set_model(&db, PHONE, "gpt-5.3-codex-spark").await.unwrap();
        let again = get_or_create(&db, PHONE, "gpt-5.3-codex").await.unwrap();
        assert_eq!(again.model, "gpt-5.3-codex-spark");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn thread_and_turn_lifecycle() {
        let (db, _dir) = setup_db().await;
        get_or_create(&db, PHONE, "gpt-5.3-codex").await.unwrap();

        set_thread(&db, PHONE, Some("th_1")).await.unwrap();
        set_active_turn(&db, PHONE, "turn_1").await.unwrap();

        let session = get(&db, PHONE).await.unwrap().unwrap();
        assert_eq!(session.thread_id.as_deref(), Some("th_1"));
        assert_eq!(session.active_turn_id.as_deref(), Some("turn_1"));

        clear_active_turn(&db, PHONE).await.unwrap();
        let session = get(&db, PHONE).await.unwrap().unwrap();
        assert_eq!(session.thread_id.as_deref(), Some("th_1"));
        assert!(session.active_turn_id.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reset_clears_thread_and_turn_atomically() {
        let (db, _dir) = setup_db().await;
        get_or_create(&db, PHONE, "gpt-5.3-codex").await.unwrap();
        set_thread(&db, PHONE, Some("th_1")).await.unwrap();
        set_active_turn(&db, PHONE, "turn_1").await.unwrap();

        reset(&db, PHONE).await.unwrap();

        let session = get(&db, PHONE).await.unwrap().unwrap();
        assert!(session.thread_id.is_none());
        assert!(session.active_turn_id.is_none());
        // Model survives a reset.
        assert_eq!(session.model, "gpt-5.3-codex");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_session_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get(&db, "+10000000000").await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
