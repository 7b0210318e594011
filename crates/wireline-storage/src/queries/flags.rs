// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted key-value flags.
//!
//! Complex values are JSON-encoded. One-shot flags (`spark_return_target`,
//! `pending_bridge_restart_notice`) are consumed with an atomic
//! read-and-delete so a crash between read and delete cannot replay them.

use rusqlite::{params, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use wireline_core::WirelineError;

use crate::database::{map_tr_err, now_ms, Database};

/// Raw string value of a flag, if set.
pub async fn get(db: &Database, key: &str) -> Result<Option<String>, WirelineError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM flags WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
        .map_err(map_tr_err)
}

/// Set a flag to a raw string value (upsert).
pub async fn set(db: &Database, key: &str, value: &str) -> Result<(), WirelineError> {
    let key = key.to_string();
    let value = value.to_string();
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO flags (key, value, updated_at_ms) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at_ms = ?3",
                params![key, value, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a flag.
pub async fn delete(db: &Database, key: &str) -> Result<(), WirelineError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM flags WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically read and delete a one-shot flag.
///
/// Returns the value iff the flag was present; at most one caller ever
/// observes a given write.
pub async fn consume(db: &Database, key: &str) -> Result<Option<String>, WirelineError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let value: Option<String> = tx
                .query_row(
                    "SELECT value FROM flags WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            if value.is_some() {
                tx.execute("DELETE FROM flags WHERE key = ?1", params![key])?;
            }
            tx.commit()?;
            Ok(value)
        })
        .await
        .map_err(map_tr_err)
}

/// Boolean flag getter; absent means `false`.
pub async fn get_bool(db: &Database, key: &str) -> Result<bool, WirelineError> {
    Ok(matches!(get(db, key).await?.as_deref(), Some("true")))
}

/// Boolean flag setter.
pub async fn set_bool(db: &Database, key: &str, value: bool) -> Result<(), WirelineError> {
    set(db, key, if value { "true" } else { "false" }).await
}

/// Typed JSON getter.
pub async fn get_json<T: DeserializeOwned>(
    db: &Database,
    key: &str,
) -> Result<Option<T>, WirelineError> {
    match get(db, key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| WirelineError::Validation(format!("flag {key} is not valid JSON: {e}"))),
        None => Ok(None),
    }
}

/// Typed JSON setter.
pub async fn set_json<T: Serialize>(
    db: &Database,
    key: &str,
    value: &T,
) -> Result<(), WirelineError> {
    let raw = serde_json::to_string(value)
        .map_err(|e| WirelineError::Internal(format!("flag {key} failed to encode: {e}")))?;
    set(db, key, &raw).await
}

/// Typed JSON consume for one-shot flags.
pub async fn consume_json<T: DeserializeOwned>(
    db: &Database,
    key: &str,
) -> Result<Option<T>, WirelineError> {
    match consume(db, key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| WirelineError::Validation(format!("flag {key} is not valid JSON: {e}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{flag_keys, RestartNotice, SparkReturnTarget};
    use tempfile::tempdir;
    use wireline_core::ReasoningEffort;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let (db, _dir) = setup_db().await;

        assert!(get(&db, "k").await.unwrap().is_none());
        set(&db, "k", "v1").await.unwrap();
        assert_eq!(get(&db, "k").await.unwrap().as_deref(), Some("v1"));
        set(&db, "k", "v2").await.unwrap();
        assert_eq!(get(&db, "k").await.unwrap().as_deref(), Some("v2"));
        delete(&db, "k").await.unwrap();
        assert!(get(&db, "k").await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn consume_returns_value_exactly_once() {
        let (db, _dir) = setup_db().await;

        set(&db, flag_keys::PENDING_BRIDGE_RESTART_NOTICE, "{}")
            .await
            .unwrap();
        assert!(consume(&db, flag_keys::PENDING_BRIDGE_RESTART_NOTICE)
            .await
            .unwrap()
            .is_some());
        assert!(consume(&db, flag_keys::PENDING_BRIDGE_RESTART_NOTICE)
            .await
            .unwrap()
            .is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn bool_flags_default_false() {
        let (db, _dir) = setup_db().await;

        assert!(!get_bool(&db, flag_keys::PAUSED).await.unwrap());
        set_bool(&db, flag_keys::PAUSED, true).await.unwrap();
        assert!(get_bool(&db, flag_keys::PAUSED).await.unwrap());
        set_bool(&db, flag_keys::PAUSED, false).await.unwrap();
        assert!(!get_bool(&db, flag_keys::PAUSED).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn typed_json_flags_round_trip() {
        let (db, _dir) = setup_db().await;

        let target = SparkReturnTarget {
            model: "gpt-5.3-codex".into(),
            effort: ReasoningEffort::High,
        };
        set_json(&db, flag_keys::SPARK_RETURN_TARGET, &target)
            .await
            .unwrap();
        let back: Option<SparkReturnTarget> = get_json(&db, flag_keys::SPARK_RETURN_TARGET)
            .await
            .unwrap();
        assert_eq!(back, Some(target.clone()));

        let consumed: Option<SparkReturnTarget> =
            consume_json(&db, flag_keys::SPARK_RETURN_TARGET).await.unwrap();
        assert_eq!(consumed, Some(target));
        let gone: Option<SparkReturnTarget> =
            consume_json(&db, flag_keys::SPARK_RETURN_TARGET).await.unwrap();
        assert!(gone.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_json_flag_is_a_validation_error() {
        let (db, _dir) = setup_db().await;

        set(&db, flag_keys::PENDING_BRIDGE_RESTART_NOTICE, "not json")
            .await
            .unwrap();
        let result: Result<Option<RestartNotice>, _> =
            get_json(&db, flag_keys::PENDING_BRIDGE_RESTART_NOTICE).await;
        assert!(matches!(result, Err(WirelineError::Validation(_))));

        db.close().await.unwrap();
    }
}
