// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification queue operations.
//!
//! `dedupe_key` is unique: re-ingestion of a known key increments the
//! duplicate count and refreshes `last_seen_at_ms` instead of inserting a
//! second row. Claiming is a single transaction so only one worker can move
//! a given row into `processing`.

use rusqlite::{params, OptionalExtension};
use wireline_core::{NotificationSource, NotificationStatus, WirelineError};

use crate::database::{map_tr_err, now_ms, Database};
use crate::models::{NewNotification, NotificationRow};

const ROW_COLUMNS: &str = "id, source, source_account, source_event_id, dedupe_key, status,
    received_at_ms, processed_at_ms, delivery, reason_code, message_excerpt, summary,
    payload_hash, raw_excerpt, raw_size_bytes, raw_truncated, duplicate_count,
    first_seen_at_ms, last_seen_at_ms, thread_id, turn_id, decision_json, error_text";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
    let source: String = row.get(1)?;
    let status: String = row.get(5)?;
    Ok(NotificationRow {
        id: row.get(0)?,
        source: source.parse().map_err(bad_enum)?,
        source_account: row.get(2)?,
        source_event_id: row.get(3)?,
        dedupe_key: row.get(4)?,
        status: status.parse().map_err(bad_enum)?,
        received_at_ms: row.get(6)?,
        processed_at_ms: row.get(7)?,
        delivery: row.get(8)?,
        reason_code: row.get(9)?,
        message_excerpt: row.get(10)?,
        summary: row.get(11)?,
        payload_hash: row.get(12)?,
        raw_excerpt: row.get(13)?,
        raw_size_bytes: row.get(14)?,
        raw_truncated: row.get(15)?,
        duplicate_count: row.get(16)?,
        first_seen_at_ms: row.get(17)?,
        last_seen_at_ms: row.get(18)?,
        thread_id: row.get(19)?,
        turn_id: row.get(20)?,
        decision_json: row.get(21)?,
        error_text: row.get(22)?,
    })
}

fn bad_enum(e: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
}

/// Outcome of an ingest attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub id: i64,
    /// True when the dedupe key was already present.
    pub duplicate: bool,
}

/// Insert a normalized notification, or bump the existing row on a
/// duplicate dedupe key.
pub async fn ingest(
    db: &Database,
    new: NewNotification,
) -> Result<IngestOutcome, WirelineError> {
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO notifications
                 (source, source_account, source_event_id, dedupe_key, status,
                  received_at_ms, summary, payload_hash, raw_excerpt, raw_size_bytes,
                  raw_truncated, duplicate_count, first_seen_at_ms, last_seen_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?6, ?6)",
                params![
                    new.source.to_string(),
                    new.source_account,
                    new.source_event_id,
                    new.dedupe_key,
                    NotificationStatus::Received.to_string(),
                    now,
                    new.summary,
                    new.payload_hash,
                    new.raw_excerpt,
                    new.raw_size_bytes,
                    new.raw_truncated,
                ],
            )?;

            let outcome = if inserted > 0 {
                IngestOutcome {
                    id: tx.last_insert_rowid(),
                    duplicate: false,
                }
            } else {
                tx.execute(
                    "UPDATE notifications
                     SET duplicate_count = duplicate_count + 1, last_seen_at_ms = ?1
                     WHERE dedupe_key = ?2",
                    params![now, new.dedupe_key],
                )?;
                let id = tx.query_row(
                    "SELECT id FROM notifications WHERE dedupe_key = ?1",
                    params![new.dedupe_key],
                    |row| row.get(0),
                )?;
                IngestOutcome {
                    id,
                    duplicate: true,
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically claim the oldest `received|queued` row, moving it to
/// `processing`. Returns `None` when nothing is waiting.
pub async fn claim_next_queued(db: &Database) -> Result<Option<NotificationRow>, WirelineError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let row = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {ROW_COLUMNS} FROM notifications
                     WHERE status IN ('received', 'queued')
                     ORDER BY id ASC LIMIT 1"
                ))?;
                stmt.query_row([], map_row).optional()?
            };
            let claimed = match row {
                Some(mut n) => {
                    tx.execute(
                        "UPDATE notifications SET status = 'processing' WHERE id = ?1",
                        params![n.id],
                    )?;
                    n.status = NotificationStatus::Processing;
                    Some(n)
                }
                None => None,
            };
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)
}

/// Attach the thread/turn a decision turn is running on.
pub async fn set_turn(
    db: &Database,
    id: i64,
    thread_id: &str,
    turn_id: &str,
) -> Result<(), WirelineError> {
    let thread_id = thread_id.to_string();
    let turn_id = turn_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE notifications SET thread_id = ?1, turn_id = ?2 WHERE id = ?3",
                params![thread_id, turn_id, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a terminal decision (sent or suppressed).
pub async fn record_decision(
    db: &Database,
    id: i64,
    status: NotificationStatus,
    delivery: &str,
    reason_code: Option<&str>,
    message_excerpt: Option<&str>,
    decision_json: &str,
) -> Result<(), WirelineError> {
    let status = status.to_string();
    let delivery = delivery.to_string();
    let reason_code = reason_code.map(|s| s.to_string());
    let message_excerpt = message_excerpt.map(|s| s.to_string());
    let decision_json = decision_json.to_string();
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE notifications
                 SET status = ?1, delivery = ?2, reason_code = ?3, message_excerpt = ?4,
                     decision_json = ?5, processed_at_ms = ?6
                 WHERE id = ?7",
                params![status, delivery, reason_code, message_excerpt, decision_json, now, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a terminal failure.
pub async fn record_failure(db: &Database, id: i64, error_text: &str) -> Result<(), WirelineError> {
    let error_text = error_text.to_string();
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE notifications
                 SET status = 'failed', error_text = ?1, processed_at_ms = ?2
                 WHERE id = ?3",
                params![error_text, now, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a row by id.
pub async fn get(db: &Database, id: i64) -> Result<Option<NotificationRow>, WirelineError> {
    db.connection()
        .call(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {ROW_COLUMNS} FROM notifications WHERE id = ?1"),
                    params![id],
                    map_row,
                )
                .optional()?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent rows, optionally filtered by source.
pub async fn list(
    db: &Database,
    limit: u32,
    source: Option<NotificationSource>,
) -> Result<Vec<NotificationRow>, WirelineError> {
    let source = source.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut rows = Vec::new();
            match &source {
                Some(source) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {ROW_COLUMNS} FROM notifications
                         WHERE source = ?1 ORDER BY received_at_ms DESC, id DESC LIMIT ?2"
                    ))?;
                    let mapped = stmt.query_map(params![source, limit], map_row)?;
                    for row in mapped {
                        rows.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {ROW_COLUMNS} FROM notifications
                         ORDER BY received_at_ms DESC, id DESC LIMIT ?1"
                    ))?;
                    let mapped = stmt.query_map(params![limit], map_row)?;
                    for row in mapped {
                        rows.push(row?);
                    }
                }
            }
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Substring search over summary and raw excerpt, newest first.
pub async fn search(
    db: &Database,
    query: &str,
    limit: u32,
) -> Result<Vec<NotificationRow>, WirelineError> {
    let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ROW_COLUMNS} FROM notifications
                 WHERE summary LIKE ?1 ESCAPE '\\' OR raw_excerpt LIKE ?1 ESCAPE '\\'
                 ORDER BY received_at_ms DESC, id DESC LIMIT ?2"
            ))?;
            let mapped = stmt.query_map(params![pattern, limit], map_row)?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row?);
            }
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete rows past the retention window, then the oldest rows beyond the
/// cap. Returns how many were deleted.
pub async fn prune(
    db: &Database,
    retention_days: u32,
    max_rows: u32,
) -> Result<usize, WirelineError> {
    let cutoff = now_ms() - i64::from(retention_days) * 24 * 60 * 60 * 1000;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut deleted = tx.execute(
                "DELETE FROM notifications WHERE received_at_ms < ?1",
                params![cutoff],
            )?;
            let total: i64 =
                tx.query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))?;
            let excess = total - i64::from(max_rows);
            if excess > 0 {
                deleted += tx.execute(
                    "DELETE FROM notifications WHERE id IN (
                         SELECT id FROM notifications
                         ORDER BY received_at_ms ASC, id ASC LIMIT ?1
                     )",
                    params![excess],
                )?;
            }
            tx.commit()?;
            Ok(deleted)
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

    fn new_notification(key: &str, summary: &str) -> NewNotification {
        NewNotification {
            source: NotificationSource::Webhook,
            source_account: None,
            source_event_id: Some("evt_1".into()),
            dedupe_key: key.to_string(),
            summary: summary.to_string(),
            payload_hash: "ab".repeat(32),
            raw_excerpt: format!("{{\"summary\":\"{summary}\"}}"),
            raw_size_bytes: 32,
            raw_truncated: false,
        }
    }

    #[tokio::test]
    async fn ingest_then_duplicate_bumps_count() {
        let (db, _dir) = setup_db().await;

        let first = ingest(&db, new_notification("event:webhook:-:evt_1", "build failed"))
            .await
            .unwrap();
        assert!(!first.duplicate);

        let second = ingest(&db, new_notification("event:webhook:-:evt_1", "build failed"))
            .await
            .unwrap();
        assert!(second.duplicate);
        assert_eq!(second.id, first.id);

        let row = get(&db, first.id).await.unwrap().unwrap();
        assert_eq!(row.duplicate_count, 1);
        assert!(row.last_seen_at_ms >= row.first_seen_at_ms);
        assert_eq!(row.status, NotificationStatus::Received);

        // Still exactly one row.
        let rows = list(&db, 10, None).await.unwrap();
        assert_eq!(rows.len(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_moves_oldest_to_processing() {
        let (db, _dir) = setup_db().await;

        let a = ingest(&db, new_notification("k1", "first")).await.unwrap();
        ingest(&db, new_notification("k2", "second")).await.unwrap();

        let claimed = claim_next_queued(&db).await.unwrap().unwrap();
        assert_eq!(claimed.id, a.id);
        assert_eq!(claimed.status, NotificationStatus::Processing);

        // The claimed row is no longer claimable.
        let next = claim_next_queued(&db).await.unwrap().unwrap();
        assert_ne!(next.id, a.id);
        assert!(claim_next_queued(&db).await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn record_decision_sets_terminal_fields() {
        let (db, _dir) = setup_db().await;

        let outcome = ingest(&db, new_notification("k1", "deploy done")).await.unwrap();
        claim_next_queued(&db).await.unwrap();
        set_turn(&db, outcome.id, "th_1", "turn_9").await.unwrap();
        record_decision(
            &db,
            outcome.id,
            NotificationStatus::Suppressed,
            "suppress",
            Some("deploy_noise"),
            None,
            r#"{"delivery":"suppress","message":null,"reasonCode":"deploy_noise"}"#,
        )
        .await
        .unwrap();

        let row = get(&db, outcome.id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Suppressed);
        assert_eq!(row.delivery.as_deref(), Some("suppress"));
        assert_eq!(row.reason_code.as_deref(), Some("deploy_noise"));
        assert_eq!(row.thread_id.as_deref(), Some("th_1"));
        assert_eq!(row.turn_id.as_deref(), Some("turn_9"));
        assert!(row.processed_at_ms.is_some());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn record_failure_sets_error() {
        let (db, _dir) = setup_db().await;

        let outcome = ingest(&db, new_notification("k1", "x")).await.unwrap();
        record_failure(&db, outcome.id, "decision invalid after retry")
            .await
            .unwrap();

        let row = get(&db, outcome.id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Failed);
        assert_eq!(
            row.error_text.as_deref(),
            Some("decision invalid after retry")
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_source() {
        let (db, _dir) = setup_db().await;

        ingest(&db, new_notification("k1", "a")).await.unwrap();
        let mut cron = new_notification("k2", "b");
        cron.source = NotificationSource::Cron;
        ingest(&db, cron).await.unwrap();

        assert_eq!(list(&db, 10, None).await.unwrap().len(), 2);
        let webhooks = list(&db, 10, Some(NotificationSource::Webhook)).await.unwrap();
        assert_eq!(webhooks.len(), 1);
        assert_eq!(webhooks[0].dedupe_key, "k1");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn search_matches_summary_and_excerpt() {
        let (db, _dir) = setup_db().await;

        ingest(&db, new_notification("k1", "build failed on main")).await.unwrap();
        ingest(&db, new_notification("k2", "deploy ok")).await.unwrap();

        let hits = search(&db, "build", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].dedupe_key, "k1");

        // LIKE wildcards in the query are escaped, not interpreted.
        assert!(search(&db, "%", 10).await.unwrap().is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn prune_enforces_row_cap() {
        let (db, _dir) = setup_db().await;

        for i in 0..10 {
            ingest(&db, new_notification(&format!("k{i}"), "n")).await.unwrap();
        }
        // Nothing is old enough for the retention delete; the cap applies.
        // max_rows has a floor of 100 in config; the query itself takes any cap.
        let deleted = prune(&db, 30, 4).await.unwrap();
        assert_eq!(deleted, 6);
        assert_eq!(list(&db, 100, None).await.unwrap().len(), 4);

        // Oldest rows went first.
        let remaining = list(&db, 100, None).await.unwrap();
        assert!(remaining.iter().all(|r| r.dedupe_key >= "k6".to_string()));

        db.close().await.unwrap();
    }
}
