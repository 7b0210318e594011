// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound-message dedupe set.
//!
//! Presence of a message handle means "already ingested". Rows are never
//! auto-removed; purging is an administrative action.

use rusqlite::params;
use wireline_core::WirelineError;

use crate::database::{map_tr_err, now_ms, Database};

/// Mark a message handle as processed.
///
/// Returns `true` iff the handle was not seen before (the insert succeeded).
pub async fn mark_processed(db: &Database, handle: &str) -> Result<bool, WirelineError> {
    let handle = handle.to_string();
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO inbound_messages (message_handle, received_at_ms)
                 VALUES (?1, ?2)",
                params![handle, now],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark many handles as processed in one transaction.
///
/// Returns the number of handles newly inserted.
pub async fn mark_many(db: &Database, handles: Vec<String>) -> Result<usize, WirelineError> {
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0usize;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO inbound_messages (message_handle, received_at_ms)
                     VALUES (?1, ?2)",
                )?;
                for handle in &handles {
                    inserted += stmt.execute(params![handle, now])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(map_tr_err)
}

/// Whether any handle has ever been recorded.
pub async fn has_any(db: &Database) -> Result<bool, WirelineError> {
    db.connection()
        .call(|conn| {
            let n: i64 =
                conn.query_row("SELECT EXISTS (SELECT 1 FROM inbound_messages)", [], |row| {
                    row.get(0)
                })?;
            Ok(n != 0)
        })
        .await
        .map_err(map_tr_err)
}
