// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit log.

use rusqlite::{params, OptionalExtension};
use wireline_core::{AuditKind, WirelineError};

use crate::database::{map_tr_err, now_ms, Database};
use crate::models::AuditEvent;

/// Parameters for appending one audit event.
#[derive(Debug, Clone)]
pub struct AppendAudit<'a> {
    pub phone_number: &'a str,
    pub thread_id: Option<&'a str>,
    pub turn_id: Option<&'a str>,
    pub kind: AuditKind,
    pub summary: &'a str,
    pub payload_json: Option<&'a str>,
}

/// Append an event; returns the assigned row id.
pub async fn append(db: &Database, event: AppendAudit<'_>) -> Result<i64, WirelineError> {
    let phone = event.phone_number.to_string();
    let thread_id = event.thread_id.map(|s| s.to_string());
    let turn_id = event.turn_id.map(|s| s.to_string());
    let kind = event.kind.as_str();
    let summary = event.summary.to_string();
    let payload = event.payload_json.map(|s| s.to_string());
    let now = now_ms();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO audit_events (ts_ms, phone_number, thread_id, turn_id, kind, summary, payload_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![now, phone, thread_id, turn_id, kind, summary, payload],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Ordered events for the most recent turn id seen for `phone`, limited.
///
/// "Most recent" means the turn id on the highest-id audit row that carries
/// one; the timeline is then all events tagged with that turn, oldest first.
pub async fn last_turn_timeline(
    db: &Database,
    phone: &str,
    limit: u32,
) -> Result<Vec<AuditEvent>, WirelineError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let last_turn: Option<String> = conn
                .query_row(
                    "SELECT turn_id FROM audit_events
                     WHERE phone_number = ?1 AND turn_id IS NOT NULL
                     ORDER BY id DESC LIMIT 1",
                    params![phone],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(turn_id) = last_turn else {
                return Ok(Vec::new());
            };

            let mut stmt = conn.prepare(
                "SELECT id, ts_ms, phone_number, thread_id, turn_id, kind, summary, payload_json
                 FROM audit_events
                 WHERE phone_number = ?1 AND turn_id = ?2
                 ORDER BY id ASC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![phone, turn_id, limit], |row| {
                Ok(AuditEvent {
                    id: row.get(0)?,
                    ts_ms: row.get(1)?,
                    phone_number: row.get(2)?,
                    thread_id: row.get(3)?,
                    turn_id: row.get(4)?,
                    kind: row.get(5)?,
                    summary: row.get(6)?,
                    payload_json: row.get(7)?,
                })
            })?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row?);
            }
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}
