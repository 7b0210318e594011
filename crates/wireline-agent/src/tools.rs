// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dynamic notification tools exposed to the agent.
//!
//! The descriptors are passed on `thread/start`; calls arrive as
//! `item/tool/call` server requests. Arguments are validated against the
//! embedded input schemas before touching storage, and failures come back
//! as `{success: false}` with a concise error string.

use serde_json::{json, Value};
use wireline_core::{NotificationSource, WirelineError};
use wireline_storage::queries::notifications;
use wireline_storage::Database;

pub const TOOL_LIST: &str = "notifications_list";
pub const TOOL_GET: &str = "notifications_get";
pub const TOOL_SEARCH: &str = "notifications_search";

const MAX_COUNT: i64 = 200;
const DEFAULT_COUNT: i64 = 20;

/// Tool descriptors advertised on `thread/start`.
pub fn descriptors() -> Value {
    json!([
        {
            "name": TOOL_LIST,
            "description": "List recent notifications, newest first.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "count": {"type": "integer", "minimum": 1, "maximum": MAX_COUNT},
                    "source": {"type": "string", "enum": ["all", "webhook", "cron", "heartbeat"]},
                },
                "additionalProperties": false,
            },
        },
        {
            "name": TOOL_GET,
            "description": "Fetch one notification by id.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "id": {"type": "integer", "minimum": 1},
                },
                "required": ["id"],
                "additionalProperties": false,
            },
        },
        {
            "name": TOOL_SEARCH,
            "description": "Search notification summaries and payload excerpts.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string", "minLength": 1},
                    "count": {"type": "integer", "minimum": 1, "maximum": MAX_COUNT},
                },
                "required": ["query"],
                "additionalProperties": false,
            },
        },
    ])
}

/// Handles one tool call, producing the JSON result to send back.
///
/// Unknown tools are the caller's problem (answered with -32601); this
/// function only accepts the three notification tools.
pub async fn handle_tool_call(db: &Database, tool: &str, arguments: &Value) -> Value {
    let outcome = match tool {
        TOOL_LIST => run_list(db, arguments).await,
        TOOL_GET => run_get(db, arguments).await,
        TOOL_SEARCH => run_search(db, arguments).await,
        other => Err(WirelineError::Validation(format!("unknown tool: {other}"))),
    };

    match outcome {
        Ok(text) => json!({
            "success": true,
            "contentItems": [{"type": "inputText", "text": text}],
        }),
        Err(e) => json!({
            "success": false,
            "error": e.to_string(),
        }),
    }
}

/// True iff this transport-level tool name is one we serve.
pub fn is_notification_tool(tool: &str) -> bool {
    matches!(tool, TOOL_LIST | TOOL_GET | TOOL_SEARCH)
}

async fn run_list(db: &Database, arguments: &Value) -> Result<String, WirelineError> {
    let count = parse_count(arguments)?;
    let source = match arguments.get("source").and_then(Value::as_str) {
        None | Some("all") => None,
        Some(raw) => Some(
            raw.parse::<NotificationSource>()
                .map_err(WirelineError::Validation)?,
        ),
    };
    let rows = notifications::list(db, count as u32, source).await?;
    pretty(&rows)
}

async fn run_get(db: &Database, arguments: &Value) -> Result<String, WirelineError> {
    let id = arguments
        .get("id")
        .and_then(Value::as_i64)
        .filter(|id| *id >= 1)
        .ok_or_else(|| WirelineError::Validation("id must be a positive integer".into()))?;
    match notifications::get(db, id).await? {
        Some(row) => pretty(&row),
        None => Err(WirelineError::Validation(format!(
            "no notification with id {id}"
        ))),
    }
}

async fn run_search(db: &Database, arguments: &Value) -> Result<String, WirelineError> {
    let query = arguments
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| WirelineError::Validation("query must be a non-empty string".into()))?;
    let count = parse_count(arguments)?;
    let rows = notifications::search(db, query, count as u32).await?;
    pretty(&rows)
}

fn parse_count(arguments: &Value) -> Result<i64, WirelineError> {
    match arguments.get("count") {
        None => Ok(DEFAULT_COUNT),
        Some(raw) => raw
            .as_i64()
            .filter(|n| (1..=MAX_COUNT).contains(n))
            .ok_or_else(|| {
                WirelineError::Validation(format!("count must be within 1..={MAX_COUNT}"))
            }),
    }
}

fn pretty<T: serde::Serialize>(value: &T) -> Result<String, WirelineError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| WirelineError::Internal(format!("tool result failed to encode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wireline_storage::NewNotification;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    async fn seed(db: &Database, key: &str, summary: &str) -> i64 {
        notifications::ingest(
            db,
            NewNotification {
                source: NotificationSource::Webhook,
                source_account: None,
                source_event_id: None,
                dedupe_key: key.to_string(),
                summary: summary.to_string(),
                payload_hash: "00".repeat(32),
                raw_excerpt: summary.to_string(),
                raw_size_bytes: summary.len() as i64,
                raw_truncated: false,
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn list_returns_success_content() {
        let (db, _dir) = setup_db().await;
        seed(&db, "k1", "build failed").await;

        let result = handle_tool_call(&db, TOOL_LIST, &json!({"count": 5})).await;
        assert_eq!(result["success"], true);
        let text = result["contentItems"][0]["text"].as_str().unwrap();
        assert!(text.contains("build failed"));
        assert_eq!(result["contentItems"][0]["type"], "inputText");
    }

    #[tokio::test]
    async fn list_rejects_out_of_range_count() {
        let (db, _dir) = setup_db().await;
        let result = handle_tool_call(&db, TOOL_LIST, &json!({"count": 0})).await;
        assert_eq!(result["success"], false);
        let result = handle_tool_call(&db, TOOL_LIST, &json!({"count": 500})).await;
        assert_eq!(result["success"], false);
    }

    #[tokio::test]
    async fn get_round_trips_by_id() {
        let (db, _dir) = setup_db().await;
        let id = seed(&db, "k1", "deploy done").await;

        let result = handle_tool_call(&db, TOOL_GET, &json!({"id": id})).await;
        assert_eq!(result["success"], true);
        assert!(result["contentItems"][0]["text"]
            .as_str()
            .unwrap()
            .contains("deploy done"));

        let missing = handle_tool_call(&db, TOOL_GET, &json!({"id": 9999})).await;
        assert_eq!(missing["success"], false);
    }

    #[tokio::test]
    async fn search_requires_query() {
        let (db, _dir) = setup_db().await;
        seed(&db, "k1", "cert expiring soon").await;

        let result = handle_tool_call(&db, TOOL_SEARCH, &json!({"query": "cert"})).await;
        assert_eq!(result["success"], true);

        let bad = handle_tool_call(&db, TOOL_SEARCH, &json!({})).await;
        assert_eq!(bad["success"], false);
    }

    #[test]
    fn descriptors_cover_all_three_tools() {
        let desc = descriptors();
        let names: Vec<_> = desc
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec![TOOL_LIST, TOOL_GET, TOOL_SEARCH]);
        assert!(is_notification_tool(TOOL_GET));
        assert!(!is_notification_tool("rm_rf"));
    }
}
