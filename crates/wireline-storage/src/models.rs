// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! These types represent the rows stored in the SQLite database, plus the
//! JSON-encoded values persisted under flag keys.

use serde::{Deserialize, Serialize};
use wireline_core::{NotificationSource, NotificationStatus, ReasoningEffort};

/// The per-user session singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Trusted user's normalized phone number.
    pub phone_number: String,
    /// Current agent thread, if one has been started.
    pub thread_id: Option<String>,
    /// Turn currently in flight, if any. At most one at any moment.
    pub active_turn_id: Option<String>,
    /// Model used for new turns.
    pub model: String,
    /// Epoch-ms of the last mutation.
    pub updated_at_ms: i64,
}

/// An append-only audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub ts_ms: i64,
    pub phone_number: String,
    pub thread_id: Option<String>,
    pub turn_id: Option<String>,
    /// One of the closed [`wireline_core::AuditKind`] strings.
    pub kind: String,
    /// One-line human summary.
    pub summary: String,
    /// Arbitrary JSON payload, if any.
    pub payload_json: Option<String>,
}

/// A stored notification row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: i64,
    pub source: NotificationSource,
    pub source_account: Option<String>,
    pub source_event_id: Option<String>,
    pub dedupe_key: String,
    pub status: NotificationStatus,
    pub received_at_ms: i64,
    pub processed_at_ms: Option<i64>,
    /// Final decision delivery ("send" | "suppress"), once decided.
    pub delivery: Option<String>,
    pub reason_code: Option<String>,
    /// Excerpt of the message dispatched to the user, if any.
    pub message_excerpt: Option<String>,
    /// Derived one-line summary, at most 220 characters.
    pub summary: String,
    /// SHA-256 hex digest of the canonicalized payload.
    pub payload_hash: String,
    pub raw_excerpt: String,
    pub raw_size_bytes: i64,
    pub raw_truncated: bool,
    pub duplicate_count: i64,
    pub first_seen_at_ms: i64,
    pub last_seen_at_ms: i64,
    pub thread_id: Option<String>,
    pub turn_id: Option<String>,
    pub decision_json: Option<String>,
    pub error_text: Option<String>,
}

/// The normalized shape inserted into the notifications table.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub source: NotificationSource,
    pub source_account: Option<String>,
    pub source_event_id: Option<String>,
    pub dedupe_key: String,
    pub summary: String,
    pub payload_hash: String,
    pub raw_excerpt: String,
    pub raw_size_bytes: i64,
    pub raw_truncated: bool,
}

/// Persisted flag keys recognized by the bridge.
pub mod flag_keys {
    /// Blocks new user turns while set.
    pub const PAUSED: &str = "paused";
    /// Enables auto-accepting approval requests.
    pub const AUTO_APPROVE: &str = "auto_approve";
    /// JSON map of model id to reasoning effort.
    pub const REASONING_EFFORT_BY_MODEL: &str = "reasoning_effort_by_model";
    /// Saved model+effort restored when spark is toggled off. One-shot.
    pub const SPARK_RETURN_TARGET: &str = "spark_return_target";
    /// One-shot notice emitted after a user-initiated restart.
    pub const PENDING_BRIDGE_RESTART_NOTICE: &str = "pending_bridge_restart_notice";
    /// Latched false when the agent rejects `turn/steer` as unknown.
    pub const SUPPORTS_TURN_STEER: &str = "supports_turn_steer";
}

/// Saved model+effort pair restored when the spark toggle is turned off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparkReturnTarget {
    pub model: String,
    pub effort: ReasoningEffort,
}

/// One-shot notice persisted by `/restart bridge|both`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartNotice {
    /// "bridge" or "both".
    pub target: String,
    pub requested_at_ms: i64,
}
