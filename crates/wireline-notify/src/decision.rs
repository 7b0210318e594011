// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The decision envelope a notification-mode turn must produce.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use wireline_core::{NotificationSource, WirelineError};

/// Whether the notification reaches the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Send,
    Suppress,
}

/// The strict JSON object the agent must emit for a decision turn.
///
/// All three fields are required on the wire; `message` and `reasonCode`
/// are nullable. Unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationDecision {
    pub delivery: Delivery,
    pub message: Option<String>,
    #[serde(rename = "reasonCode")]
    pub reason_code: Option<String>,
}

/// JSON schema passed as `outputSchema` on the decision turn.
pub fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "delivery": {"type": "string", "enum": ["send", "suppress"]},
            "message": {"type": ["string", "null"]},
            "reasonCode": {"type": ["string", "null"]},
        },
        "required": ["delivery", "message", "reasonCode"],
        "additionalProperties": false,
    })
}

/// Strictly parses the final assistant text as a decision envelope.
pub fn parse_decision(text: &str) -> Result<NotificationDecision, WirelineError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(WirelineError::Validation(
            "decision turn produced no text".into(),
        ));
    }
    serde_json::from_str(trimmed)
        .map_err(|e| WirelineError::Validation(format!("invalid decision envelope: {e}")))
}

/// The raw message dispatched when the agent fails to produce a valid
/// envelope twice: the assistant's raw text when present, else a terse
/// source+summary line.
pub fn fallback_message(source: NotificationSource, summary: &str, raw_text: &str) -> String {
    let raw = raw_text.trim();
    if raw.is_empty() {
        format!("Notification ({source}): {summary}")
    } else {
        raw.to_string()
    }
}
