// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payload normalization: canonical JSON, content hash, dedupe key,
//! summary, and raw excerpt.

use serde_json::Value;
use sha2::{Digest, Sha256};
use wireline_core::NotificationSource;
use wireline_storage::NewNotification;

/// Maximum summary length in characters.
const SUMMARY_MAX_CHARS: usize = 220;

/// Raw-excerpt clamp bounds, in bytes.
const EXCERPT_MIN_BYTES: usize = 256;
const EXCERPT_MAX_BYTES: usize = 32_768;

/// Payload fields consulted for the event id, in order.
const EVENT_ID_FIELDS: &[&str] = &["event_id", "eventId", "id", "message_handle"];

/// Payload fields consulted for the source account, in order.
const ACCOUNT_FIELDS: &[&str] = &[
    "source_account",
    "sourceAccount",
    "account",
    "account_id",
    "accountId",
];

/// Payload string fields preferred for the summary, in order.
const SUMMARY_FIELDS: &[&str] = &["summary", "message", "text", "title", "event", "type", "kind"];

/// Normalizes an arbitrary payload into the row shape stored by C1.
///
/// Caller-supplied `source_event_id` / `source_account` win over anything
/// derived from the payload.
pub fn normalize(
    payload: &Value,
    source: NotificationSource,
    source_account: Option<&str>,
    source_event_id: Option<&str>,
    raw_excerpt_bytes: usize,
) -> NewNotification {
    let canonical = canonical_text(payload);
    let payload_hash = hex_digest(canonical.as_bytes());

    let event_id = first_non_empty(source_event_id, payload, EVENT_ID_FIELDS);
    let account = first_non_empty(source_account, payload, ACCOUNT_FIELDS);

    let dedupe_key = match &event_id {
        Some(id) => format!(
            "event:{source}:{}:{id}",
            account.as_deref().unwrap_or("-")
        ),
        None => format!(
            "hash:{source}:{}:{payload_hash}",
            account.as_deref().unwrap_or("-")
        ),
    };

    let limit = raw_excerpt_bytes.clamp(EXCERPT_MIN_BYTES, EXCERPT_MAX_BYTES);
    let raw_size_bytes = canonical.len() as i64;
    let raw_truncated = canonical.len() > limit;
    let raw_excerpt = truncate_at_char_boundary(&canonical, limit).to_string();

    NewNotification {
        source,
        source_account: account,
        source_event_id: event_id,
        dedupe_key,
        summary: summarize(payload),
        payload_hash,
        raw_excerpt,
        raw_size_bytes,
        raw_truncated,
    }
}

/// Canonical text form: JSON with sorted object keys for objects and
/// arrays, the bare string for strings, `to_string` for other scalars.
pub fn canonical_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            let sorted = sort_keys(payload);
            serde_json::to_string(&sorted).unwrap_or_else(|_| payload.to_string())
        }
        other => other.to_string(),
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), sort_keys(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn first_non_empty(
    explicit: Option<&str>,
    payload: &Value,
    fields: &[&str],
) -> Option<String> {
    if let Some(value) = explicit {
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    let obj = payload.as_object()?;
    for field in fields {
        match obj.get(*field) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// Derives a one-line summary of at most 220 characters.
fn summarize(payload: &Value) -> String {
    let raw = match payload {
        Value::Object(obj) => SUMMARY_FIELDS
            .iter()
            .find_map(|field| match obj.get(*field) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .unwrap_or_else(|| {
                let keys: Vec<&str> = obj.keys().map(String::as_str).take(8).collect();
                format!("object with keys: {}", keys.join(", "))
            }),
        Value::Array(items) => format!("array with {} items", items.len()),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    let collapsed: String = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SUMMARY_MAX_CHARS).collect()
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_id_dedupe_key_matches_documented_shape() {
        let payload = json!({"event_id": "evt_1", "summary": "build failed"});
        let new = normalize(&payload, NotificationSource::Webhook, None, None, 4096);
        assert_eq!(new.dedupe_key, "event:webhook:-:evt_1");
        assert_eq!(new.summary, "build failed");
        assert_eq!(new.source_event_id.as_deref(), Some("evt_1"));
    }

    #[test]
    fn account_lands_in_dedupe_key() {
        let payload = json!({"eventId": "e9", "account": "github"});
        let new = normalize(&payload, NotificationSource::Webhook, None, None, 4096);
        assert_eq!(new.dedupe_key, "event:webhook:github:e9");
    }

    #[test]
    fn caller_supplied_ids_win_over_payload() {
        let payload = json!({"event_id": "evt_payload"});
        let new = normalize(
            &payload,
            NotificationSource::Cron,
            Some("acct_header"),
            Some("evt_header"),
            4096,
        );
        assert_eq!(new.dedupe_key, "event:cron:acct_header:evt_header");
    }

    #[test]
    fn hash_key_when_no_event_id() {
        let payload = json!({"details": "no id here"});
        let new = normalize(&payload, NotificationSource::Webhook, None, None, 4096);
        assert!(new.dedupe_key.starts_with("hash:webhook:-:"));
        assert_eq!(
            new.dedupe_key,
            format!("hash:webhook:-:{}", new.payload_hash)
        );
    }

    #[test]
    fn hash_is_stable_under_key_reordering() {
        let a = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = json!({"a": {"x": 3, "y": 2}, "b": 1});
        let na = normalize(&a, NotificationSource::Webhook, None, None, 4096);
        let nb = normalize(&b, NotificationSource::Webhook, None, None, 4096);
        assert_eq!(na.payload_hash, nb.payload_hash);
    }

    #[test]
    fn summary_prefers_listed_fields_in_order() {
        let payload = json!({"title": "the title", "message": "the message"});
        let new = normalize(&payload, NotificationSource::Webhook, None, None, 4096);
        assert_eq!(new.summary, "the message");

        let payload = json!({"kind": "deploy"});
        let new = normalize(&payload, NotificationSource::Webhook, None, None, 4096);
        assert_eq!(new.summary, "deploy");
    }

    #[test]
    fn summary_falls_back_to_key_listing_and_array_length() {
        let payload = json!({"zeta": 1, "alpha": 2});
        let new = normalize(&payload, NotificationSource::Webhook, None, None, 4096);
        assert!(new.summary.starts_with("object with keys: "));

        let payload = json!([1, 2, 3]);
        let new = normalize(&payload, NotificationSource::Webhook, None, None, 4096);
        assert_eq!(new.summary, "array with 3 items");
    }

    #[test]
    fn summary_is_capped_at_220_chars() {
        let long = "x".repeat(500);
        let payload = json!({"summary": long});
        let new = normalize(&payload, NotificationSource::Webhook, None, None, 4096);
        assert_eq!(new.summary.chars().count(), 220);
    }

    #[test]
    fn excerpt_clamps_and_flags_truncation() {
        let long = "y".repeat(1000);
        let payload = json!({"data": long});
        // Requested 10 bytes clamps up to the 256-byte floor.
        let new = normalize(&payload, NotificationSource::Webhook, None, None, 10);
        assert_eq!(new.raw_excerpt.len(), 256);
        assert!(new.raw_truncated);
        assert!(new.raw_size_bytes > 256);

        let small = json!({"k": "v"});
        let new = normalize(&small, NotificationSource::Webhook, None, None, 4096);
        assert!(!new.raw_truncated);
        assert_eq!(new.raw_size_bytes as usize, new.raw_excerpt.len());
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        // Multi-byte characters around the cut point must not split.
        let payload = Value::String("é".repeat(300));
        let new = normalize(&payload, NotificationSource::Webhook, None, None, 256);
        assert!(new.raw_excerpt.len() <= 256);
        assert!(new.raw_excerpt.chars().all(|c| c == 'é'));
    }

    #[test]
    fn string_payload_is_canonicalized_bare() {
        let payload = Value::String("plain text event".into());
        assert_eq!(canonical_text(&payload), "plain text event");
        let new = normalize(&payload, NotificationSource::Heartbeat, None, None, 4096);
        assert_eq!(new.summary, "plain text event");
    }

    #[test]
    fn numeric_event_id_is_accepted() {
        let payload = json!({"id": 12345});
        let new = normalize(&payload, NotificationSource::Webhook, None, None, 4096);
        assert_eq!(new.dedupe_key, "event:webhook:-:12345");
    }
}
