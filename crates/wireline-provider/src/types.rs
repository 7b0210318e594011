// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the messaging-provider API.

use serde::{Deserialize, Serialize};

/// A number field that may arrive as a string or an array of strings.
///
/// The provider is inconsistent about this shape; pick the first non-empty
/// entry either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberField {
    One(String),
    Many(Vec<String>),
}

impl NumberField {
    /// The first non-empty entry, if any.
    pub fn first_non_empty(&self) -> Option<&str> {
        match self {
            NumberField::One(s) if !s.is_empty() => Some(s),
            NumberField::One(_) => None,
            NumberField::Many(items) => items.iter().map(String::as_str).find(|s| !s.is_empty()),
        }
    }
}

/// One inbound message from the poll endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Provider's unique handle for this message. Empty handles are dropped.
    #[serde(default)]
    pub message_handle: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub from_number: Option<NumberField>,
    #[serde(default)]
    pub to_number: Option<NumberField>,
    #[serde(default)]
    pub is_outbound: bool,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub date_sent: Option<String>,
    #[serde(default)]
    pub date_updated: Option<String>,
}

impl InboundMessage {
    /// Best-available timestamp in epoch milliseconds, for ascending sort.
    ///
    /// Preference order: `created_at`, `date_sent`, `date_updated`. Messages
    /// with no parseable timestamp sort last (`i64::MAX`).
    pub fn best_timestamp_ms(&self) -> i64 {
        [&self.created_at, &self.date_sent, &self.date_updated]
            .into_iter()
            .flatten()
            .find_map(|raw| {
                chrono::DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|dt| dt.timestamp_millis())
            })
            .unwrap_or(i64::MAX)
    }

    /// Sender number, accepting both string and array shapes.
    pub fn sender(&self) -> Option<&str> {
        self.from_number.as_ref().and_then(NumberField::first_non_empty)
    }
}

/// Envelope of the poll endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub data: Vec<InboundMessage>,
}

/// Body for `POST /send-message`.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageBody<'a> {
    pub number: &'a str,
    pub from_number: &'a str,
    pub content: &'a str,
}

/// Response of `POST /send-message`: the handle may come under either key.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub message_handle: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl SendMessageResponse {
    pub fn handle(&self) -> Option<&str> {
        self.message_handle
            .as_deref()
            .or(self.id.as_deref())
            .filter(|s| !s.is_empty())
    }
}
