// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message queue and chunking.
//!
//! A single worker task serializes all sends: styling (optional), chunking
//! to the provider's limit, then sequential dispatch. Failures are logged
//! and never stall the queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use wireline_core::AuditKind;
use wireline_provider::ProviderClient;
use wireline_storage::queries::audit;
use wireline_storage::Database;

use crate::styling;

/// Maximum characters per outbound chunk.
pub const MAX_CHUNK_CHARS: usize = 1200;

/// Boundary splits are only taken above this fraction of the chunk size.
const BOUNDARY_FLOOR: usize = (MAX_CHUNK_CHARS * 2) / 5;

/// Splits a logical message into chunks of at most [`MAX_CHUNK_CHARS`]
/// characters, preferring a newline boundary, then a space, when the
/// boundary falls above 40% of the maximum. CRLF is normalized first; the
/// chunks concatenate back to the trimmed input.
pub fn split_message(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut rest: Vec<char> = trimmed.chars().collect();

    while rest.len() > MAX_CHUNK_CHARS {
        let window = &rest[..MAX_CHUNK_CHARS];
        // Split AFTER the boundary character so the chunks concatenate
        // losslessly.
        let split_at = find_boundary(window, '\n')
            .or_else(|| find_boundary(window, ' '))
            .unwrap_or(MAX_CHUNK_CHARS);
        chunks.push(rest[..split_at].iter().collect());
        rest = rest.split_off(split_at);
    }
    if !rest.is_empty() {
        chunks.push(rest.iter().collect());
    }
    chunks
}

fn find_boundary(window: &[char], boundary: char) -> Option<usize> {
    window
        .iter()
        .rposition(|&c| c == boundary)
        .map(|i| i + 1)
        .filter(|&i| i > BOUNDARY_FLOOR)
}

/// Handle to the single outbound worker.
pub struct OutboundQueue {
    tx: mpsc::Sender<String>,
    worker: JoinHandle<()>,
}

impl OutboundQueue {
    /// Spawns the worker that styles, chunks, and sends each queued
    /// logical message in order.
    pub fn spawn(
        client: Arc<ProviderClient>,
        db: Database,
        to_number: String,
        from_number: String,
        styling_enabled: bool,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let worker = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let styled = if styling_enabled {
                    styling::style_outbound(&message)
                } else {
                    message.clone()
                };
                for chunk in split_message(&styled) {
                    match client.send_message(&to_number, &from_number, &chunk).await {
                        Ok(handle) => {
                            debug!(chars = chunk.chars().count(), ?handle, "chunk sent");
                        }
                        Err(e) => {
                            warn!(error = %e, "outbound send failed");
                        }
                    }
                }
                let summary: String = message.chars().take(200).collect();
                if let Err(e) = audit::append(
                    &db,
                    audit::AppendAudit {
                        phone_number: &to_number,
                        thread_id: None,
                        turn_id: None,
                        kind: AuditKind::OutboundMessage,
                        summary: &summary,
                        payload_json: None,
                    },
                )
                .await
                {
                    warn!(error = %e, "outbound audit failed");
                }
            }
        });
        Self { tx, worker }
    }

    /// Queues a logical message. Never blocks the caller for long: the
    /// channel is bounded but drained by the worker.
    pub async fn enqueue(&self, message: String) {
        if message.trim().is_empty() {
            return;
        }
        if self.tx.send(message).await.is_err() {
            warn!("outbound queue worker gone, dropping message");
        }
    }

    /// Closes the queue and waits for the worker to drain it.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "outbound worker ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_are_one_chunk() {
        assert_eq!(split_message("hello"), vec!["hello"]);
        assert!(split_message("").is_empty());
        assert!(split_message("  \n ").is_empty());
    }

    #[test]
    fn chunks_respect_max_and_rejoin_losslessly() {
        let text = "word ".repeat(600); // 3000 chars
        let chunks = split_message(&text);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= MAX_CHUNK_CHARS);
        }
        assert_eq!(chunks.concat(), text.trim());
    }

    #[test]
    fn newline_boundary_is_preferred_over_space() {
        let first = "a".repeat(700);
        let second = "b ".repeat(500);
        let text = format!("{first}\n{second}");
        let chunks = split_message(&text);
        // The newline at 701 chars is above the 40% floor, so the first
        // chunk ends right after it.
        assert_eq!(chunks[0].chars().count(), 701);
        assert!(chunks[0].ends_with('\n'));
        assert_eq!(chunks.concat(), text.trim());
    }

    #[test]
    fn boundary_below_floor_is_ignored() {
        // One early newline, then an unbroken run: the newline sits below
        // 40% of the max, so the split is a hard cut at the limit.
        let text = format!("{}\n{}", "a".repeat(100), "b".repeat(2000));
        let chunks = split_message(&text);
        assert_eq!(chunks[0].chars().count(), MAX_CHUNK_CHARS);
        assert_eq!(chunks.concat(), text.trim());
    }

    #[test]
    fn unbroken_text_hard_cuts() {
        let text = "x".repeat(2500);
        let chunks = split_message(&text);
        assert_eq!(
            chunks.iter().map(|c| c.chars().count()).collect::<Vec<_>>(),
            vec![1200, 1200, 100]
        );
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn crlf_is_normalized_before_chunking() {
        let text = "line one\r\nline two";
        let chunks = split_message(text);
        assert_eq!(chunks, vec!["line one\nline two"]);
    }
}
