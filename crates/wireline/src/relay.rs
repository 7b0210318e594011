// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assistant relay, typing indicator, and poll-error log suppression.
//!
//! Streaming deltas are intentionally never relayed to the user (the
//! provider's anti-spam filters punish rapid-fire edits); only final
//! assistant messages go out, deduplicated by item id.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use wireline_provider::ProviderClient;

/// How many already-relayed item ids are remembered.
const RELAY_CAPACITY: usize = 4_000;

/// Tracks which assistant items have already been sent to the user.
pub struct AssistantRelay {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl AssistantRelay {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// True iff this item id has not been relayed before. Remembers it
    /// either way, evicting the oldest id past capacity.
    pub fn first_sighting(&mut self, item_id: &str) -> bool {
        if self.seen.contains(item_id) {
            return false;
        }
        self.seen.insert(item_id.to_string());
        self.order.push_back(item_id.to_string());
        if self.order.len() > RELAY_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

impl Default for AssistantRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// Typing-indicator throttle: a heartbeat while a user turn streams, a
/// backoff after any failure, and a single-in-flight guard.
#[derive(Clone)]
pub struct TypingIndicator {
    inner: Arc<TypingInner>,
}

struct TypingInner {
    enabled: bool,
    heartbeat: Duration,
    backoff: Duration,
    in_flight: AtomicBool,
    last_sent_ms: AtomicI64,
    backoff_until_ms: AtomicI64,
}

impl TypingIndicator {
    pub fn new(enabled: bool, heartbeat: Duration) -> Self {
        Self {
            inner: Arc::new(TypingInner {
                enabled,
                heartbeat,
                backoff: Duration::from_secs(30),
                in_flight: AtomicBool::new(false),
                last_sent_ms: AtomicI64::new(0),
                backoff_until_ms: AtomicI64::new(0),
            }),
        }
    }

    /// Maybe fire a typing indicator for the trusted user. Returns whether
    /// a send was started.
    pub fn maybe_send(&self, client: &Arc<ProviderClient>, number: &str) -> bool {
        let inner = &self.inner;
        if !inner.enabled {
            return false;
        }
        let now = now_ms();
        if now < inner.backoff_until_ms.load(Ordering::Relaxed) {
            return false;
        }
        let last = inner.last_sent_ms.load(Ordering::Relaxed);
        if last != 0 && now - last < inner.heartbeat.as_millis() as i64 {
            return false;
        }
        if inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        inner.last_sent_ms.store(now, Ordering::Relaxed);
        let inner = inner.clone();
        let client = client.clone();
        let number = number.to_string();
        tokio::spawn(async move {
            if let Err(e) = client.send_typing_indicator(&number).await {
                debug!(error = %e, "typing indicator failed, backing off");
                inner
                    .backoff_until_ms
                    .store(now_ms() + inner.backoff.as_millis() as i64, Ordering::Relaxed);
            }
            inner.in_flight.store(false, Ordering::SeqCst);
        });
        true
    }

    /// Reset at turn completion so the next turn may indicate immediately.
    pub fn clear(&self) {
        self.inner.last_sent_ms.store(0, Ordering::Relaxed);
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// What the poll loop should do with an error it just observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLogAction {
    /// Log this error normally.
    Log,
    /// Identical to the previous one within the window: count it silently.
    Suppress,
    /// Window closed: warn about `suppressed` hidden repeats of
    /// `signature`, then log the new error normally.
    FlushThenLog {
        suppressed: u32,
        signature: String,
    },
}

/// Deduplicates identical poll-loop errors within a 60-second window.
pub struct PollErrorSuppressor {
    window: Duration,
    current: Option<(String, std::time::Instant, u32)>,
}

impl PollErrorSuppressor {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(60))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            current: None,
        }
    }

    /// Observe one error signature and decide how to log it.
    pub fn observe(&mut self, signature: &str) -> ErrorLogAction {
        let now = std::time::Instant::now();
        match self.current.take() {
            None => {
                self.current = Some((signature.to_string(), now, 0));
                ErrorLogAction::Log
            }
            Some((prior, since, suppressed)) => {
                let expired = now.duration_since(since) >= self.window;
                if prior == signature && !expired {
                    self.current = Some((prior, since, suppressed + 1));
                    ErrorLogAction::Suppress
                } else {
                    self.current = Some((signature.to_string(), now, 0));
                    if suppressed > 0 {
                        ErrorLogAction::FlushThenLog {
                            suppressed,
                            signature: prior,
                        }
                    } else {
                        ErrorLogAction::Log
                    }
                }
            }
        }
    }
}

impl Default for PollErrorSuppressor {
    fn default() -> Self {
        Self::new()
    }
}
