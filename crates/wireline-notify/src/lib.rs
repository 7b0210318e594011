// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification pipeline: ingestion, dedupe, queueing, decision turns, and
//! retention pruning.
//!
//! Webhook and internal events are normalized into a canonical row, deduped
//! by key, and queued. At an idle moment the orchestrator asks the pipeline
//! to claim the oldest row and run a structured-output decision turn; the
//! agent's envelope decides whether anything reaches the user.

pub mod decision;
pub mod normalize;
pub mod pipeline;

pub use decision::{Delivery, NotificationDecision};
pub use normalize::normalize;
pub use pipeline::NotificationPipeline;
