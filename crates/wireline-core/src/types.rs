// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared domain types for the Wireline bridge.
//!
//! These types cross crate boundaries: the agent session manager emits
//! [`BridgeEvent`]s consumed by the orchestrator, the storage layer persists
//! [`AuditKind`]-tagged events and notification rows, and the notification
//! pipeline tracks [`TurnContext`]s for decision turns.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Who a turn is on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnMode {
    /// A turn started from the trusted user's inbound text.
    User,
    /// A structured-output decision turn for a queued notification.
    Notification,
}

/// Terminal status reported by the agent for a completed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Completed,
    Failed,
    Interrupted,
}

impl std::fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TurnStatus::Completed => "completed",
            TurnStatus::Failed => "failed",
            TurnStatus::Interrupted => "interrupted",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TurnStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(TurnStatus::Completed),
            "failed" => Ok(TurnStatus::Failed),
            "interrupted" => Ok(TurnStatus::Interrupted),
            other => Err(format!("unknown turn status: {other}")),
        }
    }
}

/// Reasoning effort level for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    None,
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl std::fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReasoningEffort::None => "none",
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
            ReasoningEffort::Xhigh => "xhigh",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ReasoningEffort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ReasoningEffort::None),
            "minimal" => Ok(ReasoningEffort::Minimal),
            "low" => Ok(ReasoningEffort::Low),
            "medium" => Ok(ReasoningEffort::Medium),
            "high" => Ok(ReasoningEffort::High),
            "xhigh" => Ok(ReasoningEffort::Xhigh),
            other => Err(format!("unknown reasoning effort: {other}")),
        }
    }
}

/// Where a notification entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSource {
    Webhook,
    Cron,
    Heartbeat,
}

impl std::fmt::Display for NotificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationSource::Webhook => "webhook",
            NotificationSource::Cron => "cron",
            NotificationSource::Heartbeat => "heartbeat",
        };
        write!(f, "{s}")
    }
}

impl FromStr for NotificationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webhook" => Ok(NotificationSource::Webhook),
            "cron" => Ok(NotificationSource::Cron),
            "heartbeat" => Ok(NotificationSource::Heartbeat),
            other => Err(format!("unknown notification source: {other}")),
        }
    }
}

/// Pipeline status of a notification row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Received,
    Queued,
    Processing,
    Sent,
    Suppressed,
    Failed,
    Duplicate,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationStatus::Received => "received",
            NotificationStatus::Queued => "queued",
            NotificationStatus::Processing => "processing",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Suppressed => "suppressed",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Duplicate => "duplicate",
        };
        write!(f, "{s}")
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(NotificationStatus::Received),
            "queued" => Ok(NotificationStatus::Queued),
            "processing" => Ok(NotificationStatus::Processing),
            "sent" => Ok(NotificationStatus::Sent),
            "suppressed" => Ok(NotificationStatus::Suppressed),
            "failed" => Ok(NotificationStatus::Failed),
            "duplicate" => Ok(NotificationStatus::Duplicate),
            other => Err(format!("unknown notification status: {other}")),
        }
    }
}

/// In-memory context attached to an active turn.
///
/// Created on `turn/start` or `turn/steer`, removed on the terminal
/// `turn/completed` event. Notification-mode contexts accumulate the final
/// assistant text so the decision envelope can be parsed at completion.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub mode: TurnMode,
    /// Set for notification-mode turns only.
    pub notification_id: Option<i64>,
    /// Decision attempt number, 1 or 2.
    pub attempt: u8,
    /// Latest final assistant text seen for this turn.
    pub latest_text: String,
}

impl TurnContext {
    /// Context for a user-text turn.
    pub fn user() -> Self {
        Self {
            mode: TurnMode::User,
            notification_id: None,
            attempt: 1,
            latest_text: String::new(),
        }
    }

    /// Context for a notification decision turn.
    pub fn notification(notification_id: i64, attempt: u8) -> Self {
        Self {
            mode: TurnMode::Notification,
            notification_id: Some(notification_id),
            attempt,
            latest_text: String::new(),
        }
    }
}

/// Events the agent session manager emits toward the bridge orchestrator.
///
/// Delivered over an mpsc channel; the transport reader never calls into the
/// orchestrator directly.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    TurnStarted {
        thread_id: String,
        turn_id: String,
    },
    TurnCompleted {
        thread_id: String,
        turn_id: String,
        status: TurnStatus,
        error: Option<String>,
        /// The context removed at completion, so consumers can tell user
        /// turns from notification decision turns.
        context: Option<TurnContext>,
    },
    AssistantDelta {
        item_id: String,
        turn_id: String,
        delta: String,
    },
    AssistantFinal {
        item_id: String,
        turn_id: String,
        text: String,
    },
    CompactionStarted,
    CompactionCompleted,
    /// An approval request was declined because auto-approve is off or the
    /// bridge is paused. Emitted once per denial so the user is informed.
    ApprovalDeclinedDueToPolicy {
        method: String,
        summary: String,
    },
    /// The session model was downgraded because spark is inaccessible.
    ModelFallback {
        from_model: String,
        to_model: String,
        to_effort: ReasoningEffort,
        operation: String,
        reason: String,
    },
}

/// Closed set of audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    InboundMessage,
    OutboundMessage,
    Command,
    TurnStarted,
    TurnCompleted,
    TurnSteered,
    TurnInterrupted,
    AssistantDelta,
    ApprovalRequest,
    ApprovalResponse,
    NotificationIngested,
    NotificationDuplicate,
    NotificationProcessing,
    NotificationSent,
    NotificationSuppressed,
    NotificationFailed,
    System,
    Error,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::InboundMessage => "inbound_message",
            AuditKind::OutboundMessage => "outbound_message",
            AuditKind::Command => "command",
            AuditKind::TurnStarted => "turn_started",
            AuditKind::TurnCompleted => "turn_completed",
            AuditKind::TurnSteered => "turn_steered",
            AuditKind::TurnInterrupted => "turn_interrupted",
            AuditKind::AssistantDelta => "assistant_delta",
            AuditKind::ApprovalRequest => "approval_request",
            AuditKind::ApprovalResponse => "approval_response",
            AuditKind::NotificationIngested => "notification_ingested",
            AuditKind::NotificationDuplicate => "notification_duplicate",
            AuditKind::NotificationProcessing => "notification_processing",
            AuditKind::NotificationSent => "notification_sent",
            AuditKind::NotificationSuppressed => "notification_suppressed",
            AuditKind::NotificationFailed => "notification_failed",
            AuditKind::System => "system",
            AuditKind::Error => "error",
        }
    }
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_context_constructors() {
        let user = TurnContext::user();
        assert_eq!(user.mode, TurnMode::User);
        assert_eq!(user.notification_id, None);
        assert_eq!(user.attempt, 1);

        let notif = TurnContext::notification(42, 2);
        assert_eq!(notif.mode, TurnMode::Notification);
        assert_eq!(notif.notification_id, Some(42));
        assert_eq!(notif.attempt, 2);
    }

    #[test]
    fn audit_kind_strings_are_stable() {
        assert_eq!(AuditKind::InboundMessage.as_str(), "inbound_message");
        assert_eq!(AuditKind::TurnSteered.as_str(), "turn_steered");
        assert_eq!(
            AuditKind::NotificationSuppressed.as_str(),
            "notification_suppressed"
        );
    }

    #[test]
    fn turn_status_deserializes_from_agent_payload() {
        let status: TurnStatus = serde_json::from_str("\"interrupted\"").unwrap();
        assert_eq!(status, TurnStatus::Interrupted);
    }
}
