// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Wireline bridge daemon.
//!
//! This crate provides the error type and the shared domain types used
//! across the Wireline workspace: turn lifecycle enums, bridge events
//! emitted by the agent session manager, audit kinds, and notification
//! states.

pub mod error;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::WirelineError;
pub use types::{
    AuditKind, BridgeEvent, NotificationSource, NotificationStatus, ReasoningEffort, TurnContext,
    TurnMode, TurnStatus,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wireline_error_has_all_variants() {
        let _config = WirelineError::Config("test".into());
        let _storage = WirelineError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _provider = WirelineError::Provider {
            message: "test".into(),
            source: None,
        };
        let _agent = WirelineError::Agent {
            message: "test".into(),
            source: None,
        };
        let _rpc = WirelineError::Rpc {
            code: -32601,
            message: "method not found".into(),
            data: None,
        };
        let _validation = WirelineError::Validation("test".into());
        let _timeout = WirelineError::Timeout {
            duration: std::time::Duration::from_secs(120),
        };
        let _internal = WirelineError::Internal("test".into());
    }

    #[test]
    fn turn_status_round_trips_through_str() {
        use std::str::FromStr;

        for status in [
            TurnStatus::Completed,
            TurnStatus::Failed,
            TurnStatus::Interrupted,
        ] {
            let s = status.to_string();
            assert_eq!(TurnStatus::from_str(&s).unwrap(), status);
        }
        assert!(TurnStatus::from_str("exploded").is_err());
    }

    #[test]
    fn reasoning_effort_serializes_lowercase() {
        let json = serde_json::to_string(&ReasoningEffort::Xhigh).unwrap();
        assert_eq!(json, "\"xhigh\"");
        let parsed: ReasoningEffort = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, ReasoningEffort::Medium);
    }

    #[test]
    fn notification_enums_round_trip() {
        use std::str::FromStr;

        for source in [
            NotificationSource::Webhook,
            NotificationSource::Cron,
            NotificationSource::Heartbeat,
        ] {
            assert_eq!(
                NotificationSource::from_str(&source.to_string()).unwrap(),
                source
            );
        }
        for status in [
            NotificationStatus::Received,
            NotificationStatus::Queued,
            NotificationStatus::Processing,
            NotificationStatus::Sent,
            NotificationStatus::Suppressed,
            NotificationStatus::Failed,
            NotificationStatus::Duplicate,
        ] {
            assert_eq!(
                NotificationStatus::from_str(&status.to_string()).unwrap(),
                status
            );
        }
    }
}
