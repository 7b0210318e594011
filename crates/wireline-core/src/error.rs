// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Wireline bridge.

use thiserror::Error;

/// The primary error type used across all Wireline crates.
#[derive(Debug, Error)]
pub enum WirelineError {
    /// Configuration errors (invalid TOML, missing required fields, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging-provider errors (HTTP failure, bad payload, rejected send).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Agent transport errors (child spawn/exit, stdin write failure).
    ///
    /// Terminal for any requests pending at the time of the failure.
    #[error("agent error: {message}")]
    Agent {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A JSON-RPC error response from the agent, mapped back to the caller.
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Malformed input: bad RPC result shape, bad webhook JSON, bad command args.
    ///
    /// Never retried automatically.
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WirelineError {
    /// Returns the JSON-RPC error code if this is an RPC error.
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            WirelineError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True if the agent reported that the referenced thread no longer exists.
    ///
    /// Triggers thread re-creation in the session manager.
    pub fn is_thread_not_found(&self) -> bool {
        match self {
            WirelineError::Rpc { message, .. } => {
                message.to_ascii_lowercase().contains("thread not found")
            }
            _ => false,
        }
    }

    /// True if the agent does not understand a method we invoked.
    ///
    /// Seen either as code -32601 or as serde's "unknown variant" surface.
    pub fn is_unknown_method(&self) -> bool {
        match self {
            WirelineError::Rpc { code, message, .. } => {
                *code == -32601 || {
                    let lower = message.to_ascii_lowercase();
                    lower.contains("unknown variant") || lower.contains("method not found")
                }
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_not_found_matches_rpc_message() {
        let err = WirelineError::Rpc {
            code: -32000,
            message: "Thread not found: th_123".into(),
            data: None,
        };
        assert!(err.is_thread_not_found());
        assert!(!err.is_unknown_method());
    }

    #[test]
    fn unknown_method_matches_code_and_variant_surface() {
        let by_code = WirelineError::Rpc {
            code: -32601,
            message: "no such method".into(),
            data: None,
        };
        assert!(by_code.is_unknown_method());

        let by_variant = WirelineError::Rpc {
            code: -32600,
            message: "unknown variant `turn/steer`, expected one of ...".into(),
            data: None,
        };
        assert!(by_variant.is_unknown_method());
    }

    #[test]
    fn non_rpc_errors_have_no_code() {
        let err = WirelineError::Validation("bad".into());
        assert_eq!(err.rpc_code(), None);
        assert!(!err.is_thread_not_found());
    }
}
