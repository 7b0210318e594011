// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model identities, default reasoning efforts, and the spark-access
//! error predicate.

use wireline_core::ReasoningEffort;

/// The workhorse model the session falls back to.
pub const MODEL_STANDARD: &str = "gpt-5.3-codex";

/// The gated high-end model behind the `/spark` toggle.
pub const MODEL_SPARK: &str = "gpt-5.3-codex-spark";

/// Default reasoning effort when no per-model override is stored.
pub fn default_effort(model: &str) -> ReasoningEffort {
    if model == MODEL_SPARK {
        ReasoningEffort::Xhigh
    } else {
        ReasoningEffort::Medium
    }
}

/// Substrings that mark an error as "spark is inaccessible to this account".
///
/// The agent's exact error surface is not documented; this predicate is a
/// heuristic and lives here so it stays in one maintainable place.
const SPARK_DENIAL_MARKERS: &[&str] = &[
    "not available",
    "not permitted",
    "not enabled",
    "insufficient",
    "permission",
    "access denied",
    "unauthorized",
    "forbidden",
    "pro",
];

/// True iff `message` indicates the spark model is inaccessible while the
/// session is actually on spark.
pub fn is_spark_access_error(session_model: &str, message: &str) -> bool {
    if session_model != MODEL_SPARK {
        return false;
    }
    let lower = message.to_ascii_lowercase();
    lower.contains(MODEL_SPARK) && SPARK_DENIAL_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_efforts_per_model() {
        assert_eq!(default_effort(MODEL_SPARK), ReasoningEffort::Xhigh);
        assert_eq!(default_effort(MODEL_STANDARD), ReasoningEffort::Medium);
        assert_eq!(default_effort("gpt-5.3-mini"), ReasoningEffort::Medium);
    }

    #[test]
    fn spark_predicate_requires_spark_session() {
        let msg = "model gpt-5.3-codex-spark is not available for this account";
        assert!(is_spark_access_error(MODEL_SPARK, msg));
        // Same message while on the standard model is not a fallback trigger.
        assert!(!is_spark_access_error(MODEL_STANDARD, msg));
    }

    #[test]
    fn spark_predicate_requires_model_name_and_marker() {
        assert!(!is_spark_access_error(
            MODEL_SPARK,
            "model gpt-5.3-codex-spark exploded"
        ));
        assert!(!is_spark_access_error(
            MODEL_SPARK,
            "permission denied for tool use"
        ));
        assert!(is_spark_access_error(
            MODEL_SPARK,
            "Access denied: GPT-5.3-CODEX-SPARK requires a Pro plan"
        ));
    }
}
